use crate::utils::error::{HarvestError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(HarvestError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 檢查 [min_x, min_y, max_x, max_y] 的順序
pub fn validate_bbox(field_name: &str, bbox: &[f64; 4]) -> Result<()> {
    if bbox.iter().any(|v| !v.is_finite()) {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: format!("{:?}", bbox),
            reason: "Bounding box values must be finite".to_string(),
        });
    }
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
        return Err(HarvestError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: format!("{:?}", bbox),
            reason: "Expected [min_x, min_y, max_x, max_y] with min < max".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("layers_url", "https://example.com").is_ok());
        assert!(validate_url("layers_url", "http://example.com").is_ok());
        assert!(validate_url("layers_url", "").is_err());
        assert!(validate_url("layers_url", "invalid-url").is_err());
        assert!(validate_url("layers_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_bbox() {
        assert!(validate_bbox("target_bbox", &[149.0, -35.0, 149.1, -34.9]).is_ok());
        assert!(validate_bbox("target_bbox", &[149.1, -35.0, 149.0, -34.9]).is_err());
        assert!(validate_bbox("target_bbox", &[149.0, -34.9, 149.1, -34.9]).is_err());
        assert!(validate_bbox("target_bbox", &[f64::NAN, -35.0, 149.1, -34.9]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("resolution", 3.0, 0.1, 3600.0).is_ok());
        assert!(validate_range("resolution", 0.0, 0.1, 3600.0).is_err());
    }
}
