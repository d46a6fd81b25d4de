use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("GDAL error: {0}")]
    GdalError(#[from] gdal::errors::GdalError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field '{field}'")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("HTTP {status} {reason} when accessing {url}")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("WCS service exception from {url}: {message}")]
    ServiceException { url: String, message: String },

    #[error("Giving up after {attempts} attempts (last status {last_status})")]
    RetryExhausted { attempts: u32, last_status: u16 },

    #[error("Raster processing error: {message}")]
    RasterError { message: String },
}

pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Remote,
    Storage,
    Raster,
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl HarvestError {
    pub fn validation(message: impl Into<String>) -> Self {
        HarvestError::ValidationError {
            message: message.into(),
        }
    }

    pub fn raster(message: impl Into<String>) -> Self {
        HarvestError::RasterError {
            message: message.into(),
        }
    }

    /// HTTP 狀態碼（若錯誤來自遠端回應）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HarvestError::HttpStatus { status, .. } => Some(*status),
            HarvestError::RetryExhausted { last_status, .. } => Some(*last_status),
            HarvestError::ApiError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            HarvestError::ConfigError { .. }
            | HarvestError::ConfigValidationError { .. }
            | HarvestError::InvalidConfigValueError { .. }
            | HarvestError::MissingConfigError { .. } => ErrorCategory::Configuration,
            HarvestError::ApiError(_) | HarvestError::RetryExhausted { .. } => {
                ErrorCategory::Network
            }
            HarvestError::HttpStatus { .. }
            | HarvestError::ServiceException { .. }
            | HarvestError::XmlError(_) => ErrorCategory::Remote,
            HarvestError::IoError(_) | HarvestError::SerializationError(_) => {
                ErrorCategory::Storage
            }
            HarvestError::GdalError(_) | HarvestError::RasterError { .. } => ErrorCategory::Raster,
            HarvestError::ValidationError { .. } => ErrorCategory::Validation,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Remote | ErrorCategory::Raster => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Validation => ErrorSeverity::High,
            ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            HarvestError::RetryExhausted { .. } => {
                "The endpoint kept returning gateway errors; try again later or raise max_retries"
                    .to_string()
            }
            HarvestError::HttpStatus { status, .. } if *status == 404 => {
                "Check the layer name and endpoint URL in the [sources] table".to_string()
            }
            HarvestError::ServiceException { .. } => {
                "Check the bounding box, CRS and resolution against the coverage description"
                    .to_string()
            }
            HarvestError::ApiError(_) => "Check network connectivity and proxy settings".to_string(),
            HarvestError::IoError(_) => "Check that the output directory is writable".to_string(),
            HarvestError::GdalError(_) | HarvestError::RasterError { .. } => {
                "Check that the input file is a readable GeoTIFF and the region overlaps it"
                    .to_string()
            }
            HarvestError::MissingConfigError { field } => {
                format!("Add '{}' to the settings file", field)
            }
            HarvestError::ConfigValidationError { field, .. }
            | HarvestError::InvalidConfigValueError { field, .. } => {
                format!("Fix '{}' in the settings file", field)
            }
            _ => "Review the settings file and rerun with --verbose".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Settings problem: {}", self),
            ErrorCategory::Validation => format!("Invalid input: {}", self),
            ErrorCategory::Network => format!("Network problem: {}", self),
            ErrorCategory::Remote => format!("Remote service problem: {}", self),
            ErrorCategory::Storage => format!("File system problem: {}", self),
            ErrorCategory::Raster => format!("Raster processing problem: {}", self),
        }
    }
}
