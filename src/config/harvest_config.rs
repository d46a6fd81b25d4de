use crate::config::sources::SourcesConfig;
use crate::core::sources::DataSource;
use crate::domain::model::{BoundingBox, OneOrMany};
use crate::utils::error::{HarvestError, Result};
use crate::utils::validation::{
    validate_bbox, validate_non_empty_string, validate_path, Validate,
};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern"));

/// `target_sources` 中每個來源的選擇
///
/// SLGA 以 `{layer: [depth labels]}` 指定，其他來源是單一或多個圖層名稱。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSelection {
    Depths(BTreeMap<String, Vec<String>>),
    Layers(OneOrMany<String>),
}

/// 擷取設定檔
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub target_sources: BTreeMap<String, SourceSelection>,
    pub target_bbox: BoundingBox,
    pub property_name: String,
    pub outpath: PathBuf,
    #[serde(deserialize_with = "crs_from_code_or_name")]
    pub target_crs: String,
    #[serde(default)]
    pub resample: bool,
    #[serde(default)]
    pub add_buffer: bool,
    #[serde(default)]
    pub data_mask: bool,
    #[serde(default)]
    pub get_confidence_intervals: bool,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// 接受 `3857` 或 `"EPSG:3857"`
fn crs_from_code_or_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Crs {
        Code(u32),
        Name(String),
    }

    Ok(match Crs::deserialize(deserializer)? {
        Crs::Code(code) => format!("EPSG:{}", code),
        Crs::Name(name) => name,
    })
}

impl HarvestConfig {
    /// 依副檔名載入：`.json` 用 JSON，其餘用 TOML；載入後立即驗證
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(HarvestError::IoError)?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        let config: Self =
            toml::from_str(&processed).map_err(|e| HarvestError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        let config: Self =
            serde_json::from_str(&processed).map_err(|e| HarvestError::ConfigValidationError {
                field: "json_parsing".to_string(),
                message: format!("JSON parsing error: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// 替換 `${VAR}`；未設定的變數保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_RE
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 依設定檔順序 (BTreeMap 鍵序) 建立資料來源
    pub fn data_sources(&self) -> Result<Vec<DataSource>> {
        self.target_sources
            .iter()
            .map(|(name, selection)| DataSource::from_name(name, selection))
            .collect()
    }

    pub fn date_range(&self) -> (Option<&str>, Option<&str>) {
        (self.date_start.as_deref(), self.date_end.as_deref())
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.target_sources.is_empty() {
            return Err(HarvestError::MissingConfigError {
                field: "target_sources".to_string(),
            });
        }
        self.data_sources()?;

        validate_bbox("target_bbox", &self.target_bbox.to_array())?;
        validate_non_empty_string("property_name", &self.property_name)?;
        validate_path("outpath", &self.outpath.to_string_lossy())?;
        validate_non_empty_string("target_crs", &self.target_crs)?;

        for (field, value) in [("date_start", &self.date_start), ("date_end", &self.date_end)] {
            if let Some(date) = value {
                NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
                    HarvestError::InvalidConfigValueError {
                        field: field.to_string(),
                        value: date.clone(),
                        reason: format!("Expected YYYY-MM-DD: {}", e),
                    }
                })?;
            }
        }

        self.sources.validate()
    }
}

impl Validate for HarvestConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SETTINGS_JSON: &str = r#"{
        "target_sources": {
            "SLGA": {"Clay": ["0-5cm", "5-15cm"], "Bulk_Density": ["100-200cm"]},
            "DEM": ["DEM"],
            "Radiometric": "radmap2019_grid_dose_terr_awags_rad_2019"
        },
        "target_bbox": [149.769, -30.335, 149.949, -30.238],
        "property_name": "paddock_7",
        "outpath": "harvest_out",
        "target_crs": 4326,
        "add_buffer": true,
        "data_mask": true,
        "date_start": "2022-10-01",
        "date_end": "2022-11-30"
    }"#;

    #[test]
    fn test_parse_settings_json() {
        let config = HarvestConfig::from_json_str(SETTINGS_JSON).unwrap();

        assert_eq!(config.target_crs, "EPSG:4326");
        assert_eq!(config.target_bbox, BoundingBox::new(149.769, -30.335, 149.949, -30.238));
        assert!(config.add_buffer && config.data_mask && !config.resample);
        assert_eq!(config.date_range(), (Some("2022-10-01"), Some("2022-11-30")));
        assert!(matches!(
            config.target_sources.get("SLGA"),
            Some(SourceSelection::Depths(layers)) if layers.len() == 2
        ));
        assert!(matches!(
            config.target_sources.get("Radiometric"),
            Some(SourceSelection::Layers(OneOrMany::One(_)))
        ));
        assert_eq!(config.sources, SourcesConfig::default());
    }

    #[test]
    fn test_parse_toml_with_sources_override() {
        let config = HarvestConfig::from_toml_str(
            r#"
target_bbox = [149.0, -35.0, 149.1, -34.9]
property_name = "site"
outpath = "./out"
target_crs = "EPSG:3857"

[target_sources]
"DEM Global" = ["DEM Global"]

[sources.elevation_global]
stac_url = "http://localhost:9000/stac"
"#,
        )
        .unwrap();

        assert_eq!(config.target_crs, "EPSG:3857");
        assert_eq!(config.sources.elevation_global.stac_url, "http://localhost:9000/stac");
        assert_eq!(config.data_sources().unwrap().len(), 1);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("HARVEST_TEST_OUTPATH", "/data/harvest");

        let config = HarvestConfig::from_toml_str(
            r#"
target_bbox = [149.0, -35.0, 149.1, -34.9]
property_name = "site"
outpath = "${HARVEST_TEST_OUTPATH}"
target_crs = 4326

[target_sources]
DEM = "DEM"
"#,
        )
        .unwrap();
        assert_eq!(config.outpath, PathBuf::from("/data/harvest"));

        std::env::remove_var("HARVEST_TEST_OUTPATH");
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let err = HarvestConfig::from_json_str(
            r#"{
                "target_sources": {"Landsat": ["B4"]},
                "target_bbox": [149.0, -35.0, 149.1, -34.9],
                "property_name": "site",
                "outpath": "out",
                "target_crs": 4326
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Landsat"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let inverted_bbox = SETTINGS_JSON.replace("149.769, -30.335, 149.949", "149.949, -30.335, 149.769");
        assert!(HarvestConfig::from_json_str(&inverted_bbox).is_err());

        let bad_date = SETTINGS_JSON.replace("2022-10-01", "01/10/2022");
        assert!(HarvestConfig::from_json_str(&bad_date).is_err());

        let bad_depth = SETTINGS_JSON.replace("\"5-15cm\"", "\"5-10cm\"");
        let err = HarvestConfig::from_json_str(&bad_depth).unwrap_err();
        assert!(err.to_string().contains("5-10cm"));
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json_file.write_all(SETTINGS_JSON.as_bytes()).unwrap();
        let config = HarvestConfig::from_file(json_file.path()).unwrap();
        assert_eq!(config.property_name, "paddock_7");

        let mut toml_file = NamedTempFile::new().unwrap();
        toml_file
            .write_all(
                br#"
target_bbox = [149.0, -35.0, 149.1, -34.9]
property_name = "from_toml"
outpath = "out"
target_crs = 4326

[target_sources.SLGA]
Clay = ["0-5cm"]
"#,
            )
            .unwrap();
        let config = HarvestConfig::from_file(toml_file.path()).unwrap();
        assert_eq!(config.property_name, "from_toml");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = HarvestConfig::from_file("/nonexistent/settings.json").unwrap_err();
        assert!(matches!(err, HarvestError::IoError(_)));
    }
}
