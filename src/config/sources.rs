use crate::core::retry::RetryPolicy;
use crate::utils::error::{HarvestError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const MAX_TIMEOUT_SECONDS: u64 = 86_400;

const SLGA_WCS_TEMPLATE: &str =
    "https://www.asris.csiro.au/arcgis/services/TERN/{code}_ACLEP_AU_NAT_C/MapServer/WCSServer";

/// SLGA 屬性名稱與其 ArcGIS 服務代碼
const SLGA_LAYER_CODES: [(&str, &str); 12] = [
    ("Bulk_Density", "BDW"),
    ("Organic_Carbon", "SOC"),
    ("Clay", "CLY"),
    ("Silt", "SLT"),
    ("Sand", "SND"),
    ("pH_CaCl2", "PHC"),
    ("Available_Water_Capacity", "AWC"),
    ("Total_Nitrogen", "NTO"),
    ("Total_Phosphorus", "PTO"),
    ("Effective_Cation_Exchange_Capacity", "ECE"),
    ("Depth_of_Regolith", "DER"),
    ("Depth_of_Soil", "DES"),
];

/// 土壤 (SLGA) 來源：每個屬性一個 WCS 端點
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilSourceConfig {
    pub title: String,
    pub source_tag: String,
    pub crs: String,
    pub resolution_arcsec: f64,
    pub timeout_seconds: u64,
    pub layers: BTreeMap<String, String>,
}

impl Default for SoilSourceConfig {
    fn default() -> Self {
        let layers = SLGA_LAYER_CODES
            .iter()
            .map(|(name, code)| (name.to_string(), SLGA_WCS_TEMPLATE.replace("{code}", code)))
            .collect();

        Self {
            title: "Soil and Landscape Grid of Australia".to_string(),
            source_tag: "SLGA".to_string(),
            crs: "EPSG:4326".to_string(),
            resolution_arcsec: 3.0,
            timeout_seconds: 600,
            layers,
        }
    }
}

impl SoilSourceConfig {
    pub fn layer_url(&self, layer: &str) -> Option<&str> {
        self.layers.get(layer).map(String::as_str)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// 澳洲 1 角秒 DEM (WCS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationSourceConfig {
    pub title: String,
    pub url: String,
    pub coverage: String,
    pub crs: String,
    pub resolution_arcsec: f64,
    pub timeout_seconds: u64,
}

impl Default for ElevationSourceConfig {
    fn default() -> Self {
        Self {
            title: "DEM SRTM 1 Second Hydro Enforced".to_string(),
            url: "https://services.ga.gov.au/site_9/services/DEM_SRTM_1Second_Hydro_Enforced/MapServer/WCSServer"
                .to_string(),
            coverage: "1".to_string(),
            crs: "EPSG:4326".to_string(),
            resolution_arcsec: 1.0,
            timeout_seconds: 600,
        }
    }
}

impl ElevationSourceConfig {
    /// 輸出檔名前綴：標題空白改為底線
    pub fn file_stem(&self) -> String {
        self.title.split_whitespace().collect::<Vec<_>>().join("_")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Copernicus GLO-30 (STAC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalElevationSourceConfig {
    pub title: String,
    pub stac_url: String,
    pub collections: Vec<String>,
    pub asset_key: String,
    pub item_limit: usize,
    pub timeout_seconds: u64,
}

impl Default for GlobalElevationSourceConfig {
    fn default() -> Self {
        Self {
            title: "DEM Global".to_string(),
            stac_url: "https://earth-search.aws.element84.com/v1".to_string(),
            collections: vec!["cop-dem-glo-30".to_string()],
            asset_key: "data".to_string(),
            item_limit: 100,
            timeout_seconds: 300,
        }
    }
}

impl GlobalElevationSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// 全國輻射測量彙編 (WCS，含時間維度)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiometricSourceConfig {
    pub title: String,
    pub url: String,
    pub crs: String,
    pub resolution_arcsec: f64,
    pub timeout_seconds: u64,
    pub layer_names: Vec<String>,
}

impl Default for RadiometricSourceConfig {
    fn default() -> Self {
        Self {
            title: "Radiometric Grid of Australia (Radmap) v4 2019".to_string(),
            url: "https://gsky.nci.org.au/ows/national_geophysical_compilations?service=WCS"
                .to_string(),
            crs: "EPSG:4326".to_string(),
            resolution_arcsec: 3.6,
            timeout_seconds: 300,
            layer_names: [
                "radmap2019_grid_dose_terr_awags_rad_2019",
                "radmap2019_grid_dose_terr_filtered_awags_rad_2019",
                "radmap2019_grid_k_conc_awags_rad_2019",
                "radmap2019_grid_k_conc_filtered_awags_rad_2019",
                "radmap2019_grid_th_conc_awags_rad_2019",
                "radmap2019_grid_th_conc_filtered_awags_rad_2019",
                "radmap2019_grid_u_conc_awags_rad_2019",
                "radmap2019_grid_u_conc_filtered_awags_rad_2019",
                "radmap2019_grid_thk_ratio_awags_rad_2019",
                "radmap2019_grid_uk_ratio_awags_rad_2019",
                "radmap2019_grid_uth_ratio_awags_rad_2019",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl RadiometricSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// 設定檔中可選的 `[sources]` 表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub soil: SoilSourceConfig,
    pub elevation: ElevationSourceConfig,
    pub elevation_global: GlobalElevationSourceConfig,
    pub radiometric: RadiometricSourceConfig,
    pub retry: RetryPolicy,
}

impl Validate for SourcesConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("sources.soil.source_tag", &self.soil.source_tag)?;
        validate_range("sources.soil.resolution_arcsec", self.soil.resolution_arcsec, 0.01, 3600.0)?;
        validate_timeout("sources.soil.timeout_seconds", self.soil.timeout_seconds)?;
        for (layer, url) in &self.soil.layers {
            validate_url(&format!("sources.soil.layers.{}", layer), url)?;
        }

        validate_url("sources.elevation.url", &self.elevation.url)?;
        validate_non_empty_string("sources.elevation.coverage", &self.elevation.coverage)?;
        validate_range(
            "sources.elevation.resolution_arcsec",
            self.elevation.resolution_arcsec,
            0.01,
            3600.0,
        )?;
        validate_timeout("sources.elevation.timeout_seconds", self.elevation.timeout_seconds)?;

        validate_url("sources.elevation_global.stac_url", &self.elevation_global.stac_url)?;
        if self.elevation_global.collections.is_empty() {
            return Err(HarvestError::MissingConfigError {
                field: "sources.elevation_global.collections".to_string(),
            });
        }
        validate_timeout(
            "sources.elevation_global.timeout_seconds",
            self.elevation_global.timeout_seconds,
        )?;

        validate_url("sources.radiometric.url", &self.radiometric.url)?;
        validate_range(
            "sources.radiometric.resolution_arcsec",
            self.radiometric.resolution_arcsec,
            0.01,
            3600.0,
        )?;
        validate_timeout("sources.radiometric.timeout_seconds", self.radiometric.timeout_seconds)?;

        self.retry.validate()
    }
}

/// 逾時為 0 時 reqwest 每個請求都會立即失敗
fn validate_timeout(field: &str, seconds: u64) -> Result<()> {
    validate_range(field, seconds, 1, MAX_TIMEOUT_SECONDS)
}
