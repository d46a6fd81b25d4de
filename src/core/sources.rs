use crate::config::harvest_config::SourceSelection;
use crate::core::depth::{depth_bounds_from_labels, DEPTH_PARTITION};
use crate::utils::error::{HarvestError, Result};

pub const SOIL: &str = "SLGA";
pub const ELEVATION: &str = "DEM";
pub const ELEVATION_GLOBAL: &str = "DEM Global";
pub const RADIOMETRIC: &str = "Radiometric";

pub const KNOWN_SOURCES: [&str; 4] = [SOIL, ELEVATION, ELEVATION_GLOBAL, RADIOMETRIC];

/// 一個土壤屬性及其深度範圍 (公分)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoilLayerSelection {
    pub layer: String,
    pub depth_min: i32,
    pub depth_max: i32,
}

/// 設定檔 `target_sources` 中的一個來源
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Soil { layers: Vec<SoilLayerSelection> },
    Elevation { layers: Vec<String> },
    ElevationGlobal { layers: Vec<String> },
    Radiometric { layers: Vec<String> },
}

impl DataSource {
    /// Builds a source from its settings key and selection.
    ///
    /// Soil selections map each layer to depth labels, which are resolved to
    /// a `(min, max)` range here; a bare layer list means the full profile.
    pub fn from_name(name: &str, selection: &SourceSelection) -> Result<Self> {
        match name {
            SOIL => Ok(DataSource::Soil {
                layers: soil_layers(selection)?,
            }),
            ELEVATION => Ok(DataSource::Elevation {
                layers: layer_names(name, selection)?,
            }),
            ELEVATION_GLOBAL => Ok(DataSource::ElevationGlobal {
                layers: layer_names(name, selection)?,
            }),
            RADIOMETRIC => Ok(DataSource::Radiometric {
                layers: layer_names(name, selection)?,
            }),
            other => Err(HarvestError::InvalidConfigValueError {
                field: "target_sources".to_string(),
                value: other.to_string(),
                reason: format!("Unknown data source. Known sources: {}", KNOWN_SOURCES.join(", ")),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataSource::Soil { .. } => SOIL,
            DataSource::Elevation { .. } => ELEVATION,
            DataSource::ElevationGlobal { .. } => ELEVATION_GLOBAL,
            DataSource::Radiometric { .. } => RADIOMETRIC,
        }
    }

    pub fn layer_count(&self) -> usize {
        match self {
            DataSource::Soil { layers } => layers.len(),
            DataSource::Elevation { layers }
            | DataSource::ElevationGlobal { layers }
            | DataSource::Radiometric { layers } => layers.len(),
        }
    }
}

fn soil_layers(selection: &SourceSelection) -> Result<Vec<SoilLayerSelection>> {
    match selection {
        SourceSelection::Depths(layers) => layers
            .iter()
            .map(|(layer, labels)| {
                let (depth_min, depth_max) = depth_bounds_from_labels(labels).map_err(|e| {
                    HarvestError::validation(format!("{} layer '{}': {}", SOIL, layer, e))
                })?;
                Ok(SoilLayerSelection {
                    layer: layer.clone(),
                    depth_min,
                    depth_max,
                })
            })
            .collect(),
        SourceSelection::Layers(names) => Ok(names
            .clone()
            .into_vec()
            .into_iter()
            .map(|layer| SoilLayerSelection {
                layer,
                depth_min: DEPTH_PARTITION[0],
                depth_max: DEPTH_PARTITION[DEPTH_PARTITION.len() - 1],
            })
            .collect()),
    }
}

fn layer_names(source: &str, selection: &SourceSelection) -> Result<Vec<String>> {
    match selection {
        SourceSelection::Layers(names) => Ok(names.clone().into_vec()),
        SourceSelection::Depths(_) => Err(HarvestError::InvalidConfigValueError {
            field: format!("target_sources.{}", source),
            value: "{...}".to_string(),
            reason: "Expected a layer name or a list of layer names".to_string(),
        }),
    }
}
