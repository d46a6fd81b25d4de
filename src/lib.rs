pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use adapters::{stac::StacClient, storage::LocalStorage, wcs::WcsClient};
pub use config::{HarvestConfig, SourcesConfig};
pub use core::harvester::{HarvestSummary, Harvester};
pub use core::normalize::{ClipGeometry, NormalizeOptions, RasterNormalizer};
pub use core::soil::{SoilHarvestRequest, SoilHarvester};
pub use domain::model::{BoundingBox, FetchOutcome, HarvestReport};
pub use utils::error::{HarvestError, Result};
