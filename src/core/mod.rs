pub mod depth;
pub mod elevation;
pub mod fetcher;
pub mod harvester;
pub mod normalize;
pub mod radiometric;
pub mod raster;
pub mod retry;
pub mod soil;
pub mod sources;

pub use crate::domain::model::{BoundingBox, FetchOutcome, HarvestReport};
pub use crate::domain::ports::{CoverageCatalog, CoverageService, Storage};
pub use crate::utils::error::Result;
