#[cfg(feature = "cli")]
pub mod cli;
pub mod harvest_config;
pub mod sources;

#[cfg(feature = "cli")]
pub use cli::CliArgs;
pub use harvest_config::{HarvestConfig, SourceSelection};
pub use sources::SourcesConfig;
