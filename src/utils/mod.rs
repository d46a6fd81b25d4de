pub mod error;
pub mod logger;
pub mod monitor;
pub mod units;
pub mod validation;
