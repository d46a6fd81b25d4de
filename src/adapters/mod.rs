// Adapters layer: concrete implementations for external systems (WCS, STAC, storage).

pub mod stac;
pub mod storage;
pub mod wcs;
