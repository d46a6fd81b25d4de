//! Runs every configured source in turn, then optionally masks the outputs.

use crate::adapters::storage::LocalStorage;
use crate::adapters::wcs::WcsClient;
use crate::config::harvest_config::HarvestConfig;
use crate::core::elevation::{ElevationHarvester, GlobalElevationHarvester};
use crate::core::normalize::{is_derived, ClipGeometry, NormalizeOptions, RasterNormalizer};
use crate::core::radiometric::RadiometricHarvester;
use crate::core::soil::{SoilHarvestRequest, SoilHarvester};
use crate::core::sources::DataSource;
use crate::domain::model::{FetchOutcome, HarvestReport, OneOrMany};
use crate::utils::error::Result;
use crate::utils::logger::component_span;
use crate::utils::monitor::{PhaseStats, SystemMonitor};
use geo::MultiPolygon;
use std::path::{Path, PathBuf};

/// 區域幾何外擴距離（度）
pub const GEOMETRY_BUFFER_DEG: f64 = 0.002;
const GEOMETRY_CRS: &str = "EPSG:4326";
const MASK_PHASE: &str = "Mask";

/// 一次執行的結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestSummary {
    pub fetched: HarvestReport,
    pub masked: HarvestReport,
    /// 每個來源一筆，遮罩時另加 "Mask"
    pub phases: Vec<PhaseStats>,
}

pub struct Harvester {
    config: HarvestConfig,
    monitor: SystemMonitor,
    span: tracing::Span,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Self {
        Self::new_with_monitoring(config, false)
    }

    pub fn new_with_monitoring(config: HarvestConfig, monitor_enabled: bool) -> Self {
        Self {
            config,
            monitor: SystemMonitor::new(monitor_enabled),
            span: component_span("harvester"),
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// 遮罩範圍：傳入的幾何或設定檔的 bbox，視設定外擴
    pub fn clip_geometry(&self, geometry: Option<MultiPolygon<f64>>) -> ClipGeometry {
        let clip = match geometry {
            Some(shape) => ClipGeometry::new(GEOMETRY_CRS, shape),
            None => ClipGeometry::from_bbox(&self.config.target_bbox, GEOMETRY_CRS),
        };
        if self.config.add_buffer {
            clip.buffered(GEOMETRY_BUFFER_DEG)
        } else {
            clip
        }
    }

    /// Fetches every source, then masks the output directory when
    /// `data_mask` is set.
    ///
    /// A failing source is logged and recorded; only configuration errors and
    /// an unusable output directory abort the run.
    pub async fn run(&self, geometry: Option<MultiPolygon<f64>>) -> Result<HarvestSummary> {
        let sources = self.config.data_sources()?;
        let clip = self.clip_geometry(geometry);
        std::fs::create_dir_all(&self.config.outpath)?;

        tracing::info!(
            parent: &self.span,
            "🚀 Harvesting {} source(s) for '{}': {}",
            sources.len(),
            self.config.property_name,
            sources.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        );
        let mut summary = HarvestSummary::default();
        for source in &sources {
            tracing::info!(parent: &self.span, "📡 Processing {}", source.name());
            let (result, stats) = self
                .monitor
                .measure(source.name(), self.fetch_source(source))
                .await;
            summary.phases.push(stats);

            match result {
                Ok(report) => summary.fetched.extend(report),
                Err(e) => {
                    tracing::error!(
                        parent: &self.span,
                        "❌ Error fetching {}: {}",
                        source.name(),
                        e
                    );
                    summary
                        .fetched
                        .record(source.name(), FetchOutcome::Failed(e.to_string()));
                }
            }
        }

        if self.config.data_mask {
            let (masked, stats) = self.monitor.measure(MASK_PHASE, self.mask_outputs(&clip)).await;
            summary.masked = masked;
            summary.phases.push(stats);
        }

        tracing::info!(
            parent: &self.span,
            "🏁 Harvest finished: {} file(s) written, {} masked, {} failure(s)",
            summary.fetched.fetched_paths().len(),
            summary.masked.fetched_paths().len(),
            summary.fetched.failures().count() + summary.masked.failures().count()
        );
        self.monitor.log_final_stats(&summary.phases);
        Ok(summary)
    }

    async fn fetch_source(&self, source: &DataSource) -> Result<HarvestReport> {
        let config = &self.config;
        let retry = config.sources.retry.clone();
        let bbox = config.target_bbox;

        match source {
            DataSource::Soil { layers } => {
                let soil = &config.sources.soil;
                let harvester = SoilHarvester::new(
                    WcsClient::new(soil.timeout(), component_span("soil")),
                    LocalStorage::new(),
                    soil.clone(),
                    retry,
                    component_span("soil"),
                );
                let request = SoilHarvestRequest::new(
                    config.property_name.clone(),
                    OneOrMany::Many(layers.iter().map(|l| l.layer.clone()).collect()),
                    bbox,
                    config.outpath.clone(),
                )
                .with_depths(
                    OneOrMany::Many(layers.iter().map(|l| l.depth_min).collect()),
                    OneOrMany::Many(layers.iter().map(|l| l.depth_max).collect()),
                )
                .with_confidence_intervals(config.get_confidence_intervals);
                harvester.harvest(&request).await
            }
            DataSource::Elevation { layers } => {
                let dem = &config.sources.elevation;
                let harvester = ElevationHarvester::new(
                    WcsClient::new(dem.timeout(), component_span("elevation")),
                    LocalStorage::new(),
                    dem.clone(),
                    retry,
                    component_span("elevation"),
                );
                harvester
                    .harvest(&config.property_name, layers, &bbox, &config.outpath)
                    .await
            }
            DataSource::ElevationGlobal { layers } => {
                let harvester = GlobalElevationHarvester::new(
                    config.sources.elevation_global.clone(),
                    component_span("elevation_global"),
                );
                harvester
                    .harvest(
                        &config.property_name,
                        layers,
                        &bbox,
                        &config.outpath,
                        config.date_range(),
                    )
                    .await
            }
            DataSource::Radiometric { layers } => {
                let radiometric = &config.sources.radiometric;
                let harvester = RadiometricHarvester::new(
                    WcsClient::new(radiometric.timeout(), component_span("radiometric")),
                    LocalStorage::new(),
                    radiometric.clone(),
                    retry,
                    component_span("radiometric"),
                );
                harvester
                    .harvest(&config.property_name, layers, &bbox, &config.outpath)
                    .await
            }
        }
    }

    async fn mask_outputs(&self, clip: &ClipGeometry) -> HarvestReport {
        let mut report = HarvestReport::new();
        let files = match maskable_files(&self.config.outpath) {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(parent: &self.span, "❌ Error listing tiff files: {}", e);
                report.record(
                    self.config.outpath.display().to_string(),
                    FetchOutcome::Failed(e.to_string()),
                );
                return report;
            }
        };

        let normalizer = RasterNormalizer::new(component_span("normalize"));
        let options = NormalizeOptions {
            target_crs: self.config.target_crs.clone(),
            resample: self.config.resample,
        };

        for file in files {
            let label = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::info!(parent: &self.span, "🎭 Masking {}", label);

            match normalizer
                .normalize_file(file.clone(), clip.clone(), options.clone())
                .await
            {
                Ok(path) => report.record(label, FetchOutcome::Success(path)),
                Err(e) => {
                    tracing::error!(parent: &self.span, "❌ Error masking {}: {}", label, e);
                    report.record(label, FetchOutcome::Failed(e.to_string()));
                }
            }
        }
        report
    }
}

/// 輸出目錄中尚未遮罩的 `.tiff`，依檔名排序
pub fn maskable_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_tiff = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(".tiff"));
        if path.is_file() && is_tiff && !is_derived(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
