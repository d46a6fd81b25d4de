//! Multi-layer, multi-depth soil harvesting.
//!
//! One WCS endpoint per soil attribute; within an endpoint each fixed depth
//! slice (and its confidence bounds) is a separate coverage.

use crate::config::sources::SoilSourceConfig;
use crate::core::depth::{resolve_depth_intervals, ResolvedInterval};
use crate::core::fetcher::LayerFetcher;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{
    BoundingBox, ConfidenceBand, CoverageRequest, DepthInterval, FetchOutcome, GridSpec,
    HarvestReport, LayerRequest, OneOrMany,
};
use crate::domain::ports::{CoverageService, Storage};
use crate::utils::error::{HarvestError, Result};
use crate::utils::units::arcsec_to_degrees;
use std::path::PathBuf;

/// 一次土壤擷取呼叫的參數
#[derive(Debug, Clone, PartialEq)]
pub struct SoilHarvestRequest {
    pub property_name: String,
    pub layer_names: OneOrMany<String>,
    pub bbox: BoundingBox,
    pub output_dir: PathBuf,
    /// 角秒；None 表示使用來源的原生解析度
    pub resolution_arcsec: Option<f64>,
    pub depth_min: OneOrMany<i32>,
    pub depth_max: OneOrMany<i32>,
    pub want_confidence_intervals: bool,
}

impl SoilHarvestRequest {
    pub fn new(
        property_name: impl Into<String>,
        layer_names: impl Into<OneOrMany<String>>,
        bbox: BoundingBox,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            layer_names: layer_names.into(),
            bbox,
            output_dir: output_dir.into(),
            resolution_arcsec: None,
            depth_min: OneOrMany::One(0),
            depth_max: OneOrMany::One(200),
            want_confidence_intervals: false,
        }
    }

    pub fn with_depths(
        mut self,
        depth_min: impl Into<OneOrMany<i32>>,
        depth_max: impl Into<OneOrMany<i32>>,
    ) -> Self {
        self.depth_min = depth_min.into();
        self.depth_max = depth_max.into();
        self
    }

    pub fn with_resolution(mut self, arcsec: f64) -> Self {
        self.resolution_arcsec = Some(arcsec);
        self
    }

    pub fn with_confidence_intervals(mut self, enabled: bool) -> Self {
        self.want_confidence_intervals = enabled;
        self
    }

    /// Broadcasts scalar depths over the layers and pairs them up.
    pub fn layer_requests(&self) -> Result<Vec<LayerRequest>> {
        let layers = self.layer_names.clone().into_vec();
        let depth_min = self.depth_min.clone().broadcast(layers.len());
        let depth_max = self.depth_max.clone().broadcast(layers.len());

        if depth_min.len() != layers.len() || depth_max.len() != layers.len() {
            return Err(HarvestError::validation(format!(
                "Depth and layer name lists must be of the same length (layers: {}, depth_min: {}, depth_max: {})",
                layers.len(),
                depth_min.len(),
                depth_max.len()
            )));
        }

        Ok(layers
            .into_iter()
            .zip(depth_min)
            .zip(depth_max)
            .map(|((layer_name, depth_min), depth_max)| LayerRequest {
                property_name: self.property_name.clone(),
                layer_name,
                depth_min,
                depth_max,
                want_confidence_intervals: self.want_confidence_intervals,
            })
            .collect())
    }
}

/// `{SOURCE}_{layer}_{lo}-{hi}cm_{property}[_{5|95}percentile].tiff`
pub fn soil_filename(
    source_tag: &str,
    layer: &str,
    interval: &DepthInterval,
    property_name: &str,
    band: ConfidenceBand,
) -> String {
    format!(
        "{}_{}_{}_{}{}.tiff",
        source_tag,
        layer,
        interval.label(),
        property_name,
        band.filename_suffix()
    )
}

pub struct SoilHarvester<C: CoverageService, S: Storage> {
    fetcher: LayerFetcher<C, S>,
    source: SoilSourceConfig,
}

impl<C: CoverageService, S: Storage> SoilHarvester<C, S> {
    pub fn new(
        service: C,
        storage: S,
        source: SoilSourceConfig,
        retry: RetryPolicy,
        span: tracing::Span,
    ) -> Self {
        Self {
            fetcher: LayerFetcher::new(service, storage, retry, span),
            source,
        }
    }

    fn span(&self) -> &tracing::Span {
        self.fetcher.span()
    }

    /// Fetches every requested (layer, depth slice, band) in order.
    ///
    /// Only argument validation and output directory creation fail the call;
    /// per-coverage problems end up in the report.
    pub async fn harvest(&self, request: &SoilHarvestRequest) -> Result<HarvestReport> {
        let layer_requests = request.layer_requests()?;
        std::fs::create_dir_all(&request.output_dir)?;

        let resolution_deg =
            arcsec_to_degrees(request.resolution_arcsec.unwrap_or(self.source.resolution_arcsec));
        let grid = GridSpec::Resolution {
            resx: resolution_deg,
            resy: resolution_deg,
        };

        tracing::info!(
            parent: self.span(),
            "🌱 Harvesting {} {} layer(s) at {:.6}° into {}",
            layer_requests.len(),
            self.source.source_tag,
            resolution_deg,
            request.output_dir.display()
        );

        let mut report = HarvestReport::new();
        for layer_request in &layer_requests {
            self.harvest_layer(layer_request, request, grid, &mut report)
                .await;
        }

        tracing::info!(
            parent: self.span(),
            "📦 {} finished: {} written, {} failed, {} skipped",
            self.source.source_tag,
            report.fetched_paths().len(),
            report.failures().count(),
            report.skipped_count()
        );
        Ok(report)
    }

    async fn harvest_layer(
        &self,
        layer: &LayerRequest,
        request: &SoilHarvestRequest,
        grid: GridSpec,
        report: &mut HarvestReport,
    ) {
        let label = format!(
            "{}_{}_{}-{}cm",
            self.source.source_tag, layer.layer_name, layer.depth_min, layer.depth_max
        );

        let Some(url) = self.source.layer_url(&layer.layer_name) else {
            tracing::error!(
                parent: self.span(),
                "❌ Unknown {} layer '{}'; known layers: {}",
                self.source.source_tag,
                layer.layer_name,
                self.source.layers.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            report.record(
                label,
                FetchOutcome::Failed(format!("unknown layer '{}'", layer.layer_name)),
            );
            return;
        };

        let intervals = resolve_depth_intervals(layer.depth_min, layer.depth_max);
        if intervals.is_empty() {
            tracing::warn!(
                parent: self.span(),
                "⚠️ No depth slice lies within {}-{}cm for {}; nothing to fetch",
                layer.depth_min,
                layer.depth_max,
                layer.layer_name
            );
            report.record(label, FetchOutcome::SkippedNoData);
            return;
        }

        // 先取所有深度的估計值，再逐一深度取 5%、95% 信賴界限
        let mut plan: Vec<(&ResolvedInterval, ConfidenceBand)> = intervals
            .iter()
            .map(|resolved| (resolved, ConfidenceBand::Estimate))
            .collect();
        if layer.want_confidence_intervals {
            plan.extend(intervals.iter().flat_map(|resolved| {
                [
                    (resolved, ConfidenceBand::Percentile5),
                    (resolved, ConfidenceBand::Percentile95),
                ]
            }));
        }

        for (resolved, band) in plan {
            let filename = soil_filename(
                &self.source.source_tag,
                &layer.layer_name,
                &resolved.interval,
                &layer.property_name,
                band,
            );
            let coverage = CoverageRequest::geotiff(
                url,
                resolved.identifier_for(band).as_str(),
                self.source.crs.as_str(),
                request.bbox,
                grid,
            );

            let outcome = self
                .fetcher
                .fetch(&coverage, &request.output_dir.join(&filename))
                .await;
            report.record(filename, outcome);
        }
    }
}
