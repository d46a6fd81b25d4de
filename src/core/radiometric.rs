use crate::config::sources::RadiometricSourceConfig;
use crate::core::fetcher::LayerFetcher;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{BoundingBox, CoverageRequest, FetchOutcome, GridSpec, HarvestReport};
use crate::domain::ports::{CoverageCatalog, CoverageService, Storage};
use crate::utils::error::Result;
use std::path::Path;

pub fn radiometric_filename(layer: &str, property_name: &str) -> String {
    format!("radiometric_{}_{}.tiff", layer, property_name)
}

const PIXEL_EPSILON: f64 = 1e-6;

/// 由範圍與角秒解析度算出像素寬高（無條件捨去，至少 1）
pub fn pixel_size(bbox: &BoundingBox, resolution_arcsec: f64) -> (usize, usize) {
    let pixels = |extent: f64| {
        ((extent.abs() / resolution_arcsec * 3600.0 + PIXEL_EPSILON).floor() as usize).max(1)
    };
    (pixels(bbox.width()), pixels(bbox.height()))
}

/// 輻射測量圖：每個圖層先查時間點，再以像素寬高請求
pub struct RadiometricHarvester<C: CoverageService + CoverageCatalog, S: Storage> {
    fetcher: LayerFetcher<C, S>,
    source: RadiometricSourceConfig,
}

impl<C: CoverageService + CoverageCatalog, S: Storage> RadiometricHarvester<C, S> {
    pub fn new(
        service: C,
        storage: S,
        source: RadiometricSourceConfig,
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

    pub async fn harvest(
        &self,
        property_name: &str,
        layers: &[String],
        bbox: &BoundingBox,
        output_dir: &Path,
    ) -> Result<HarvestReport> {
        std::fs::create_dir_all(output_dir)?;
        let (width, height) = pixel_size(bbox, self.source.resolution_arcsec);

        let mut report = HarvestReport::new();
        for layer in layers {
            let filename = radiometric_filename(layer, property_name);
            let outcome = self
                .harvest_layer(layer, bbox, (width, height), &output_dir.join(&filename))
                .await;
            report.record(filename, outcome);
        }
        Ok(report)
    }

    async fn harvest_layer(
        &self,
        layer: &str,
        bbox: &BoundingBox,
        (width, height): (usize, usize),
        destination: &Path,
    ) -> FetchOutcome {
        if self.fetcher.storage().exists(destination) {
            tracing::info!(
                parent: self.span(),
                "⏭️ {} already exists, skipping download",
                destination.display()
            );
            return FetchOutcome::Success(destination.to_path_buf());
        }

        if !self.source.layer_names.iter().any(|known| known == layer) {
            tracing::warn!(
                parent: self.span(),
                "⚠️ '{}' is not a known {} layer; requesting it anyway",
                layer,
                self.source.title
            );
        }

        let times = self
            .fetcher
            .retry()
            .run(self.span(), || {
                self.fetcher
                    .service()
                    .time_positions(&self.source.url, layer, None)
            })
            .await;

        let time = match times {
            Ok(times) => match times.into_iter().next() {
                Some(time) => time,
                None => {
                    tracing::error!(
                        parent: self.span(),
                        "❌ No time positions advertised for {}",
                        layer
                    );
                    return FetchOutcome::Failed(format!("no time positions for '{}'", layer));
                }
            },
            Err(e) => {
                tracing::error!(
                    parent: self.span(),
                    "❌ DescribeCoverage failed for {}: {}",
                    layer,
                    e
                );
                return FetchOutcome::Failed(e.to_string());
            }
        };

        tracing::debug!(
            parent: self.span(),
            "🕒 {} at {} ({}x{} px)",
            layer,
            time,
            width,
            height
        );

        let request = CoverageRequest::geotiff(
            self.source.url.as_str(),
            layer,
            self.source.crs.as_str(),
            *bbox,
            GridSpec::Size { width, height },
        )
        .with_time(time);

        self.fetcher.fetch(&request, destination).await
    }
}
