use crate::adapters::stac::{StacClient, StacSearch};
use crate::config::sources::{ElevationSourceConfig, GlobalElevationSourceConfig};
use crate::core::fetcher::LayerFetcher;
use crate::core::raster::{pixel_window, read_band_as_f32, window_geo_transform, write_float_geotiff};
use crate::core::retry::RetryPolicy;
use crate::core::sources::{ELEVATION, ELEVATION_GLOBAL};
use crate::domain::model::{BoundingBox, CoverageRequest, FetchOutcome, GridSpec, HarvestReport};
use crate::domain::ports::{CoverageService, Storage};
use crate::utils::error::{HarvestError, Result};
use crate::utils::units::arcsec_to_degrees;
use gdal::Dataset;
use std::path::{Path, PathBuf};

/// `{title}_{property}.tiff`，標題空白換成底線
pub fn elevation_filename(source: &ElevationSourceConfig, property_name: &str) -> String {
    format!("{}_{}.tiff", source.file_stem(), property_name)
}

pub fn global_elevation_filename(source: &GlobalElevationSourceConfig, property_name: &str) -> String {
    format!(
        "{}_COP_30_GLO_{}.tiff",
        source.title.split_whitespace().collect::<Vec<_>>().join("_"),
        property_name
    )
}

/// 澳洲 DEM：單一 WCS coverage
pub struct ElevationHarvester<C: CoverageService, S: Storage> {
    fetcher: LayerFetcher<C, S>,
    source: ElevationSourceConfig,
}

impl<C: CoverageService, S: Storage> ElevationHarvester<C, S> {
    pub fn new(
        service: C,
        storage: S,
        source: ElevationSourceConfig,
        retry: RetryPolicy,
        span: tracing::Span,
    ) -> Self {
        Self {
            fetcher: LayerFetcher::new(service, storage, retry, span),
            source,
        }
    }

    pub async fn harvest(
        &self,
        property_name: &str,
        layers: &[String],
        bbox: &BoundingBox,
        output_dir: &Path,
    ) -> Result<HarvestReport> {
        std::fs::create_dir_all(output_dir)?;
        let resolution = arcsec_to_degrees(self.source.resolution_arcsec);

        let mut report = HarvestReport::new();
        for layer in layers {
            if layer != ELEVATION {
                tracing::error!(
                    parent: self.fetcher.span(),
                    "❌ Unknown {} layer '{}'; expected '{}'",
                    ELEVATION,
                    layer,
                    ELEVATION
                );
                report.record(layer.clone(), FetchOutcome::Failed(format!("unknown layer '{}'", layer)));
                continue;
            }

            let filename = elevation_filename(&self.source, property_name);
            let request = CoverageRequest::geotiff(
                self.source.url.as_str(),
                self.source.coverage.as_str(),
                self.source.crs.as_str(),
                *bbox,
                GridSpec::Resolution {
                    resx: resolution,
                    resy: resolution,
                },
            );
            let outcome = self.fetcher.fetch(&request, &output_dir.join(&filename)).await;
            report.record(filename, outcome);
        }
        Ok(report)
    }
}

/// GDAL 可直接讀取的遠端路徑
pub fn gdal_remote_path(href: &str) -> String {
    if let Some(rest) = href.strip_prefix("s3://") {
        format!("/vsis3/{}", rest)
    } else if href.starts_with("http://") || href.starts_with("https://") {
        format!("/vsicurl/{}", href)
    } else {
        href.to_string()
    }
}

/// Mosaics `sources` through a VRT and writes the pixels touched by `bbox`
/// as a float32 GeoTIFF.
pub fn mosaic_to_geotiff(sources: &[String], bbox: &BoundingBox, destination: &Path) -> Result<()> {
    let datasets = sources
        .iter()
        .map(|s| Dataset::open(s))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mosaic = gdal::programs::raster::build_vrt(None, &datasets, None)?;

    let gt = mosaic.geo_transform()?;
    let window = pixel_window(&gt, mosaic.raster_size(), bbox)
        .ok_or_else(|| HarvestError::raster("bounding box does not overlap the mosaic"))?;

    let bands = (1..=mosaic.raster_count())
        .map(|i| read_band_as_f32(&mosaic, i, &window, 1))
        .collect::<Result<Vec<_>>>()?;

    write_float_geotiff(
        destination,
        (window.width, window.height),
        &window_geo_transform(&gt, &window),
        &mosaic.projection(),
        bands,
    )
}

/// 全球 DEM：STAC 搜尋 Copernicus GLO-30 後以 VRT 拼接
pub struct GlobalElevationHarvester {
    stac: StacClient,
    source: GlobalElevationSourceConfig,
    span: tracing::Span,
}

impl GlobalElevationHarvester {
    pub fn new(source: GlobalElevationSourceConfig, span: tracing::Span) -> Self {
        Self {
            stac: StacClient::new(source.stac_url.clone(), source.timeout(), span.clone()),
            source,
            span,
        }
    }

    pub async fn harvest(
        &self,
        property_name: &str,
        layers: &[String],
        bbox: &BoundingBox,
        output_dir: &Path,
        date_range: (Option<&str>, Option<&str>),
    ) -> Result<HarvestReport> {
        std::fs::create_dir_all(output_dir)?;

        let mut report = HarvestReport::new();
        for layer in layers {
            if layer != ELEVATION_GLOBAL {
                tracing::error!(
                    parent: &self.span,
                    "❌ Unknown {} layer '{}'; expected '{}'",
                    ELEVATION_GLOBAL,
                    layer,
                    ELEVATION_GLOBAL
                );
                report.record(layer.clone(), FetchOutcome::Failed(format!("unknown layer '{}'", layer)));
                continue;
            }

            let filename = global_elevation_filename(&self.source, property_name);
            let outcome = self
                .fetch_mosaic(bbox, output_dir.join(&filename), date_range)
                .await;
            report.record(filename, outcome);
        }
        Ok(report)
    }

    /// 搜尋後回傳 GDAL 可開啟的資產路徑
    pub async fn asset_paths(
        &self,
        bbox: &BoundingBox,
        date_range: (Option<&str>, Option<&str>),
    ) -> Result<Vec<String>> {
        let query = StacSearch::new(*bbox, self.source.collections.clone())
            .with_date_range(date_range.0, date_range.1)
            .with_limit(self.source.item_limit);
        let items = self.stac.search(&query).await?;

        Ok(items
            .iter()
            .filter_map(|item| {
                let asset = item.data_asset(&self.source.asset_key);
                if asset.is_none() {
                    tracing::warn!(parent: &self.span, "⚠️ Item {} has no data asset", item.id);
                }
                asset.map(|a| gdal_remote_path(&a.href))
            })
            .collect())
    }

    async fn fetch_mosaic(
        &self,
        bbox: &BoundingBox,
        destination: PathBuf,
        date_range: (Option<&str>, Option<&str>),
    ) -> FetchOutcome {
        let sources = match self.asset_paths(bbox, date_range).await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!(parent: &self.span, "❌ STAC search failed: {}", e);
                return FetchOutcome::Failed(e.to_string());
            }
        };

        if sources.is_empty() {
            tracing::warn!(
                parent: &self.span,
                "⚠️ No {:?} items intersect {}",
                self.source.collections,
                bbox.to_query_value()
            );
            return FetchOutcome::SkippedNoData;
        }

        tracing::info!(parent: &self.span, "🧩 Mosaicking {} tiles", sources.len());
        let bbox = *bbox;
        let target = destination.clone();
        let result =
            tokio::task::spawn_blocking(move || mosaic_to_geotiff(&sources, &bbox, &target)).await;

        match result {
            Ok(Ok(())) => {
                tracing::info!(parent: &self.span, "✅ Global DEM saved as {}", destination.display());
                FetchOutcome::Success(destination)
            }
            Ok(Err(e)) => {
                tracing::error!(parent: &self.span, "❌ Failed to build global DEM: {}", e);
                FetchOutcome::Failed(e.to_string())
            }
            Err(e) => {
                tracing::error!(parent: &self.span, "❌ Global DEM task failed: {}", e);
                FetchOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fetcher::test_support::{MemoryStorage, ScriptedService};
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn bbox() -> BoundingBox {
        BoundingBox::new(149.0, -35.0, 149.1, -34.9)
    }

    #[test]
    fn test_filenames() {
        assert_eq!(
            elevation_filename(&ElevationSourceConfig::default(), "site"),
            "DEM_SRTM_1_Second_Hydro_Enforced_site.tiff"
        );
        assert_eq!(
            global_elevation_filename(&GlobalElevationSourceConfig::default(), "site"),
            "DEM_Global_COP_30_GLO_site.tiff"
        );
    }

    #[test]
    fn test_remote_paths() {
        assert_eq!(gdal_remote_path("https://host/a.tif"), "/vsicurl/https://host/a.tif");
        assert_eq!(gdal_remote_path("s3://bucket/a.tif"), "/vsis3/bucket/a.tif");
        assert_eq!(gdal_remote_path("/data/a.tif"), "/data/a.tif");
    }

    #[tokio::test]
    async fn test_dem_request_uses_native_resolution() {
        let dir = TempDir::new().unwrap();
        let service = ScriptedService::default();
        let harvester = ElevationHarvester::new(
            service.clone(),
            MemoryStorage::default(),
            ElevationSourceConfig::default(),
            RetryPolicy::default(),
            tracing::Span::none(),
        );

        let report = harvester
            .harvest("site", &["DEM".to_string(), "SRTM".to_string()], &bbox(), dir.path())
            .await
            .unwrap();

        let sent = service.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.identifier, "1");
        assert_eq!(sent.grid, GridSpec::Resolution { resx: 1.0 / 3600.0, resy: 1.0 / 3600.0 });
        assert_eq!(
            report.fetched_paths(),
            vec![dir.path().join("DEM_SRTM_1_Second_Hydro_Enforced_site.tiff")]
        );
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_search_is_skipped() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/search");
            then.status(200)
                .json_body(serde_json::json!({"type": "FeatureCollection", "features": []}));
        });

        let dir = TempDir::new().unwrap();
        let source = GlobalElevationSourceConfig {
            stac_url: server.base_url(),
            timeout_seconds: 5,
            ..GlobalElevationSourceConfig::default()
        };
        let harvester = GlobalElevationHarvester::new(source, tracing::Span::none());

        let report = harvester
            .harvest("site", &["DEM Global".to_string()], &bbox(), dir.path(), (None, None))
            .await
            .unwrap();

        assert_eq!(report.skipped_count(), 1);
        assert!(report.fetched_paths().is_empty());
    }

    #[tokio::test]
    async fn test_asset_paths_use_vsicurl() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/search")
                .json_body_partial(r#"{"collections": ["cop-dem-glo-30"], "datetime": "2021-01-01/2021-12-31"}"#);
            then.status(200).json_body(serde_json::json!({
                "features": [{
                    "id": "tile-a",
                    "assets": {"data": {"href": "https://example.com/a.tif", "roles": ["data"]}}
                }, {
                    "id": "tile-b",
                    "assets": {"thumbnail": {"href": "https://example.com/b.png", "roles": ["thumbnail"]}}
                }]
            }));
        });

        let source = GlobalElevationSourceConfig {
            stac_url: server.base_url(),
            ..GlobalElevationSourceConfig::default()
        };
        let harvester = GlobalElevationHarvester::new(source, tracing::Span::none());
        let paths = harvester
            .asset_paths(&bbox(), (Some("2021-01-01"), Some("2021-12-31")))
            .await
            .unwrap();

        assert_eq!(paths, vec!["/vsicurl/https://example.com/a.tif".to_string()]);
    }

    #[test]
    fn test_mosaic_of_local_tiles() {
        use gdal::raster::Buffer;
        use gdal::spatial_ref::SpatialRef;
        use gdal::DriverManager;

        let dir = TempDir::new().unwrap();
        let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
        let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();

        let mut tiles = Vec::new();
        for (i, origin_x) in [149.0, 149.1].into_iter().enumerate() {
            let path = dir.path().join(format!("tile_{}.tif", i));
            let mut ds = driver.create_with_band_type::<f32, _>(&path, 10, 10, 1).unwrap();
            ds.set_geo_transform(&[origin_x, 0.01, 0.0, -34.9, 0.0, -0.01]).unwrap();
            ds.set_projection(&wkt).unwrap();
            let mut band = ds.rasterband(1).unwrap();
            let mut buffer = Buffer::new((10, 10), vec![(i + 1) as f32; 100]);
            band.write((0, 0), (10, 10), &mut buffer).unwrap();
            drop(band);
            drop(ds);
            tiles.push(path.to_string_lossy().into_owned());
        }

        let out = dir.path().join("mosaic.tiff");
        mosaic_to_geotiff(&tiles, &BoundingBox::new(149.05, -35.0, 149.15, -34.9), &out).unwrap();

        let ds = Dataset::open(&out).unwrap();
        assert_eq!(ds.raster_size(), (10, 10));
        let (_, values) = ds
            .rasterband(1)
            .unwrap()
            .read_as::<f32>((0, 0), (10, 10), (10, 10), None)
            .unwrap()
            .into_shape_and_vec();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[9], 2.0);
    }
}
