//! Raster normalization: float32 with NaN nodata, reprojected to the target
//! CRS and clipped to the region of interest.

use crate::core::raster::{
    mem_float_dataset, pixel_rect, pixel_window, raster_bounds, read_band_as_f32,
    window_geo_transform, write_float_geotiff, PixelWindow,
};
use crate::domain::model::BoundingBox;
use crate::utils::error::{HarvestError, Result};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::raster::Buffer as RasterBuffer;
use gdal::{Dataset, GeoTransform};
use geo::algorithm::buffer::{BufferStyle, LineJoin};
use geo::{BoundingRect, Buffer, Intersects, MapCoords, MultiPolygon};
use std::path::{Path, PathBuf};

const SUPERSAMPLE_FACTOR: usize = 3;
const DENSIFY_POINTS: i32 = 21;
/// 尖角斜接長度與外擴距離的比例上限；直角約 1.41
const MITRE_LIMIT: f64 = 5.0;

/// 這些後綴是衍生產物，不再重新遮罩
pub const DERIVED_SUFFIXES: [&str; 4] = [
    "_masked.tiff",
    "_colored.tiff",
    "_cog.tiff",
    "_cog.public.tiff",
];

fn spatial_ref(definition: &str) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_definition(definition)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// 遮罩用的區域幾何與其 CRS
#[derive(Debug, Clone, PartialEq)]
pub struct ClipGeometry {
    pub crs: String,
    pub shape: MultiPolygon<f64>,
}

impl ClipGeometry {
    pub fn new(crs: impl Into<String>, shape: MultiPolygon<f64>) -> Self {
        Self {
            crs: crs.into(),
            shape,
        }
    }

    pub fn from_bbox(bbox: &BoundingBox, crs: impl Into<String>) -> Self {
        Self::new(crs, MultiPolygon::new(vec![bbox.to_polygon()]))
    }

    /// 向外擴張 `distance`（幾何 CRS 的單位），斜接角，矩形外擴後仍為矩形
    pub fn buffered(&self, distance: f64) -> Self {
        let style = BufferStyle::new(distance).line_join(LineJoin::Miter(MITRE_LIMIT));
        Self::new(self.crs.clone(), self.shape.buffer_with_style(style))
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.shape
            .bounding_rect()
            .map(|r| BoundingBox::new(r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// The shape expressed in `target`; a clone when the CRS already matches.
    pub fn projected(&self, target: &SpatialRef) -> Result<MultiPolygon<f64>> {
        let source = spatial_ref(&self.crs)?;
        if &source == target {
            return Ok(self.shape.clone());
        }

        let transform = CoordTransform::new(&source, target)?;
        let transform = &transform;
        let shape = self.shape.try_map_coords(
            |c: geo::Coord<f64>| -> std::result::Result<geo::Coord<f64>, gdal::errors::GdalError> {
                let mut x = [c.x];
                let mut y = [c.y];
                transform.transform_coords(&mut x, &mut y, &mut [])?;
                Ok(geo::coord! { x: x[0], y: y[0] })
            },
        )?;
        Ok(shape)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub target_crs: String,
    /// 裁切前以最近鄰放大 3 倍
    pub resample: bool,
}

/// `<stem>_masked.tiff`
pub fn masked_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{}_masked.tiff", stem))
}

pub fn is_derived(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|name| DERIVED_SUFFIXES.iter().any(|s| name.ends_with(s)))
}

/// 每個 band 的浮點數值與其格網
struct FloatGrid {
    size: (usize, usize),
    gt: GeoTransform,
    projection: String,
    bands: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct RasterNormalizer {
    span: tracing::Span,
}

impl RasterNormalizer {
    pub fn new(span: tracing::Span) -> Self {
        Self { span }
    }

    /// Runs [`RasterNormalizer::normalize`] on the blocking pool.
    pub async fn normalize_file(
        &self,
        source: PathBuf,
        clip: ClipGeometry,
        options: NormalizeOptions,
    ) -> Result<PathBuf> {
        let normalizer = self.clone();
        tokio::task::spawn_blocking(move || normalizer.normalize(&source, &clip, &options))
            .await
            .map_err(|e| HarvestError::raster(format!("normalization task failed: {}", e)))?
    }

    /// Writes `<stem>_masked.tiff` next to `source` and returns its path.
    pub fn normalize(
        &self,
        source: &Path,
        clip: &ClipGeometry,
        options: &NormalizeOptions,
    ) -> Result<PathBuf> {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let dataset = Dataset::open(source)?;
        let mut source_srs = dataset.spatial_ref()?;
        source_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        let target_srs = spatial_ref(&options.target_crs)?;

        let grid = self.read_float_grid(&dataset, &filename, options.resample)?;

        if clip.crs != options.target_crs {
            tracing::info!(
                parent: &self.span,
                "🔄 Reprojecting geometry, input crs: {}, output crs: {}",
                clip.crs,
                options.target_crs
            );
        }
        let clip_shape = clip.projected(&target_srs)?;
        let clip_rect = clip_shape
            .bounding_rect()
            .ok_or_else(|| HarvestError::raster("clip geometry is empty"))?;
        let clip_bounds = BoundingBox::new(
            clip_rect.min().x,
            clip_rect.min().y,
            clip_rect.max().x,
            clip_rect.max().y,
        );

        let windowed = if source_srs == target_srs {
            Self::window(&grid, &clip_bounds)?
        } else {
            tracing::info!(
                parent: &self.span,
                "🔄 Reprojecting raster {} to {}",
                filename,
                options.target_crs
            );
            Self::reproject_window(&grid, &source_srs, &target_srs, &clip_bounds)?
        };
        let mut clipped = windowed.ok_or_else(|| {
            HarvestError::raster(format!("{} does not overlap the clip geometry", filename))
        })?;

        Self::mask_outside(&mut clipped, &clip_shape);

        let output = masked_path(source);
        write_float_geotiff(
            &output,
            clipped.size,
            &clipped.gt,
            &clipped.projection,
            clipped.bands,
        )?;

        tracing::info!(
            parent: &self.span,
            "✅ Masked raster saved as {} ({}x{})",
            output.display(),
            clipped.size.0,
            clipped.size.1
        );
        Ok(output)
    }

    /// 讀入所有 band 為 float32，nodata 轉 NaN，可選擇放大
    fn read_float_grid(&self, dataset: &Dataset, filename: &str, resample: bool) -> Result<FloatGrid> {
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();
        if band_count == 0 {
            return Err(HarvestError::raster(format!("{} has no raster bands", filename)));
        }

        let first = dataset.rasterband(1)?;
        tracing::debug!(
            parent: &self.span,
            "🧮 {}: {:?} {}x{} x{} bands, nodata {:?} -> float32/NaN",
            filename,
            first.band_type(),
            width,
            height,
            band_count,
            first.no_data_value()
        );

        let scale = if resample { SUPERSAMPLE_FACTOR } else { 1 };
        let full = PixelWindow {
            col: 0,
            row: 0,
            width,
            height,
        };
        let bands = (1..=band_count)
            .map(|i| read_band_as_f32(dataset, i, &full, scale))
            .collect::<Result<Vec<_>>>()?;

        let mut gt = dataset.geo_transform()?;
        for i in [1, 2, 4, 5] {
            gt[i] /= scale as f64;
        }

        Ok(FloatGrid {
            size: (width * scale, height * scale),
            gt,
            projection: dataset.projection(),
            bands,
        })
    }

    fn window(grid: &FloatGrid, bounds: &BoundingBox) -> Result<Option<FloatGrid>> {
        let Some(window) = pixel_window(&grid.gt, grid.size, bounds) else {
            return Ok(None);
        };

        let bands = grid
            .bands
            .iter()
            .map(|values| {
                (window.row..window.row + window.height)
                    .flat_map(|row| {
                        let start = row * grid.size.0 + window.col;
                        values[start..start + window.width].iter().copied()
                    })
                    .collect()
            })
            .collect();

        Ok(Some(FloatGrid {
            size: (window.width, window.height),
            gt: window_geo_transform(&grid.gt, &window),
            projection: grid.projection.clone(),
            bands,
        }))
    }

    /// GDAL reprojects onto the target-CRS grid covering `bounds`.
    fn reproject_window(
        grid: &FloatGrid,
        source_srs: &SpatialRef,
        target_srs: &SpatialRef,
        bounds: &BoundingBox,
    ) -> Result<Option<FloatGrid>> {
        let source_bounds = raster_bounds(&grid.gt, grid.size);
        let transform = CoordTransform::new(source_srs, target_srs)?;
        let [min_x, min_y, max_x, max_y] =
            transform.transform_bounds(&source_bounds.to_array(), DENSIFY_POINTS)?;

        let res_x = (max_x - min_x) / grid.size.0 as f64;
        let res_y = (max_y - min_y) / grid.size.1 as f64;
        let target_gt: GeoTransform = [min_x, res_x, 0.0, max_y, 0.0, -res_y];

        let Some(window) = pixel_window(&target_gt, grid.size, bounds) else {
            return Ok(None);
        };
        let window_gt = window_geo_transform(&target_gt, &window);
        let target_wkt = target_srs.to_wkt()?;

        let mut source = mem_float_dataset(grid.size, grid.bands.len(), &grid.gt, &grid.projection)?;
        for (i, values) in grid.bands.iter().enumerate() {
            let mut band = source.rasterband(i + 1)?;
            let mut buffer = RasterBuffer::new(grid.size, values.clone());
            band.write((0, 0), grid.size, &mut buffer)?;
        }

        let size = (window.width, window.height);
        let target = mem_float_dataset(size, grid.bands.len(), &window_gt, &target_wkt)?;
        gdal::raster::reproject(&source, &target)?;

        let full = PixelWindow {
            col: 0,
            row: 0,
            width: size.0,
            height: size.1,
        };
        let bands = (1..=grid.bands.len())
            .map(|i| read_band_as_f32(&target, i, &full, 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(FloatGrid {
            size,
            gt: window_gt,
            projection: target_wkt,
            bands,
        }))
    }

    /// 與幾何不相交的像素設為 NaN（all-touched）
    fn mask_outside(grid: &mut FloatGrid, shape: &MultiPolygon<f64>) {
        let (width, height) = grid.size;
        for row in 0..height {
            for col in 0..width {
                if shape.intersects(&pixel_rect(&grid.gt, col, row)) {
                    continue;
                }
                let idx = row * width + col;
                for band in grid.bands.iter_mut() {
                    band[idx] = f32::NAN;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_path() {
        assert_eq!(
            masked_path(Path::new("/out/SLGA_Clay_0-5cm_site.tiff")),
            PathBuf::from("/out/SLGA_Clay_0-5cm_site_masked.tiff")
        );
    }

    #[test]
    fn test_derived_outputs_are_recognised() {
        assert!(is_derived(Path::new("a_masked.tiff")));
        assert!(is_derived(Path::new("a_cog.public.tiff")));
        assert!(!is_derived(Path::new("SLGA_Clay_0-5cm_site.tiff")));
    }

    #[test]
    fn test_buffer_grows_bounds() {
        let clip = ClipGeometry::from_bbox(&BoundingBox::new(149.0, -35.0, 149.1, -34.9), "EPSG:4326");
        let bounds = clip.buffered(0.002).bounds().unwrap();
        assert!((bounds.min_x - 148.998).abs() < 1e-6);
        assert!((bounds.max_y - -34.898).abs() < 1e-6);
    }

    #[test]
    fn test_buffer_keeps_rectangle_corners() {
        let clip = ClipGeometry::from_bbox(&BoundingBox::new(149.0, -35.0, 149.1, -34.9), "EPSG:4326");
        let buffered = clip.buffered(0.002);

        // 圓角接合會切掉這兩個點
        let near_corner = geo::point!(x: 148.998 + 1e-5, y: -35.002 + 1e-5);
        let far_corner = geo::point!(x: 149.102 - 1e-5, y: -34.898 - 1e-5);
        assert!(buffered.shape.intersects(&near_corner));
        assert!(buffered.shape.intersects(&far_corner));
    }

    #[test]
    fn test_projection_to_same_crs_is_identity() {
        let clip = ClipGeometry::from_bbox(&BoundingBox::new(149.0, -35.0, 149.1, -34.9), "EPSG:4326");
        let target = spatial_ref("EPSG:4326").unwrap();
        assert_eq!(clip.projected(&target).unwrap(), clip.shape);
    }

    #[test]
    fn test_projection_to_web_mercator() {
        let clip = ClipGeometry::from_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0), "EPSG:4326");
        let target = spatial_ref("EPSG:3857").unwrap();
        let rect = clip.projected(&target).unwrap().bounding_rect().unwrap();
        assert!(rect.min().x.abs() < 1e-6);
        assert!((rect.max().x - 111_319.49).abs() < 1.0);
    }
}
