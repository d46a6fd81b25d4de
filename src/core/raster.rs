//! GDAL helpers shared by the normalizer and the global elevation mosaic.

use crate::domain::model::BoundingBox;
use crate::utils::error::{HarvestError, Result};
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, ResampleAlg};
use gdal::{Dataset, DriverManager, GeoTransform};
use std::path::{Path, PathBuf};

const EDGE_EPSILON: f64 = 1e-9;

/// 像素視窗：左上角 (col, row) 與大小
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

/// Raster 的地理範圍（只支援北朝上的 geotransform）
pub fn raster_bounds(gt: &GeoTransform, size: (usize, usize)) -> BoundingBox {
    let (width, height) = size;
    let x1 = gt[0] + width as f64 * gt[1];
    let y1 = gt[3] + height as f64 * gt[5];
    BoundingBox::new(gt[0].min(x1), gt[3].min(y1), gt[0].max(x1), gt[3].max(y1))
}

/// Every pixel of the grid touched by `bounds`, clamped to the raster.
///
/// Returns `None` when `bounds` does not overlap the raster.
pub fn pixel_window(
    gt: &GeoTransform,
    size: (usize, usize),
    bounds: &BoundingBox,
) -> Option<PixelWindow> {
    let (width, height) = (size.0 as f64, size.1 as f64);

    let col0 = ((bounds.min_x - gt[0]) / gt[1] + EDGE_EPSILON).floor().max(0.0);
    let col1 = ((bounds.max_x - gt[0]) / gt[1] - EDGE_EPSILON).ceil().min(width);
    let row0 = ((bounds.max_y - gt[3]) / gt[5] + EDGE_EPSILON).floor().max(0.0);
    let row1 = ((bounds.min_y - gt[3]) / gt[5] - EDGE_EPSILON).ceil().min(height);

    if col1 <= col0 || row1 <= row0 {
        return None;
    }

    Some(PixelWindow {
        col: col0 as usize,
        row: row0 as usize,
        width: (col1 - col0) as usize,
        height: (row1 - row0) as usize,
    })
}

pub fn window_geo_transform(gt: &GeoTransform, window: &PixelWindow) -> GeoTransform {
    [
        gt[0] + window.col as f64 * gt[1] + window.row as f64 * gt[2],
        gt[1],
        gt[2],
        gt[3] + window.col as f64 * gt[4] + window.row as f64 * gt[5],
        gt[4],
        gt[5],
    ]
}

/// 以像素 (col, row) 取得其地理矩形
pub fn pixel_rect(gt: &GeoTransform, col: usize, row: usize) -> geo::Rect<f64> {
    let x0 = gt[0] + col as f64 * gt[1];
    let y0 = gt[3] + row as f64 * gt[5];
    geo::Rect::new(
        geo::coord! { x: x0, y: y0 },
        geo::coord! { x: x0 + gt[1], y: y0 + gt[5] },
    )
}

/// Reads a window of a band as float32, replacing the band's nodata value
/// with NaN. `scale` > 1 super-samples by nearest neighbour.
pub fn read_band_as_f32(
    dataset: &Dataset,
    band_index: usize,
    window: &PixelWindow,
    scale: usize,
) -> Result<Vec<f32>> {
    let band = dataset.rasterband(band_index)?;
    let nodata = band.no_data_value().filter(|v| !v.is_nan());

    let buffer: Buffer<f32> = band.read_as(
        (window.col as isize, window.row as isize),
        (window.width, window.height),
        (window.width * scale, window.height * scale),
        Some(ResampleAlg::NearestNeighbour),
    )?;
    let (_, mut values) = buffer.into_shape_and_vec();

    if let Some(nodata) = nodata {
        let sentinel = nodata as f32;
        for value in values.iter_mut().filter(|v| **v == sentinel) {
            *value = f32::NAN;
        }
    }

    Ok(values)
}

/// 輸出檔先寫到 `<name>.part` 再改名
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Writes tiled float32 bands with NaN nodata to a GeoTIFF at `path`.
pub fn write_float_geotiff(
    path: &Path,
    size: (usize, usize),
    gt: &GeoTransform,
    projection: &str,
    bands: Vec<Vec<f32>>,
) -> Result<()> {
    if bands.is_empty() {
        return Err(HarvestError::raster(format!(
            "no bands to write for {}",
            path.display()
        )));
    }
    let (width, height) = size;

    let mut options = CslStringList::new();
    options.add_string("TILED=YES")?;
    options.add_string("COMPRESS=DEFLATE")?;

    let partial = partial_path(path);
    {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
            &partial,
            width,
            height,
            bands.len(),
            &options,
        )?;
        dataset.set_geo_transform(gt)?;
        dataset.set_projection(projection)?;

        for (i, values) in bands.into_iter().enumerate() {
            let mut band = dataset.rasterband(i + 1)?;
            band.set_no_data_value(Some(f64::NAN))?;
            let mut buffer = Buffer::new((width, height), values);
            band.write((0, 0), (width, height), &mut buffer)?;
        }
        dataset.flush_cache()?;
    }

    std::fs::rename(&partial, path)?;
    Ok(())
}

/// In-memory float32 dataset with NaN nodata.
pub fn mem_float_dataset(
    size: (usize, usize),
    band_count: usize,
    gt: &GeoTransform,
    projection: &str,
) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut dataset =
        driver.create_with_band_type::<f32, _>("", size.0, size.1, band_count)?;
    dataset.set_geo_transform(gt)?;
    dataset.set_projection(projection)?;
    for i in 1..=band_count {
        let mut band = dataset.rasterband(i)?;
        band.set_no_data_value(Some(f64::NAN))?;
        band.fill(f64::NAN, None)?;
    }
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 149.0..149.1 x -35.0..-34.9, 0.01° pixels
    const GT: GeoTransform = [149.0, 0.01, 0.0, -34.9, 0.0, -0.01];

    #[test]
    fn test_window_covers_touched_pixels() {
        let window = pixel_window(&GT, (10, 10), &BoundingBox::new(149.015, -34.975, 149.043, -34.91))
            .unwrap();
        assert_eq!(
            window,
            PixelWindow { col: 1, row: 1, width: 4, height: 7 }
        );
    }

    #[test]
    fn test_window_is_clamped_to_raster() {
        let window =
            pixel_window(&GT, (10, 10), &BoundingBox::new(148.0, -36.0, 150.0, -34.0)).unwrap();
        assert_eq!(window, PixelWindow { col: 0, row: 0, width: 10, height: 10 });
    }

    #[test]
    fn test_disjoint_bounds_have_no_window() {
        assert!(pixel_window(&GT, (10, 10), &BoundingBox::new(150.0, -35.0, 150.1, -34.9)).is_none());
    }

    #[test]
    fn test_window_geo_transform_shifts_origin() {
        let window = PixelWindow { col: 2, row: 3, width: 4, height: 4 };
        let shifted = window_geo_transform(&GT, &window);
        assert!((shifted[0] - 149.02).abs() < 1e-12);
        assert!((shifted[3] - -34.93).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_and_pixel_rect() {
        let bounds = raster_bounds(&GT, (10, 10));
        let expected = [149.0, -35.0, 149.1, -34.9];
        for (got, want) in bounds.to_array().iter().zip(expected) {
            assert!((got - want).abs() < 1e-9);
        }
        let rect = pixel_rect(&GT, 0, 0);
        assert!((rect.min().y - -34.91).abs() < 1e-12);
        assert!((rect.max().x - 149.01).abs() < 1e-12);
    }
}
