//! Nearest-neighbour resampling of label images onto another pixel grid.

use crate::image::SkyImage;
use crate::wcs::Wcs;
use ndarray::Array2;

/// Resample `source` onto the grid described by `target_wcs` and `shape`
/// (`(rows, cols)`).
///
/// Each output pixel takes the value of the source pixel whose centre is
/// closest to it on the sky, so label values are never blended. Output
/// pixels that fall outside the source image are NaN.
pub fn reproject_nearest(source: &SkyImage, target_wcs: &Wcs, shape: (usize, usize)) -> Array2<f64> {
    let (src_rows, src_cols) = source.shape();
    Array2::from_shape_fn(shape, |(row, col)| {
        let sky = target_wcs.pixel_to_world(col as f64, row as f64);
        let (x, y) = source.wcs.world_to_pixel(sky);
        let (xi, yi) = (x.round(), y.round());
        if xi.is_nan() || yi.is_nan() || xi < 0.0 || yi < 0.0 {
            return f64::NAN;
        }
        let (xi, yi) = (xi as usize, yi as usize);
        if xi >= src_cols || yi >= src_rows {
            f64::NAN
        } else {
            source.data[[yi, xi]]
        }
    })
}

/// Sorted distinct non-NaN values of `data`.
pub fn unique_labels(data: &Array2<f64>) -> Vec<f64> {
    let mut labels: Vec<f64> = data.iter().copied().filter(|v| !v.is_nan()).collect();
    labels.sort_by(f64::total_cmp);
    labels.dedup();
    labels
}

/// Binary image that is 1 where `data == label` and 0 elsewhere.
pub fn isolate_label(data: &Array2<f64>, label: f64) -> Array2<f64> {
    data.mapv(|v| if v == label { 1.0 } else { 0.0 })
}
