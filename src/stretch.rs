use crate::error::{Error, Result};
use crate::figure::Raster;
use ndarray::Array2;

/// Stretch applied after the interval has been normalised to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stretch {
    Linear,
    /// `asinh(x / a) / asinh(1 / a)`.
    Asinh { a: f64 },
}

impl Stretch {
    pub const ASINH: Stretch = Stretch::Asinh { a: 0.1 };

    fn apply(self, x: f64) -> f64 {
        match self {
            Stretch::Linear => x,
            Stretch::Asinh { a } => (x / a).asinh() / (1.0 / a).asinh(),
        }
    }
}

/// How `vmin`/`vmax` are derived from the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    MinMax,
    /// Keep the central `p` percent of the finite values.
    Percent(f64),
    Asymmetric {
        min_percent: Option<f64>,
        max_percent: Option<f64>,
    },
}

/// Maps pixel values to [0, 1] before colour lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageNorm {
    pub vmin: f64,
    pub vmax: f64,
    pub stretch: Stretch,
}

impl ImageNorm {
    pub fn simple(data: &Array2<f64>, stretch: Stretch, interval: Interval) -> Self {
        let mut finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
        finite.sort_by(f64::total_cmp);
        let (lo, hi) = match interval {
            Interval::MinMax => (None, None),
            Interval::Percent(p) => (Some(50.0 - p / 2.0), Some(50.0 + p / 2.0)),
            Interval::Asymmetric {
                min_percent,
                max_percent,
            } => (min_percent, max_percent),
        };
        let vmin = lo.map_or_else(|| finite.first().copied(), |p| percentile(&finite, p));
        let vmax = hi.map_or_else(|| finite.last().copied(), |p| percentile(&finite, p));
        Self {
            vmin: vmin.unwrap_or(0.0),
            vmax: vmax.unwrap_or(1.0),
            stretch,
        }
    }

    /// Normalised and stretched value. Values outside `[vmin, vmax]` are not
    /// clipped here; NaN stays NaN.
    pub fn apply(&self, v: f64) -> f64 {
        let span = self.vmax - self.vmin;
        let x = if span == 0.0 { 0.0 } else { (v - self.vmin) / span };
        self.stretch.apply(x)
    }
}

/// Percentile of sorted finite values with linear interpolation between
/// closest ranks.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Colour maps used for the cutout panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Gray,
    /// Reversed grey: bright pixels are dark.
    GrayR,
    Blues,
    Reds,
}

const BLUES: [[u8; 3]; 9] = [
    [0xf7, 0xfb, 0xff],
    [0xde, 0xeb, 0xf7],
    [0xc6, 0xdb, 0xef],
    [0x9e, 0xca, 0xe1],
    [0x6b, 0xae, 0xd6],
    [0x42, 0x92, 0xc6],
    [0x21, 0x71, 0xb5],
    [0x08, 0x51, 0x9c],
    [0x08, 0x30, 0x6b],
];

const REDS: [[u8; 3]; 9] = [
    [0xff, 0xf5, 0xf0],
    [0xfe, 0xe0, 0xd2],
    [0xfc, 0xbb, 0xa1],
    [0xfc, 0x92, 0x72],
    [0xfb, 0x6a, 0x4a],
    [0xef, 0x3b, 0x2c],
    [0xcb, 0x18, 0x1d],
    [0xa5, 0x0f, 0x15],
    [0x67, 0x00, 0x0d],
];

impl Colormap {
    /// RGBA for a normalised value; out-of-range values take the end
    /// colours and NaN is fully transparent.
    pub fn rgba(self, t: f64) -> [u8; 4] {
        if t.is_nan() {
            return [0, 0, 0, 0];
        }
        let t = t.clamp(0.0, 1.0);
        let [r, g, b] = match self {
            Colormap::Gray => {
                let v = (t * 255.0).round() as u8;
                [v, v, v]
            }
            Colormap::GrayR => {
                let v = ((1.0 - t) * 255.0).round() as u8;
                [v, v, v]
            }
            Colormap::Blues => lerp_table(&BLUES, t),
            Colormap::Reds => lerp_table(&REDS, t),
        };
        [r, g, b, 255]
    }
}

fn lerp_table(table: &[[u8; 3]], t: f64) -> [u8; 3] {
    let pos = t * (table.len() - 1) as f64;
    let i = (pos.floor() as usize).min(table.len() - 2);
    let frac = pos - i as f64;
    let mut out = [0u8; 3];
    for (k, o) in out.iter_mut().enumerate() {
        let a = table[i][k] as f64;
        let b = table[i + 1][k] as f64;
        *o = (a + (b - a) * frac).round() as u8;
    }
    out
}

/// Colour every pixel of `data` through `norm` and `cmap`.
pub fn colorize(data: &Array2<f64>, norm: &ImageNorm, cmap: Colormap) -> Raster {
    let (rows, cols) = data.dim();
    let pixels = data.iter().map(|&v| cmap.rgba(norm.apply(v))).collect();
    Raster::new(cols, rows, pixels)
}

/// Compose three bands into an RGB raster.
///
/// Each channel is scaled linearly from its minimum to its `percentile`
/// value, multiplied by its weight and clipped to [0, 1].
pub fn create_rgb(
    r: &Array2<f64>,
    g: &Array2<f64>,
    b: &Array2<f64>,
    weights: [f64; 3],
    percentile: [f64; 3],
) -> Result<Raster> {
    if r.dim() != g.dim() || r.dim() != b.dim() {
        return Err(Error::Shape(format!(
            "RGB channels differ in shape: {:?} {:?} {:?}",
            r.dim(),
            g.dim(),
            b.dim()
        )));
    }
    let norms: Vec<ImageNorm> = [r, g, b]
        .iter()
        .zip(percentile)
        .map(|(band, p)| {
            ImageNorm::simple(
                band,
                Stretch::Linear,
                Interval::Asymmetric {
                    min_percent: None,
                    max_percent: Some(p),
                },
            )
        })
        .collect();

    let (rows, cols) = r.dim();
    let scale = |c: usize, v: f64| -> u8 {
        let x = norms[c].apply(v) * weights[c];
        if x.is_nan() {
            0
        } else {
            (x.clamp(0.0, 1.0) * 255.0).round() as u8
        }
    };
    let pixels = r
        .iter()
        .zip(g.iter())
        .zip(b.iter())
        .map(|((&rv, &gv), &bv)| [scale(0, rv), scale(1, gv), scale(2, bv), 255])
        .collect();
    Ok(Raster::new(cols, rows, pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn percentile_interpolates() {
        let v: Vec<f64> = (0..=10).map(f64::from).collect();
        assert_eq!(percentile(&v, 0.0), Some(0.0));
        assert_eq!(percentile(&v, 100.0), Some(10.0));
        assert_abs_diff_eq!(percentile(&v, 25.0).unwrap(), 2.5, epsilon = 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn central_percent_interval() {
        let data = Array2::from_shape_fn((20, 20), |(r, c)| (r * 20 + c) as f64);
        let norm = ImageNorm::simple(&data, Stretch::Linear, Interval::Percent(99.5));
        assert_abs_diff_eq!(norm.vmin, 0.0025 * 399.0, epsilon = 1e-9);
        assert_abs_diff_eq!(norm.vmax, 0.9975 * 399.0, epsilon = 1e-9);
        assert!(norm.apply(399.0) > 1.0);
    }

    #[test]
    fn nan_is_ignored_and_transparent() {
        let mut data = Array2::from_elem((3, 3), 2.0);
        data[[0, 0]] = f64::NAN;
        data[[2, 2]] = 4.0;
        let norm = ImageNorm::simple(&data, Stretch::Linear, Interval::MinMax);
        assert_eq!((norm.vmin, norm.vmax), (2.0, 4.0));
        let raster = colorize(&data, &norm, Colormap::GrayR);
        assert_eq!(raster.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(raster.pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(raster.pixel(2, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn asinh_keeps_end_points() {
        let s = Stretch::ASINH;
        assert_abs_diff_eq!(s.apply(0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.apply(1.0), 1.0, epsilon = 1e-12);
        assert!(s.apply(0.1) > 0.1);
    }

    #[test]
    fn colormap_ends() {
        assert_eq!(Colormap::Blues.rgba(0.0), [0xf7, 0xfb, 0xff, 255]);
        assert_eq!(Colormap::Reds.rgba(1.0), [0x67, 0x00, 0x0d, 255]);
        assert_eq!(Colormap::Gray.rgba(2.0), [255, 255, 255, 255]);
    }

    #[test]
    fn rgb_requires_matching_shapes() {
        let a = Array2::zeros((2, 2));
        let b = Array2::zeros((3, 2));
        assert!(create_rgb(&a, &a, &b, [1.0; 3], [99.0; 3]).is_err());
        let rgb = create_rgb(&a, &a, &a, [1.0; 3], [99.0; 3]).unwrap();
        assert_eq!((rgb.width, rgb.height), (2, 2));
    }
}
