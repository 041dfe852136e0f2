use crate::image::SkyImage;
use crate::wcs::Wcs;
use std::fmt;
use std::ops::Mul;

/// An angle, stored in degrees.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default)]
pub struct Angle(f64);

impl Angle {
    pub fn from_deg(deg: f64) -> Self {
        Self(deg)
    }

    pub fn from_arcsec(arcsec: f64) -> Self {
        Self(arcsec / 3600.0)
    }

    pub fn deg(self) -> f64 {
        self.0
    }

    pub fn arcsec(self) -> f64 {
        self.0 * 3600.0
    }
}

impl Mul<f64> for Angle {
    type Output = Angle;

    fn mul(self, rhs: f64) -> Angle {
        Angle(self.0 * rhs)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\"", self.arcsec())
    }
}

/// An ICRS sky position in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoord {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    pub fn to_pixel(&self, wcs: &Wcs) -> (f64, f64) {
        wcs.world_to_pixel(*self)
    }

    /// Sexagesimal representation, e.g. `01h36m41.76s +15d47m00.12s`.
    pub fn to_hmsdms(&self, precision: usize) -> String {
        let (h, m, s) = sexagesimal(self.ra.rem_euclid(360.0) / 15.0);
        let sign = if self.dec < 0.0 { '-' } else { '+' };
        let (d, am, asec) = sexagesimal(self.dec.abs());
        format!(
            "{h:02}h{m:02}m{s:0width$.precision$}s {sign}{d:02}d{am:02}m{asec:0width$.precision$}s",
            width = if precision == 0 { 2 } else { precision + 3 },
        )
    }
}

fn sexagesimal(value: f64) -> (u32, u32, f64) {
    let whole = value.trunc();
    let minutes = (value - whole) * 60.0;
    let m = minutes.trunc();
    let seconds = (minutes - m) * 60.0;
    (whole as u32, m as u32, seconds)
}

/// Rectangular sky region, tested for membership in the pixel frame of a
/// WCS (no rotation relative to the pixel grid).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyRectangle {
    pub center: SkyCoord,
    pub width: Angle,
    pub height: Angle,
}

impl SkyRectangle {
    pub fn new(center: SkyCoord, width: Angle, height: Angle) -> Self {
        Self {
            center,
            width,
            height,
        }
    }

    pub fn contains(&self, coord: SkyCoord, wcs: &Wcs) -> bool {
        let (cx, cy) = self.center.to_pixel(wcs);
        let (x, y) = coord.to_pixel(wcs);
        let (sx, sy) = wcs.pixel_scales();
        let half_w = 0.5 * self.width.deg() / sx.deg();
        let half_h = 0.5 * self.height.deg() / sy.deg();
        (x - cx).abs() <= half_w && (y - cy).abs() <= half_h
    }
}

/// Closed sky polygon, e.g. the footprint of an observation.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SkyPolygon {
    pub vertices: Vec<SkyCoord>,
}

impl SkyPolygon {
    pub fn new(vertices: Vec<SkyCoord>) -> Self {
        Self { vertices }
    }

    /// Outline through the outer corners of the image's pixel grid.
    pub fn footprint(image: &SkyImage) -> Self {
        let (ny, nx) = image.data.dim();
        let (x1, y1) = (nx as f64 - 0.5, ny as f64 - 0.5);
        let corners = [(-0.5, -0.5), (x1, -0.5), (x1, y1), (-0.5, y1)];
        Self::new(
            corners
                .iter()
                .map(|&(x, y)| image.wcs.pixel_to_world(x, y))
                .collect(),
        )
    }

    /// Vertices in the pixel frame of `wcs`, closed by repeating the first.
    pub fn to_pixel(&self, wcs: &Wcs) -> Vec<(f64, f64)> {
        let mut points: Vec<(f64, f64)> = self.vertices.iter().map(|v| v.to_pixel(wcs)).collect();
        if let Some(&first) = points.first() {
            points.push(first);
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn angle_units() {
        let a = Angle::from_arcsec(4.0);
        assert_abs_diff_eq!(a.deg(), 4.0 / 3600.0, epsilon = 1e-15);
        assert_abs_diff_eq!((a * 0.9).arcsec(), 3.6, epsilon = 1e-12);
    }

    #[test]
    fn hmsdms() {
        let c = SkyCoord::new(24.174, -15.5);
        assert_eq!(c.to_hmsdms(2), "01h36m41.76s -15d30m00.00s");
    }

    #[test]
    fn rectangle_membership() {
        let wcs = Wcs::tan((50.5, 50.5), SkyCoord::new(10.0, 20.0), Angle::from_arcsec(0.1)).unwrap();
        let center = wcs.pixel_to_world(49.5, 49.5);
        let region = SkyRectangle::new(center, Angle::from_arcsec(2.0), Angle::from_arcsec(2.0));
        assert!(region.contains(wcs.pixel_to_world(58.0, 49.5), &wcs));
        assert!(!region.contains(wcs.pixel_to_world(60.5, 49.5), &wcs));
        assert!(!region.contains(wcs.pixel_to_world(49.5, 38.0), &wcs));
    }
}
