//! Celestial World Coordinate System for two-dimensional images.
//!
//! Pixel coordinates are 0-based (the first pixel centre is at `(0, 0)`),
//! while `crpix` keeps the 1-based FITS value from the header.

use crate::coords::{Angle, SkyCoord};
use crate::error::{Error, Result};
use crate::fits::Header;
use nalgebra::{Matrix2, Vector2};

/// Sky projection of the intermediate world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Gnomonic (`RA---TAN` / `DEC--TAN`, also with `-SIP` suffix).
    Tan,
    /// Plain linear mapping, used when CTYPE names no projection.
    Linear,
}

impl Projection {
    fn from_ctype(ctype: Option<&str>) -> Self {
        match ctype {
            Some(c) if c.get(5..8) == Some("TAN") || c.contains("-TAN") => Projection::Tan,
            Some(c) if c.len() > 4 && c.contains('-') => {
                log::warn!("unsupported projection in CTYPE {c}, treating as linear");
                Projection::Linear
            }
            _ => Projection::Linear,
        }
    }
}

/// Relevant data for WCS transformations from FITS headers.
#[derive(Clone, Debug, PartialEq)]
pub struct Wcs {
    /// Reference pixel (1-based, as in the header).
    pub crpix: Vector2<f64>,
    /// Sky coordinate at `crpix` in degrees.
    pub crval: Vector2<f64>,
    /// Linear transformation matrix in degrees per pixel.
    pub cd: Matrix2<f64>,
    pub projection: Projection,
    cd_inv: Matrix2<f64>,
}

impl Wcs {
    pub fn new(
        crpix: Vector2<f64>,
        crval: Vector2<f64>,
        cd: Matrix2<f64>,
        projection: Projection,
    ) -> Result<Self> {
        let cd_inv = cd
            .try_inverse()
            .ok_or_else(|| Error::header("CD", "singular pixel transformation matrix"))?;
        Ok(Self {
            crpix,
            crval,
            cd,
            projection,
            cd_inv,
        })
    }

    /// A north-up, east-left TAN projection with square pixels.
    pub fn tan(crpix: (f64, f64), crval: SkyCoord, pixel_scale: Angle) -> Result<Self> {
        let s = pixel_scale.deg();
        Self::new(
            Vector2::new(crpix.0, crpix.1),
            Vector2::new(crval.ra, crval.dec),
            Matrix2::new(-s, 0.0, 0.0, s),
            Projection::Tan,
        )
    }

    /// Build the transformation from CRPIX/CRVAL/CTYPE and one of CDi_j,
    /// PCi_j with CDELTi, or CDELTi with CROTA2.
    pub fn from_header(header: &Header) -> Result<Self> {
        let crpix = Vector2::new(header.require_f64("CRPIX1")?, header.require_f64("CRPIX2")?);
        let crval = Vector2::new(header.require_f64("CRVAL1")?, header.require_f64("CRVAL2")?);
        let projection = Projection::from_ctype(header.get_str("CTYPE1"));

        let has_cd = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"]
            .iter()
            .any(|k| header.contains(k));
        let cd = if has_cd {
            let get = |k: &str| header.get_f64(k).unwrap_or(0.0);
            Matrix2::new(get("CD1_1"), get("CD1_2"), get("CD2_1"), get("CD2_2"))
        } else {
            let cdelt1 = header.get_f64("CDELT1").unwrap_or(1.0);
            let cdelt2 = header.get_f64("CDELT2").unwrap_or(1.0);
            let has_pc = ["PC1_1", "PC1_2", "PC2_1", "PC2_2"]
                .iter()
                .any(|k| header.contains(k));
            if has_pc {
                let pc = Matrix2::new(
                    header.get_f64("PC1_1").unwrap_or(1.0),
                    header.get_f64("PC1_2").unwrap_or(0.0),
                    header.get_f64("PC2_1").unwrap_or(0.0),
                    header.get_f64("PC2_2").unwrap_or(1.0),
                );
                Matrix2::from_diagonal(&Vector2::new(cdelt1, cdelt2)) * pc
            } else {
                let rho = header.get_f64("CROTA2").unwrap_or(0.0).to_radians();
                Matrix2::new(
                    cdelt1 * rho.cos(),
                    -cdelt2 * rho.sin(),
                    cdelt1 * rho.sin(),
                    cdelt2 * rho.cos(),
                )
            }
        };
        Self::new(crpix, crval, cd, projection)
    }

    /// Transforms from pixel to sky coordinate space.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> SkyCoord {
        let offset = Vector2::new(x + 1.0, y + 1.0) - self.crpix;
        let inter = self.cd * offset;
        match self.projection {
            Projection::Linear => SkyCoord::new(
                (self.crval.x + inter.x).rem_euclid(360.0),
                self.crval.y + inter.y,
            ),
            Projection::Tan => {
                let xi = inter.x.to_radians();
                let eta = inter.y.to_radians();
                let (sin_d0, cos_d0) = self.crval.y.to_radians().sin_cos();
                let denom = cos_d0 - eta * sin_d0;
                let ra = self.crval.x.to_radians() + xi.atan2(denom);
                let dec = (sin_d0 + eta * cos_d0).atan2(xi.hypot(denom));
                SkyCoord::new(ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
            }
        }
    }

    /// Transforms from sky coordinate to pixel space.
    ///
    /// Points on the far hemisphere of a TAN projection come back as NaN.
    pub fn world_to_pixel(&self, coord: SkyCoord) -> (f64, f64) {
        let inter = match self.projection {
            Projection::Linear => {
                let dra = (coord.ra - self.crval.x + 180.0).rem_euclid(360.0) - 180.0;
                Vector2::new(dra, coord.dec - self.crval.y)
            }
            Projection::Tan => {
                let (sin_d0, cos_d0) = self.crval.y.to_radians().sin_cos();
                let (sin_d, cos_d) = coord.dec.to_radians().sin_cos();
                let dra = (coord.ra - self.crval.x).to_radians();
                let cos_c = sin_d0 * sin_d + cos_d0 * cos_d * dra.cos();
                if cos_c <= 0.0 {
                    return (f64::NAN, f64::NAN);
                }
                let xi = cos_d * dra.sin() / cos_c;
                let eta = (cos_d0 * sin_d - sin_d0 * cos_d * dra.cos()) / cos_c;
                Vector2::new(xi.to_degrees(), eta.to_degrees())
            }
        };
        let pixel = self.crpix + self.cd_inv * inter;
        (pixel.x - 1.0, pixel.y - 1.0)
    }

    /// Projection-plane pixel scales along the x and y axes.
    pub fn pixel_scales(&self) -> (Angle, Angle) {
        let sx = self.cd.column(0).norm();
        let sy = self.cd.column(1).norm();
        (Angle::from_deg(sx), Angle::from_deg(sy))
    }

    /// The WCS of a sub-array whose pixel `(0, 0)` is pixel `(dx, dy)` here.
    pub fn shifted(&self, dx: f64, dy: f64) -> Self {
        Self {
            crpix: self.crpix - Vector2::new(dx, dy),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ngc628() -> Wcs {
        Wcs::tan(
            (50.5, 50.5),
            SkyCoord::new(24.174, 15.7833),
            Angle::from_arcsec(0.04),
        )
        .unwrap()
    }

    #[test]
    fn reference_pixel_maps_to_reference_value() {
        let wcs = ngc628();
        let sky = wcs.pixel_to_world(49.5, 49.5);
        assert_abs_diff_eq!(sky.ra, 24.174, epsilon = 1e-12);
        assert_abs_diff_eq!(sky.dec, 15.7833, epsilon = 1e-12);
    }

    #[test]
    fn round_trip() {
        let wcs = ngc628();
        for &(x, y) in &[(0.0, 0.0), (99.0, 12.0), (-40.0, 230.5)] {
            let (px, py) = wcs.world_to_pixel(wcs.pixel_to_world(x, y));
            assert_abs_diff_eq!(px, x, epsilon = 1e-8);
            assert_abs_diff_eq!(py, y, epsilon = 1e-8);
        }
    }

    #[test]
    fn east_is_left_and_north_is_up() {
        let wcs = ngc628();
        let centre = wcs.pixel_to_world(49.5, 49.5);
        let right = wcs.pixel_to_world(59.5, 49.5);
        let up = wcs.pixel_to_world(49.5, 59.5);
        assert!(right.ra < centre.ra);
        assert!(up.dec > centre.dec);
        assert_abs_diff_eq!(up.dec - centre.dec, 10.0 * 0.04 / 3600.0, epsilon = 1e-9);
    }

    #[test]
    fn consistency_check() {
        let wcs = Wcs::new(
            Vector2::new(5.065191000000E+02, 4.892484000000E+02),
            Vector2::new(2.711529441199E+01, -3.925398447545E+01),
            Matrix2::new(
                1.672682044534E-04,
                1.996643749806E-06,
                -9.963899403011E-08,
                1.729743106508E-04,
            ),
            Projection::Tan,
        )
        .unwrap();

        let wc = wcs.pixel_to_world(0., 0.);
        let (x, y) = wcs.world_to_pixel(wc);

        assert_abs_diff_eq!(x, 0., epsilon = 1e-8);
        assert_abs_diff_eq!(y, 0., epsilon = 1e-8);
    }

    #[test]
    fn header_with_cdelt_and_rotation() {
        let header = Header::new(vec![
            ("CTYPE1".into(), "RA---TAN".into()),
            ("CTYPE2".into(), "DEC--TAN".into()),
            ("CRPIX1".into(), "10".into()),
            ("CRPIX2".into(), "20".into()),
            ("CRVAL1".into(), "150.0".into()),
            ("CRVAL2".into(), "2.0".into()),
            ("CDELT1".into(), "-0.001".into()),
            ("CDELT2".into(), "0.001".into()),
            ("CROTA2".into(), "30.0".into()),
        ]);
        let wcs = Wcs::from_header(&header).unwrap();
        assert_eq!(wcs.projection, Projection::Tan);
        let (sx, sy) = wcs.pixel_scales();
        assert_abs_diff_eq!(sx.deg(), 0.001, epsilon = 1e-12);
        assert_abs_diff_eq!(sy.deg(), 0.001, epsilon = 1e-12);
        let sky = wcs.pixel_to_world(9.0, 19.0);
        assert_abs_diff_eq!(sky.ra, 150.0, epsilon = 1e-12);
    }

    #[test]
    fn header_without_reference_is_rejected() {
        let header = Header::new(vec![("CRPIX1".into(), "1".into())]);
        assert!(matches!(Wcs::from_header(&header), Err(Error::Header { .. })));
    }

    #[test]
    fn shifted_wcs_agrees_with_parent() {
        let wcs = ngc628();
        let sub = wcs.shifted(10.0, 5.0);
        let a = wcs.pixel_to_world(30.0, 25.0);
        let b = sub.pixel_to_world(20.0, 20.0);
        assert_abs_diff_eq!(a.ra, b.ra, epsilon = 1e-12);
        assert_abs_diff_eq!(a.dec, b.dec, epsilon = 1e-12);
    }
}
