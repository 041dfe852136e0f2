use crate::coords::{Angle, SkyCoord};
use crate::error::{Error, Result};
use crate::fits::{self, Header};
use crate::wcs::Wcs;
use ndarray::{s, Array2};
use std::path::Path;

/// A WCS-registered image with optional validity mask and its FITS header.
///
/// `data` is indexed `[row, col]` = `[y, x]`; `mask` is `true` for pixels
/// that carry no data.
#[derive(Debug, Clone)]
pub struct SkyImage {
    pub data: Array2<f64>,
    pub mask: Option<Array2<bool>>,
    pub header: Header,
    pub wcs: Wcs,
}

/// Integer label image where NaN marks pixels that belong to no region.
pub type LabelMask = SkyImage;

impl SkyImage {
    pub fn new(data: Array2<f64>, header: Header, wcs: Wcs) -> Self {
        Self {
            data,
            mask: None,
            header,
            wcs,
        }
    }

    /// Load the first image HDU that contains data from `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let idx = fits::first_image_hdu(path)?;
        Self::open_hdu(path, idx)
    }

    pub fn open_hdu(path: &Path, hdu_index: usize) -> Result<Self> {
        let (data, header) = fits::read_image_f64(path, hdu_index)?;
        let wcs = Wcs::from_header(&header)?;
        log::info!(
            "loaded {}x{} image from {}",
            data.ncols(),
            data.nrows(),
            path.display()
        );
        Ok(Self::new(data, header, wcs))
    }

    /// Reinterpret an integer label image: zero becomes NaN ("no region")
    /// and the validity mask flags every NaN pixel.
    pub fn from_label_image(mut data: Array2<f64>, header: Header, wcs: Wcs) -> Self {
        data.mapv_inplace(|v| if v == 0.0 { f64::NAN } else { v });
        let mask = data.mapv(f64::is_nan);
        Self {
            data,
            mask: Some(mask),
            header,
            wcs,
        }
    }

    /// `(rows, cols)` of the pixel array.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// A rectangular crop of a larger image with its own WCS.
#[derive(Debug, Clone)]
pub struct Cutout {
    pub data: Array2<f64>,
    pub wcs: Wcs,
    /// Pixel `(x, y)` of the parent image at the cutout's `(0, 0)`.
    pub origin: (usize, usize),
    pub position: SkyCoord,
    pub size: Angle,
}

impl Cutout {
    /// Square cutout of angular `size` centred on `position`, trimmed where it
    /// extends past the image.
    pub fn new(image: &SkyImage, position: SkyCoord, size: Angle) -> Result<Self> {
        Self::rectangular(image, position, size, size)
    }

    pub fn rectangular(
        image: &SkyImage,
        position: SkyCoord,
        width: Angle,
        height: Angle,
    ) -> Result<Self> {
        let (sx, sy) = image.wcs.pixel_scales();
        let nx = (width.deg() / sx.deg()).round() as i64;
        let ny = (height.deg() / sy.deg()).round() as i64;
        if nx < 1 || ny < 1 {
            return Err(Error::Shape(format!(
                "cutout of {width} x {height} is smaller than one pixel"
            )));
        }
        let (x, y) = position.to_pixel(&image.wcs);
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::NoOverlap);
        }
        let (rows, cols) = image.shape();
        let (x0, x1) = overlap(x, nx, cols).ok_or(Error::NoOverlap)?;
        let (y0, y1) = overlap(y, ny, rows).ok_or(Error::NoOverlap)?;

        let data = image.data.slice(s![y0..y1, x0..x1]).to_owned();
        log::debug!(
            "cutout at ({x:.1}, {y:.1}) spans x {x0}..{x1}, y {y0}..{y1}"
        );
        Ok(Self {
            data,
            wcs: image.wcs.shifted(x0 as f64, y0 as f64),
            origin: (x0, y0),
            position,
            size: width,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Pixel coordinates of the requested centre in the cutout frame.
    pub fn center_pixel(&self) -> (f64, f64) {
        self.position.to_pixel(&self.wcs)
    }
}

/// Window `[ceil(pos - n/2), ceil(pos + n/2))` trimmed to `[0, len)`.
fn overlap(pos: f64, n: i64, len: usize) -> Option<(usize, usize)> {
    let half = n as f64 / 2.0;
    let lo = (pos - half).ceil() as i64;
    let hi = (pos + half).ceil() as i64;
    let lo = lo.max(0);
    let hi = hi.min(len as i64);
    if hi <= lo {
        None
    } else {
        Some((lo as usize, hi as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_image(n: usize) -> SkyImage {
        let wcs = Wcs::tan(
            (n as f64 / 2.0 + 0.5, n as f64 / 2.0 + 0.5),
            SkyCoord::new(24.17, 15.78),
            Angle::from_arcsec(0.1),
        )
        .unwrap();
        let data = Array2::from_shape_fn((n, n), |(r, c)| (r * n + c) as f64);
        SkyImage::new(data, Header::default(), wcs)
    }

    #[test]
    fn zero_labels_become_nan() {
        let wcs = test_image(4).wcs;
        let data = Array2::from_shape_vec((2, 2), vec![0.0, 3.0, 7.0, 0.0]).unwrap();
        let mask = LabelMask::from_label_image(data, Header::default(), wcs);
        assert!(mask.data[[0, 0]].is_nan());
        assert_eq!(mask.data[[0, 1]], 3.0);
        assert_eq!(mask.data[[1, 0]], 7.0);
        let flags = mask.mask.unwrap();
        assert!(flags[[0, 0]] && flags[[1, 1]]);
        assert!(!flags[[0, 1]] && !flags[[1, 0]]);
    }

    #[test]
    fn cutout_size_and_wcs() {
        let image = test_image(100);
        let centre = image.wcs.pixel_to_world(40.3, 60.3);
        let cutout = Cutout::new(&image, centre, Angle::from_arcsec(2.0)).unwrap();
        assert_eq!(cutout.shape(), (20, 20));
        assert_eq!(cutout.origin, (31, 51));
        assert_eq!(cutout.data[[0, 0]], image.data[[51, 31]]);
        let (cx, cy) = cutout.center_pixel();
        assert_abs_diff_eq!(cx, 9.3, epsilon = 1e-6);
        assert_abs_diff_eq!(cy, 9.3, epsilon = 1e-6);
    }

    #[test]
    fn cutout_is_trimmed_at_the_edge() {
        let image = test_image(100);
        let centre = image.wcs.pixel_to_world(3.3, 96.7);
        let cutout = Cutout::new(&image, centre, Angle::from_arcsec(2.0)).unwrap();
        assert_eq!(cutout.shape(), (13, 14));
        assert_eq!(cutout.origin, (0, 87));
    }

    #[test]
    fn cutout_outside_the_image_fails() {
        let image = test_image(100);
        let centre = image.wcs.pixel_to_world(300.0, 40.0);
        let err = Cutout::new(&image, centre, Angle::from_arcsec(2.0)).unwrap_err();
        assert!(matches!(err, Error::NoOverlap));
    }

    #[test]
    fn tile_compressed_image_opens() {
        use fitsio::images::{ImageDescription, ImageType};
        use fitsio::FitsFile;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("img.fits");
        let centre = SkyCoord::new(24.17, 15.78);
        let (rows, cols) = (30usize, 40usize);
        {
            let mut fits = FitsFile::create(dir.path().join("img.fits[compress]"))
                .open()
                .unwrap();
            let desc = ImageDescription {
                data_type: ImageType::Long,
                dimensions: &[rows, cols],
            };
            let hdu = fits.create_image("SCI", &desc).unwrap();
            let pixels: Vec<i32> = (0..(rows * cols) as i32).collect();
            hdu.write_image(&mut fits, &pixels).unwrap();
            hdu.write_key(&mut fits, "CTYPE1", "RA---TAN").unwrap();
            hdu.write_key(&mut fits, "CTYPE2", "DEC--TAN").unwrap();
            hdu.write_key(&mut fits, "CRPIX1", 20.5).unwrap();
            hdu.write_key(&mut fits, "CRPIX2", 15.5).unwrap();
            hdu.write_key(&mut fits, "CRVAL1", centre.ra).unwrap();
            hdu.write_key(&mut fits, "CRVAL2", centre.dec).unwrap();
            hdu.write_key(&mut fits, "CDELT1", -0.1 / 3600.0).unwrap();
            hdu.write_key(&mut fits, "CDELT2", 0.1 / 3600.0).unwrap();
        }

        let image = SkyImage::open(&plain).unwrap();
        assert_eq!(image.data.dim(), (rows, cols));
        assert_eq!(image.data[[0, 1]], 1.0);
        assert_eq!(image.data[[2, 3]], (2 * cols + 3) as f64);

        let expected = Wcs::tan((20.5, 15.5), centre, Angle::from_arcsec(0.1)).unwrap();
        let got = image.wcs.pixel_to_world(5.0, 7.0);
        let want = expected.pixel_to_world(5.0, 7.0);
        assert_abs_diff_eq!(got.ra, want.ra, epsilon = 1e-9);
        assert_abs_diff_eq!(got.dec, want.dec, epsilon = 1e-9);
    }
}
