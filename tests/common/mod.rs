#![allow(dead_code)]

use clusterview::catalogue::{associations_root, catalogue_file_name, mask_file_name, COLUMN_RENAMES};
use clusterview::fits::Header;
use clusterview::{Angle, LabelMask, SkyCoord, SkyImage, Wcs};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription, ConcreteColumnDescription};
use fitsio::FitsFile;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TARGET: &str = "NGC628";
pub const BAND: &str = "nuv";
pub const VERSION: &str = "v1p1";
pub const MASK_SIZE: usize = 60;
pub const PIXEL_ARCSEC: f64 = 0.1;

pub fn centre() -> SkyCoord {
    SkyCoord::new(24.17, 15.78)
}

pub fn wcs(n: usize) -> Wcs {
    Wcs::tan(
        (n as f64 / 2.0 + 0.5, n as f64 / 2.0 + 0.5),
        centre(),
        Angle::from_arcsec(PIXEL_ARCSEC),
    )
    .unwrap()
}

/// 60x60 id mask: three 7x7 blobs labelled 1, 2 and 3 on a zero background.
pub fn mask_pixels() -> Array2<f64> {
    let mut data = Array2::zeros((MASK_SIZE, MASK_SIZE));
    for (label, (r0, c0)) in [(1.0, (10, 10)), (2.0, (30, 25)), (3.0, (45, 40))] {
        for r in r0..r0 + 7 {
            for c in c0..c0 + 7 {
                data[[r, c]] = label;
            }
        }
    }
    data
}

/// Blob centres in pixel `(x, y)`.
pub fn blob_centres() -> [(f64, f64); 3] {
    [(13.0, 13.0), (28.0, 33.0), (43.0, 48.0)]
}

pub fn write_mask(path: &Path, data: &Array2<f64>) {
    let (rows, cols) = data.dim();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[rows, cols],
    };
    let mut fits = FitsFile::create(path)
        .with_custom_primary(&description)
        .open()
        .unwrap();
    let hdu = fits.primary_hdu().unwrap();
    let flat: Vec<f64> = data.iter().copied().collect();
    hdu.write_image(&mut fits, &flat).unwrap();
    let c = centre();
    hdu.write_key(&mut fits, "CTYPE1", "RA---TAN").unwrap();
    hdu.write_key(&mut fits, "CTYPE2", "DEC--TAN").unwrap();
    hdu.write_key(&mut fits, "CRPIX1", cols as f64 / 2.0 + 0.5).unwrap();
    hdu.write_key(&mut fits, "CRPIX2", rows as f64 / 2.0 + 0.5).unwrap();
    hdu.write_key(&mut fits, "CRVAL1", c.ra).unwrap();
    hdu.write_key(&mut fits, "CRVAL2", c.dec).unwrap();
    hdu.write_key(&mut fits, "CDELT1", -PIXEL_ARCSEC / 3600.0).unwrap();
    hdu.write_key(&mut fits, "CDELT2", PIXEL_ARCSEC / 3600.0).unwrap();
}

/// Write a catalogue table with the given source columns, one value per row.
pub fn write_table(path: &Path, columns: &[(String, Vec<f64>)]) {
    let mut fits = FitsFile::create(path).open().unwrap();
    let descriptions: Vec<ConcreteColumnDescription> = columns
        .iter()
        .map(|(name, _)| {
            ColumnDescription::new(name)
                .with_type(ColumnDataType::Double)
                .create()
                .unwrap()
        })
        .collect();
    let hdu = fits.create_table("ASSOCIATIONS", &descriptions).unwrap();
    for (name, values) in columns {
        hdu.write_col(&mut fits, name, values).unwrap();
    }
}

/// Catalogue rows matching the three mask blobs.
pub fn catalogue_columns(with_flux: bool) -> Vec<(String, Vec<f64>)> {
    let w = wcs(MASK_SIZE);
    let sky: Vec<SkyCoord> = blob_centres()
        .iter()
        .map(|&(x, y)| w.pixel_to_world(x, y))
        .collect();
    let mut columns: Vec<(String, Vec<f64>)> = COLUMN_RENAMES
        .iter()
        .map(|(from, _)| {
            let values = match *from {
                "reg_id" => vec![1.0, 2.0, 3.0],
                "reg_ra" => sky.iter().map(|s| s.ra).collect(),
                "reg_dec" => sky.iter().map(|s| s.dec).collect(),
                "reg_x" => blob_centres().iter().map(|p| p.0).collect(),
                "reg_y" => blob_centres().iter().map(|p| p.1).collect(),
                _ => vec![0.5, 1.5, 2.5],
            };
            (from.to_string(), values)
        })
        .collect();
    if with_flux {
        columns.push(("NUV_mjy".into(), vec![0.012, 0.5, 3.25]));
        columns.push(("NUV_mjy_err".into(), vec![0.001, 0.02, 0.1]));
    }
    columns
}

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// NGC628 at 16, 32 and 64 pc plus an empty NGC1365 target. The 64 pc
    /// catalogue lacks `reg_dec`.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = associations_root(dir.path(), VERSION);
        std::fs::create_dir_all(base.join("NGC1365")).unwrap();
        for scale in [16u32, 32, 64] {
            let folder = Self::scale_dir_in(dir.path(), scale);
            std::fs::create_dir_all(&folder).unwrap();
            let mut columns = catalogue_columns(true);
            if scale == 64 {
                columns.retain(|(name, _)| name != "reg_dec");
            }
            write_table(&folder.join(catalogue_file_name(TARGET, BAND, scale, VERSION)), &columns);
            write_mask(&folder.join(mask_file_name(TARGET, BAND, scale, VERSION)), &mask_pixels());
        }
        Self { dir }
    }

    fn scale_dir_in(root: &Path, scale: u32) -> PathBuf {
        associations_root(root, VERSION)
            .join(TARGET)
            .join(format!("{TARGET}_{BAND}_tracerstars"))
            .join(format!("{scale}pc"))
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// In-memory background image of `n x n` pixels sharing the mask's sky centre.
pub fn background(n: usize) -> SkyImage {
    let data = Array2::from_shape_fn((n, n), |(r, c)| ((r * 13 + c * 7) % 17) as f64);
    SkyImage::new(data, Header::default(), wcs(n))
}

pub fn label_mask(data: Array2<f64>) -> LabelMask {
    let n = data.nrows();
    LabelMask::from_label_image(data, Header::default(), wcs(n))
}
