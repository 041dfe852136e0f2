use crate::error::{Error, Result};
use fitsio::hdu::HduInfo;
use fitsio::FitsFile;
use ndarray::Array2;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const BLOCK: usize = 2880;
const CARD: usize = 80;

/// Header cards of one HDU, in file order.
///
/// Values are stored as the raw text after `= ` with the comment removed and
/// string quotes stripped. Commentary cards (COMMENT, HISTORY, blank,
/// CONTINUE) are not kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, String)>,
}

impl Header {
    pub fn new(cards: Vec<(String, String)>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[(String, String)] {
        &self.cards
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cards
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Parse a float value. Fortran style `D` exponents are accepted.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)
            .and_then(|v| v.trim().replace(['D', 'd'], "E").parse::<f64>().ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim)
    }

    pub fn require_f64(&self, key: &str) -> Result<f64> {
        match self.get(key) {
            None => Err(Error::header(key, "missing")),
            Some(v) => self
                .get_f64(key)
                .ok_or_else(|| Error::header(key, format!("not a number: {v}"))),
        }
    }
}

/// Numeric columns of a FITS binary table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<(String, Vec<f64>)>,
    num_rows: usize,
}

impl Table {
    /// Build a table from named columns; the row count is the shortest column.
    pub fn new(columns: Vec<(String, Vec<f64>)>) -> Self {
        let num_rows = columns.iter().map(|(_, v)| v.len()).min().unwrap_or(0);
        Self { columns, num_rows }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn columns(&self) -> &[(String, Vec<f64>)] {
        &self.columns
    }
}

/// Index of the first HDU in `path` that holds non-empty image data.
pub fn first_image_hdu(path: &Path) -> Result<usize> {
    let mut fits = FitsFile::open(path)?;
    let hdu_count = fits.iter().count();
    for i in 0..hdu_count {
        let hdu = fits.hdu(i)?;
        if let HduInfo::ImageInfo { ref shape, .. } = hdu.info {
            if !shape.is_empty() && shape.iter().product::<usize>() > 0 {
                return Ok(i);
            }
        }
    }
    Err(Error::Shape(format!(
        "no image HDU found in {}",
        path.display()
    )))
}

/// Read an image HDU as `f64`, shaped `(NAXIS2, NAXIS1)`.
///
/// The shape comes from cfitsio, so tile-compressed images read the same as
/// plain ones. Row 0 is the first row stored in the file, so plotting with
/// the origin in the lower-left corner reproduces the usual sky orientation.
pub fn read_image_f64(path: &Path, hdu_index: usize) -> Result<(Array2<f64>, Header)> {
    let mut fits = FitsFile::open(path)?;
    let hdu = fits.hdu(hdu_index)?;
    let (height, width) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => (shape[0], shape[1]),
        HduInfo::ImageInfo { shape, .. } => {
            return Err(Error::Shape(format!(
                "HDU {hdu_index} of {} has {} axes, expected 2",
                path.display(),
                shape.len()
            )))
        }
        _ => {
            return Err(Error::Shape(format!(
                "HDU {hdu_index} of {} is not an image",
                path.display()
            )))
        }
    };
    // cfitsio applies BSCALE/BZERO on the way out
    let raw: Vec<f64> = hdu.read_image(&mut fits)?;
    let data = Array2::from_shape_vec((height, width), raw)
        .map_err(|e| Error::Shape(format!("HDU {hdu_index}: {e}")))?;
    // compressed images keep their WCS cards in the table header
    let header = read_header(path, hdu_index)?;
    log::debug!(
        "read {}x{} image from HDU {hdu_index} of {}",
        width,
        height,
        path.display()
    );
    Ok((data, header))
}

/// Read every numeric column of the binary table in `hdu_index`.
pub fn read_table(path: &Path, hdu_index: usize) -> Result<Table> {
    let mut fits = FitsFile::open(path)?;
    let hdu = fits.hdu(hdu_index)?;
    let (names, num_rows) = match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            num_rows,
            ..
        } => (
            column_descriptions
                .iter()
                .map(|c| c.name.clone())
                .collect::<Vec<_>>(),
            *num_rows,
        ),
        _ => {
            return Err(Error::Shape(format!(
                "HDU {hdu_index} of {} is not a table",
                path.display()
            )))
        }
    };

    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        match hdu.read_col::<f64>(&mut fits, &name) {
            Ok(values) if values.len() == num_rows => columns.push((name, values)),
            Ok(values) => log::warn!(
                "skipping column {name}: {} values for {num_rows} rows",
                values.len()
            ),
            Err(e) => log::warn!("skipping non-numeric column {name}: {e}"),
        }
    }
    Ok(Table { columns, num_rows })
}

/// Read the header cards of `hdu_idx` by walking the raw FITS blocks.
///
/// FITS headers are 80-byte ASCII records packed into 2880-byte blocks and
/// terminated by an END record. Preceding HDUs are skipped by computing their
/// data size from BITPIX, NAXISn, PCOUNT and GCOUNT.
pub fn read_header(fits_path: &Path, hdu_idx: usize) -> Result<Header> {
    let file = std::fs::File::open(fits_path)?;
    let mut reader = BufReader::new(file);

    let mut block = [0u8; BLOCK];
    let mut hdus_seen = 0usize;

    loop {
        let mut header_bytes: Vec<u8> = Vec::new();
        let mut found_end = false;
        while !found_end {
            reader.read_exact(&mut block)?;
            header_bytes.extend_from_slice(&block);
            found_end = block
                .chunks_exact(CARD)
                .any(|rec| rec.starts_with(b"END") && rec[3..].iter().all(|&b| b == b' '));
        }

        if hdus_seen == hdu_idx {
            return Ok(parse_cards(&header_bytes));
        }
        hdus_seen += 1;

        let bitpix = find_header_int(&header_bytes, "BITPIX").unwrap_or(8);
        let naxis = find_header_int(&header_bytes, "NAXIS").unwrap_or(0);
        let mut data_size: u64 = if naxis == 0 {
            0
        } else {
            let mut npix: u64 = 1;
            for i in 1..=naxis {
                let key = format!("NAXIS{i}");
                npix *= find_header_int(&header_bytes, &key).unwrap_or(0).max(0) as u64;
            }
            let pcount = find_header_int(&header_bytes, "PCOUNT").unwrap_or(0).max(0) as u64;
            let gcount = find_header_int(&header_bytes, "GCOUNT").unwrap_or(1).max(1) as u64;
            (bitpix.unsigned_abs() / 8) * gcount * (pcount + npix)
        };
        if data_size % BLOCK as u64 != 0 {
            data_size += BLOCK as u64 - data_size % BLOCK as u64;
        }
        if data_size > 0 {
            reader.seek(SeekFrom::Current(data_size as i64))?;
        }
    }
}

fn parse_cards(header_bytes: &[u8]) -> Header {
    let mut cards = Vec::new();
    for rec in header_bytes.chunks_exact(CARD) {
        let card = std::str::from_utf8(rec).unwrap_or("").trim_end();
        if card.len() < 8 {
            continue;
        }
        let key = card[..8].trim().to_string();
        if key.is_empty()
            || key == "COMMENT"
            || key == "HISTORY"
            || key == "CONTINUE"
        {
            continue;
        }
        if key == "END" {
            break;
        }
        let value = if card.len() > 10 && &card[8..10] == "= " {
            let val_str = strip_fits_comment(card[10..].trim()).trim();
            if val_str.starts_with('\'') && val_str.ends_with('\'') && val_str.len() >= 2 {
                val_str[1..val_str.len() - 1]
                    .replace("''", "'")
                    .trim()
                    .to_string()
            } else {
                val_str.to_string()
            }
        } else {
            card[8..].trim().to_string()
        };
        cards.push((key, value));
    }
    Header::new(cards)
}

/// Remove the ` / comment` part from a FITS value field, respecting quoted strings.
fn strip_fits_comment(s: &str) -> &str {
    let s = s.trim();
    if s.starts_with('\'') {
        let bytes = s.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                    i += 2; // escaped quote
                } else {
                    return &s[..=i];
                }
            } else {
                i += 1;
            }
        }
        s
    } else if let Some(pos) = s.find('/') {
        s[..pos].trim_end()
    } else {
        s
    }
}

/// Extract an integer value from raw 80-byte FITS header records by keyword name.
fn find_header_int(header_bytes: &[u8], key: &str) -> Option<i64> {
    let key_padded = format!("{key:<8}");
    for rec in header_bytes.chunks_exact(CARD) {
        if rec.starts_with(key_padded.as_bytes()) {
            let card = std::str::from_utf8(rec).ok()?;
            if card.len() > 10 && &card[8..10] == "= " {
                let val = strip_fits_comment(card[10..].trim());
                return val.trim().parse::<i64>().ok();
            }
        }
    }
    None
}
