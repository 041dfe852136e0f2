use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading catalogues or producing figures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("target {target} not available (available: {})", available.join(","))]
    TargetNotFound {
        target: String,
        available: Vec<String>,
    },
    #[error("scalepc={scale_pc} not available for {target} (available: {available:?})")]
    ScaleNotFound {
        target: String,
        scale_pc: u32,
        available: Vec<u32>,
    },
    #[error("{}: missing columns {}", file.display(), missing.join(", "))]
    SchemaMismatch { file: PathBuf, missing: Vec<String> },
    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::errors::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("header keyword {key}: {reason}")]
    Header { key: String, reason: String },
    #[error("array shape error: {0}")]
    Shape(String),
    #[error("cutout position does not overlap the image")]
    NoOverlap,
    #[error("render error: {0}")]
    Render(String),
    #[error("PDF conversion error: {0}")]
    Pdf(String),
    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("viewer error: {0}")]
    Viewer(String),
}

impl Error {
    /// True for the two path-resolution failures of the catalogue loader.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::TargetNotFound { .. } | Error::ScaleNotFound { .. }
        )
    }

    pub(crate) fn header(key: &str, reason: impl Into<String>) -> Self {
        Error::Header {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
