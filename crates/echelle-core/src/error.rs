use std::path::PathBuf;

use thiserror::Error;

use crate::io::reader::StrategyFailure;

#[derive(Error, Debug)]
pub enum EchelleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS container: {0}")]
    InvalidFits(String),

    #[error("Structural read error: {0}")]
    StructuralRead(String),

    #[error("Cannot read spectrum from {} ({} strategies tried)", path.display(), attempts.len())]
    UnreadableSpectrum {
        path: PathBuf,
        attempts: Vec<StrategyFailure>,
    },

    #[error("Unsupported dispersion function: {0}")]
    UnsupportedDispersionFunction(String),

    #[error("Array length mismatch: dispersion={dispersion}, flux={flux}, ivar={ivar}")]
    DimensionMismatch {
        dispersion: usize,
        flux: usize,
        ivar: usize,
    },

    #[error("Dispersion is not strictly monotonic at index {index}")]
    UnsortedDispersion { index: usize },

    #[error("Unknown basis function: {0}")]
    UnknownBasisFunction(String),

    #[error("Common dispersion grid is not strictly increasing at index {index}")]
    NonContiguousGrid { index: usize },

    #[error("Empty spectrum sequence")]
    EmptySequence,

    #[error("Either a velocity or a redshift must be given, but not both")]
    InvalidRedshift,

    #[error("Unidentified band layout (checksum {checksum})")]
    UnidentifiedBands { checksum: String },

    #[error("Write error: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, EchelleError>;
