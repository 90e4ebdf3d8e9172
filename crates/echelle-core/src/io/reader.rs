use std::fmt;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_WAT_CARD_WIDTH;
use crate::error::{EchelleError, Result};
use crate::io::fits::FitsFile;
use crate::io::{ascii, cube, fits1d, mike, multispec};
use crate::spectrum::{Metadata, Spectrum};

/// Metadata key recording the file a spectrum was read from.
pub const READ_PATH_KEY: &str = "read_path";

/// Metadata key holding an order's echelle order number.
pub const ORDER_NUMBER_KEY: &str = "order";

/// Parsers tried by [`read_spectrum`], in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStrategy {
    Mike,
    Multispec,
    Fits1d,
    Ascii3,
    WaveFluxIvarCube,
    Ceres,
    LegacyMultispec,
    Ascii2,
}

impl ReadStrategy {
    pub const ALL: [ReadStrategy; 8] = [
        Self::Mike,
        Self::Multispec,
        Self::Fits1d,
        Self::Ascii3,
        Self::WaveFluxIvarCube,
        Self::Ceres,
        Self::LegacyMultispec,
        Self::Ascii2,
    ];
}

impl fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mike => write!(f, "MIKE"),
            Self::Multispec => write!(f, "multispec"),
            Self::Fits1d => write!(f, "fits-1d"),
            Self::Ascii3 => write!(f, "ascii (3 columns)"),
            Self::WaveFluxIvarCube => write!(f, "wavelength/flux/ivar cube"),
            Self::Ceres => write!(f, "CERES"),
            Self::LegacyMultispec => write!(f, "legacy multispec"),
            Self::Ascii2 => write!(f, "ascii (2 columns)"),
        }
    }
}

/// A single strategy's structural failure, kept for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: ReadStrategy,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Reader overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Zero-indexed flux band of multi-band containers.
    pub flux_band: Option<usize>,
    /// Zero-indexed noise band of multi-band containers.
    pub noise_band: Option<usize>,
    /// Width each `WAT2_nnn` value is padded to before joining.
    pub card_width: usize,
    /// Accept unrecognised band layouts with NaN ivar instead of failing.
    pub allow_unidentified: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            flux_band: None,
            noise_band: None,
            card_width: DEFAULT_WAT_CARD_WIDTH,
            allow_unidentified: false,
        }
    }
}

/// Per-order arrays produced by a strategy, before validation.
#[derive(Clone, Debug)]
pub(crate) struct RawOrders {
    pub dispersion: Vec<Vec<f64>>,
    pub flux: Vec<Vec<f64>>,
    pub ivar: Vec<Vec<f64>>,
    pub metadata: Metadata,
    /// Echelle order number of each order, when the container records them.
    pub order_numbers: Vec<i64>,
}

impl RawOrders {
    fn into_spectra(self) -> Result<Vec<Spectrum>> {
        if self.dispersion.is_empty() {
            return Err(EchelleError::StructuralRead("no orders".into()));
        }
        let metadata = self.metadata;
        let numbers = self.order_numbers;
        self.dispersion
            .into_iter()
            .zip(self.flux)
            .zip(self.ivar)
            .enumerate()
            .map(|(index, ((d, f), i))| {
                let mut metadata = metadata.clone();
                if let Some(&number) = numbers.get(index) {
                    metadata.insert(ORDER_NUMBER_KEY, number);
                }
                Spectrum::new(Array1::from_vec(d), Array1::from_vec(f), Array1::from_vec(i), metadata)
            })
            .collect()
    }
}

/// Orders read from one file.
#[derive(Clone, Debug)]
pub struct ReadOutcome {
    pub strategy: ReadStrategy,
    pub orders: Vec<Spectrum>,
    /// Strategies that failed before `strategy` succeeded.
    pub attempts: Vec<StrategyFailure>,
}

impl ReadOutcome {
    /// The only order, for single-order inputs.
    pub fn single(&self) -> Option<&Spectrum> {
        match self.orders.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Read every order from `path`, trying each [`ReadStrategy`] in turn.
///
/// The first strategy that parses the file and yields valid spectra wins.
pub fn read_spectrum(path: &Path, options: &ReaderOptions) -> Result<ReadOutcome> {
    if !path.exists() {
        return Err(EchelleError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    // Parsed once, shared by every FITS-based strategy.
    let fits: std::result::Result<FitsFile, String> =
        FitsFile::open(path).map_err(|e| e.to_string());

    let mut attempts = Vec::new();
    for strategy in ReadStrategy::ALL {
        let result = run_strategy(strategy, path, &fits, options).and_then(RawOrders::into_spectra);

        match result {
            Ok(mut orders) => {
                let source = path.display().to_string();
                for order in &mut orders {
                    order.metadata.insert(READ_PATH_KEY, source.as_str());
                }
                tracing::debug!(
                    path = %source,
                    %strategy,
                    orders = orders.len(),
                    "Read spectrum"
                );
                return Ok(ReadOutcome {
                    strategy,
                    orders,
                    attempts,
                });
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), %strategy, error = %e, "Read strategy failed");
                attempts.push(StrategyFailure {
                    strategy,
                    reason: e.to_string(),
                });
            }
        }
    }

    Err(EchelleError::UnreadableSpectrum {
        path: path.to_path_buf(),
        attempts,
    })
}

fn run_strategy(
    strategy: ReadStrategy,
    path: &Path,
    fits: &std::result::Result<FitsFile, String>,
    options: &ReaderOptions,
) -> Result<RawOrders> {
    let fits = match (strategy, fits) {
        (ReadStrategy::Ascii3, _) => return ascii::read_ascii3(path),
        (ReadStrategy::Ascii2, _) => return ascii::read_ascii2(path),
        (_, Err(reason)) => return Err(EchelleError::StructuralRead(reason.clone())),
        (_, Ok(fits)) => fits,
    };
    match strategy {
        ReadStrategy::Mike => mike::read_mike(fits, options),
        ReadStrategy::Multispec => multispec::read_multispec(fits, options),
        ReadStrategy::Fits1d => fits1d::read_fits_spectrum1d(fits),
        ReadStrategy::WaveFluxIvarCube => cube::read_wave_flux_ivar_cube(fits),
        ReadStrategy::Ceres => cube::read_ceres(fits),
        ReadStrategy::LegacyMultispec => multispec::read_legacy_multispec(fits, options),
        ReadStrategy::Ascii3 => ascii::read_ascii3(path),
        ReadStrategy::Ascii2 => ascii::read_ascii2(path),
    }
}
