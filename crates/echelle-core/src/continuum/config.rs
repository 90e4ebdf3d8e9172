use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CONTINUUM_ORDER, DEFAULT_HIGH_SIGMA_CLIP, DEFAULT_KNOT_SPACING, DEFAULT_LOW_SIGMA_CLIP,
    DEFAULT_MAX_ITERATIONS,
};
use crate::error::EchelleError;

/// Function family fitted to the continuum.
///
/// Names are parsed with [`FromStr`] everywhere, including deserialization,
/// so configuration files accept the same aliases as the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BasisFunction {
    #[default]
    Spline,
    Polynomial,
    Legendre,
    Chebyshev,
    /// `A * sinc^2((x - c) / w) * poly(x)`.
    Polysinc,
}

impl fmt::Display for BasisFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spline => write!(f, "spline"),
            Self::Polynomial => write!(f, "polynomial"),
            Self::Legendre => write!(f, "legendre"),
            Self::Chebyshev => write!(f, "chebyshev"),
            Self::Polysinc => write!(f, "polysinc"),
        }
    }
}

impl FromStr for BasisFunction {
    type Err = EchelleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spline" => Ok(Self::Spline),
            "poly" | "polynomial" => Ok(Self::Polynomial),
            "leg" | "legendre" => Ok(Self::Legendre),
            "cheb" | "chebyshev" => Ok(Self::Chebyshev),
            "polysinc" => Ok(Self::Polysinc),
            _ => Err(EchelleError::UnknownBasisFunction(s.to_string())),
        }
    }
}

impl TryFrom<String> for BasisFunction {
    type Error = EchelleError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<BasisFunction> for String {
    fn from(function: BasisFunction) -> Self {
        function.to_string()
    }
}

/// A synthetic point added to every fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdditionalPoint {
    pub wavelength: f64,
    pub flux: f64,
    /// Multiplier on the median candidate weight.
    pub weight: f64,
}

/// Continuum fit parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuumConfig {
    /// Spline knot spacing in wavelength units; `None` or 0 places no
    /// interior knots.
    pub knot_spacing: Option<f64>,
    /// Residuals below `-low_sigma_clip` are rejected.
    pub low_sigma_clip: f64,
    /// Residuals above `high_sigma_clip` are rejected.
    pub high_sigma_clip: f64,
    pub max_iterations: usize,
    /// Spline degree, or polynomial degree for the polynomial families.
    pub order: usize,
    /// Wavelength ranges never used in the fit.
    pub exclude: Vec<(f64, f64)>,
    /// Wavelength ranges always used and never clipped.
    pub include: Vec<(f64, f64)>,
    pub additional_points: Vec<AdditionalPoint>,
    pub function: BasisFunction,
    /// Factor applied to the final continuum.
    pub scale: f64,
}

impl Default for ContinuumConfig {
    fn default() -> Self {
        Self {
            knot_spacing: Some(DEFAULT_KNOT_SPACING),
            low_sigma_clip: DEFAULT_LOW_SIGMA_CLIP,
            high_sigma_clip: DEFAULT_HIGH_SIGMA_CLIP,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            order: DEFAULT_CONTINUUM_ORDER,
            exclude: Vec::new(),
            include: Vec::new(),
            additional_points: Vec::new(),
            function: BasisFunction::Spline,
            scale: 1.0,
        }
    }
}
