//! Decoding of legacy per-order wavelength solutions.
//!
//! Each order of a multi-order container carries a `specN = "..."` string of
//! whitespace-separated floats describing how pixel index maps to wavelength.

use std::fmt;

use crate::error::{EchelleError, Result};

/// How a mapping's wavelengths are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispersionType {
    Linear,
    LogLinear,
    NonLinear,
}

impl DispersionType {
    fn from_code(code: f64) -> Result<Self> {
        match code as i64 {
            0 => Ok(Self::Linear),
            1 => Ok(Self::LogLinear),
            2 => Ok(Self::NonLinear),
            other => Err(EchelleError::UnsupportedDispersionFunction(format!(
                "dispersion type {other}"
            ))),
        }
    }
}

/// Function family of a non-linear mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionType {
    Chebyshev,
    Legendre,
    CubicSpline,
    LinearSpline,
    PixelArray,
    SampledArray,
}

impl FunctionType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Chebyshev),
            2 => Some(Self::Legendre),
            3 => Some(Self::CubicSpline),
            4 => Some(Self::LinearSpline),
            5 => Some(Self::PixelArray),
            6 => Some(Self::SampledArray),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chebyshev => write!(f, "Chebyshev"),
            Self::Legendre => write!(f, "Legendre"),
            Self::CubicSpline => write!(f, "cubic spline"),
            Self::LinearSpline => write!(f, "linear spline"),
            Self::PixelArray => write!(f, "pixel coordinate array"),
            Self::SampledArray => write!(f, "sampled coordinate array"),
        }
    }
}

/// One order's wavelength solution.
#[derive(Clone, Debug, PartialEq)]
pub struct DispersionMapping {
    pub aperture: i64,
    pub beam: i64,
    pub dispersion_type: DispersionType,
    pub dispersion_start: f64,
    pub mean_delta: f64,
    pub num_pixels: usize,
    pub redshift: f64,
    pub aperture_low: f64,
    pub aperture_high: f64,
    pub weight: f64,
    pub offset: f64,
    /// Raw function-type code; `None` when absent.
    pub function_type: Option<i64>,
    pub order: usize,
    pub pmin: f64,
    pub pmax: f64,
    pub coefficients: Vec<f64>,
}

impl DispersionMapping {
    /// Parse the float list of a single `specN` value.
    pub fn parse(text: &str) -> Result<Self> {
        let values = text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| {
                    EchelleError::StructuralRead(format!("non-numeric mapping value '{tok}'"))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Self::from_values(&values)
    }

    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.len() < 9 {
            return Err(EchelleError::StructuralRead(format!(
                "dispersion mapping needs at least 9 values, got {}",
                values.len()
            )));
        }
        let at = |i: usize, default: f64| values.get(i).copied().unwrap_or(default);

        Ok(Self {
            aperture: values[0] as i64,
            beam: values[1] as i64,
            dispersion_type: DispersionType::from_code(values[2])?,
            dispersion_start: values[3],
            mean_delta: values[4],
            num_pixels: values[5].max(0.0) as usize,
            redshift: values[6],
            aperture_low: values[7],
            aperture_high: values[8],
            weight: at(9, 1.0),
            offset: at(10, 0.0),
            function_type: values.get(11).map(|&v| v as i64),
            order: at(12, 0.0).max(0.0) as usize,
            pmin: at(13, f64::NAN),
            pmax: at(14, f64::NAN),
            coefficients: values.get(15..).map(<[f64]>::to_vec).unwrap_or_default(),
        })
    }

    /// Per-pixel wavelengths of this order.
    pub fn decode(&self) -> Result<Vec<f64>> {
        let n = self.num_pixels;
        let raw: Vec<f64> = match self.dispersion_type {
            DispersionType::Linear | DispersionType::LogLinear => {
                let linear = (0..n).map(|i| self.dispersion_start + i as f64 * self.mean_delta);
                let logarithmic = self.dispersion_type == DispersionType::LogLinear
                    || self.dispersion_start == 1.0;
                if logarithmic {
                    linear.map(|v| 10f64.powf(v)).collect()
                } else {
                    linear.collect()
                }
            }
            DispersionType::NonLinear => self.decode_function()?,
        };

        let scale = self.weight / (1.0 + self.redshift);
        Ok(raw.into_iter().map(|d| (d + self.offset) * scale).collect())
    }

    fn decode_function(&self) -> Result<Vec<f64>> {
        let code = self.function_type.ok_or_else(|| {
            EchelleError::UnsupportedDispersionFunction("missing function type".into())
        })?;
        let function = FunctionType::from_code(code).ok_or_else(|| {
            EchelleError::UnsupportedDispersionFunction(format!("function type {code}"))
        })?;

        if !(self.pmin.is_finite() && self.pmax.is_finite()) || self.pmax == self.pmin {
            return Err(EchelleError::UnsupportedDispersionFunction(format!(
                "{function} mapping without a valid pixel range"
            )));
        }
        let needed = match function {
            FunctionType::CubicSpline => self.order + 3,
            _ => self.order,
        };
        if self.order == 0 || self.coefficients.len() < needed {
            return Err(EchelleError::UnsupportedDispersionFunction(format!(
                "{function} mapping with order {} and {} coefficients",
                self.order,
                self.coefficients.len()
            )));
        }

        let pixels = (1..=self.num_pixels).map(|p| p as f64);
        match function {
            FunctionType::Chebyshev => {
                let span = self.pmax - self.pmin;
                Ok(pixels
                    .map(|p| {
                        let x = (2.0 * p - (self.pmax + self.pmin)) / span;
                        recurrence_sum(&self.coefficients[..self.order], x, |_, x, p1, p2| {
                            2.0 * x * p1 - p2
                        })
                    })
                    .collect())
            }
            FunctionType::Legendre => {
                let mid = (self.pmax + self.pmin) / 2.0;
                let half = (self.pmax - self.pmin) / 2.0;
                Ok(pixels
                    .map(|p| {
                        let x = (p - mid) / half;
                        recurrence_sum(&self.coefficients[..self.order], x, |k, x, p1, p2| {
                            let k = k as f64;
                            ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p2) / k
                        })
                    })
                    .collect())
            }
            FunctionType::CubicSpline => {
                let order = self.order as f64;
                Ok(pixels
                    .map(|p| {
                        let s = (p - self.pmin) / (self.pmax - self.pmin) * order;
                        let j = (s.floor().max(0.0) as usize).min(self.order - 1);
                        let a = (j + 1) as f64 - s;
                        let b = s - j as f64;
                        let basis = [
                            a * a * a,
                            1.0 + 3.0 * a * (1.0 + a * b),
                            1.0 + 3.0 * b * (1.0 + a * b),
                            b * b * b,
                        ];
                        basis
                            .iter()
                            .zip(&self.coefficients[j..j + 4])
                            .map(|(z, c)| z * c)
                            .sum()
                    })
                    .collect())
            }
            unsupported => Err(EchelleError::UnsupportedDispersionFunction(
                unsupported.to_string(),
            )),
        }
    }
}

/// Weighted sum of a three-term recurrence starting at `P0 = 1`, `P1 = x`.
fn recurrence_sum(
    coefficients: &[f64],
    x: f64,
    next: impl Fn(usize, f64, f64, f64) -> f64,
) -> f64 {
    let mut total = 0.0;
    let (mut p2, mut p1) = (0.0, 0.0);
    for (k, c) in coefficients.iter().enumerate() {
        let pk = match k {
            0 => 1.0,
            1 => x,
            _ => next(k, x, p1, p2),
        };
        total += c * pk;
        p2 = p1;
        p1 = pk;
    }
    total
}

/// Split concatenated `WAT2_nnn` text into `specN` float strings, in order.
///
/// The header value of each card is right-padded to `card_width` before
/// joining, since the writer splits values at fixed width and trailing blanks
/// are significant.
pub fn split_wat_specs(cards: &[String], card_width: usize) -> Vec<String> {
    let joined: String = cards
        .iter()
        .map(|c| format!("{c:<card_width$}"))
        .collect();
    split_spec_strings(&joined)
}

fn split_spec_strings(text: &str) -> Vec<String> {
    let marker = match regex::Regex::new(r#"spec[0-9]+ ?= ?""#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let starts: Vec<(usize, usize)> = marker.find_iter(text).map(|m| (m.start(), m.end())).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &(_, value_start))| {
            let end = starts.get(i + 1).map_or(text.len(), |&(next, _)| next);
            text[value_start..end]
                .trim_end_matches(|c: char| c == '"' || c.is_whitespace())
                .to_string()
        })
        .collect()
}
