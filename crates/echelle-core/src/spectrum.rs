use std::fmt;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::consts::{SNR_MEDIAN_WINDOW, SPEED_OF_LIGHT_KM_S};
use crate::continuum::{self, ContinuumConfig, FitResult, RobustPolynomialFit};
use crate::error::{EchelleError, Result};
use crate::numeric::{estimate_snr, finite_mean, interp, interp_clamped, median_step};

/// A scalar header or provenance value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Insertion-ordered, string-keyed metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    entries: Vec<(String, MetaValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetaValue::as_f64)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set `key`, concatenating onto an existing string value.
    ///
    /// Containers repeat keys for COMMENT/HISTORY cards and for long values
    /// split over several cards. Non-string repeats keep the latest value.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, MetaValue::Str(existing))) => match value {
                MetaValue::Str(s) => existing.push_str(&s),
                other => existing.push_str(&other.to_string()),
            },
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

/// A Doppler shift given either as a velocity (km/s) or as a redshift.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Redshift {
    Velocity(f64),
    Z(f64),
}

impl Redshift {
    /// Build from optional parts; exactly one of `v` and `z` must be set.
    pub fn from_parts(v: Option<f64>, z: Option<f64>) -> Result<Self> {
        match (v, z) {
            (Some(v), None) => Ok(Self::Velocity(v)),
            (None, Some(z)) => Ok(Self::Z(z)),
            _ => Err(EchelleError::InvalidRedshift),
        }
    }

    pub fn z(&self) -> f64 {
        match self {
            Self::Velocity(v) => v / SPEED_OF_LIGHT_KM_S,
            Self::Z(z) => *z,
        }
    }
}

/// A one-dimensional spectrum: dispersion, flux and inverse variance.
///
/// Construction enforces equal lengths and strictly increasing dispersion
/// (monotonically decreasing input is reversed). Transformations return new
/// values; the arrays are never mutated in place.
#[derive(Clone, Debug)]
pub struct Spectrum {
    dispersion: Array1<f64>,
    flux: Array1<f64>,
    ivar: Array1<f64>,
    pub metadata: Metadata,
}

impl Spectrum {
    pub fn new(
        dispersion: Array1<f64>,
        flux: Array1<f64>,
        ivar: Array1<f64>,
        metadata: Metadata,
    ) -> Result<Self> {
        if dispersion.len() != flux.len() || dispersion.len() != ivar.len() {
            return Err(EchelleError::DimensionMismatch {
                dispersion: dispersion.len(),
                flux: flux.len(),
                ivar: ivar.len(),
            });
        }

        let (mut dispersion, mut flux, mut ivar) = (dispersion, flux, ivar);
        let n = dispersion.len();
        if n > 1 && dispersion.windows(2).into_iter().all(|w| w[1] < w[0]) {
            dispersion.invert_axis(ndarray::Axis(0));
            flux.invert_axis(ndarray::Axis(0));
            ivar.invert_axis(ndarray::Axis(0));
        }

        if let Some(index) = (1..n).find(|&i| !(dispersion[i] > dispersion[i - 1])) {
            return Err(EchelleError::UnsortedDispersion { index });
        }

        let max_ivar = ivar
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        if matches!(max_ivar, None | Some(0.0)) {
            let fallback = 1.0 / finite_mean(flux.iter().copied());
            ivar = Array1::from_elem(n, fallback);
        }

        Ok(Self {
            dispersion: dispersion.as_standard_layout().to_owned(),
            flux: flux.as_standard_layout().to_owned(),
            ivar: ivar.as_standard_layout().to_owned(),
            metadata,
        })
    }

    /// Convenience constructor from plain vectors with empty metadata.
    pub fn from_vecs(dispersion: Vec<f64>, flux: Vec<f64>, ivar: Vec<f64>) -> Result<Self> {
        Self::new(
            Array1::from_vec(dispersion),
            Array1::from_vec(flux),
            Array1::from_vec(ivar),
            Metadata::new(),
        )
    }

    pub fn dispersion(&self) -> &Array1<f64> {
        &self.dispersion
    }

    pub fn flux(&self) -> &Array1<f64> {
        &self.flux
    }

    pub fn ivar(&self) -> &Array1<f64> {
        &self.ivar
    }

    pub fn len(&self) -> usize {
        self.dispersion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispersion.is_empty()
    }

    /// First and last wavelength, if any samples exist.
    pub fn wavelength_range(&self) -> Option<(f64, f64)> {
        match (self.dispersion.first(), self.dispersion.last()) {
            (Some(&lo), Some(&hi)) => Some((lo, hi)),
            _ => None,
        }
    }

    pub fn median_pixel_spacing(&self) -> f64 {
        median_step(self.dispersion_slice())
    }

    pub(crate) fn dispersion_slice(&self) -> &[f64] {
        self.dispersion.as_slice().unwrap_or(&[])
    }

    pub(crate) fn flux_slice(&self) -> &[f64] {
        self.flux.as_slice().unwrap_or(&[])
    }

    pub(crate) fn ivar_slice(&self) -> &[f64] {
        self.ivar.as_slice().unwrap_or(&[])
    }

    pub fn into_parts(self) -> (Array1<f64>, Array1<f64>, Array1<f64>, Metadata) {
        (self.dispersion, self.flux, self.ivar, self.metadata)
    }

    fn select(&self, keep: impl Fn(usize) -> bool) -> Result<Self> {
        let idx: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        let pick = |a: &Array1<f64>| idx.iter().map(|&i| a[i]).collect::<Array1<f64>>();
        Self::new(
            pick(&self.dispersion),
            pick(&self.flux),
            pick(&self.ivar),
            self.metadata.clone(),
        )
    }

    /// Keep samples whose wavelength lies strictly between `min` and `max`.
    pub fn cut_wavelength(&self, min: f64, max: f64) -> Result<Self> {
        self.select(|i| self.dispersion[i] > min && self.dispersion[i] < max)
    }

    /// Drop `blue` pixels from the start and `red` pixels from the end.
    pub fn trim_pixels(&self, blue: usize, red: usize) -> Result<Self> {
        let end = self.len().saturating_sub(red);
        self.select(|i| i >= blue && i < end)
    }

    /// Doppler-shift the spectrum by `1 + z`.
    ///
    /// With `reinterpolate`, the original grid is kept and the flux is
    /// linearly resampled from the shifted grid back onto it.
    pub fn redshift(&self, shift: Redshift, reinterpolate: bool) -> Self {
        let factor = 1.0 + shift.z();
        let shifted: Array1<f64> = self.dispersion.mapv(|d| d * factor);

        if reinterpolate {
            let flux = interp_clamped(
                self.dispersion_slice(),
                shifted.as_slice().unwrap_or(&[]),
                self.flux_slice(),
            );
            Self {
                dispersion: self.dispersion.clone(),
                flux: Array1::from_vec(flux),
                ivar: self.ivar.clone(),
                metadata: self.metadata.clone(),
            }
        } else {
            Self {
                dispersion: shifted,
                flux: self.flux.clone(),
                ivar: self.ivar.clone(),
                metadata: self.metadata.clone(),
            }
        }
    }

    /// Linearly resample flux and ivar onto `new_dispersion`; samples outside
    /// the native coverage take `fill`.
    pub fn linterpolate(&self, new_dispersion: &Array1<f64>, fill: f64) -> Result<Self> {
        let grid = new_dispersion.to_vec();
        let flux = interp(&grid, self.dispersion_slice(), self.flux_slice(), fill, fill);
        let ivar = interp(&grid, self.dispersion_slice(), self.ivar_slice(), fill, fill);
        Self::new(
            Array1::from_vec(grid),
            Array1::from_vec(flux),
            Array1::from_vec(ivar),
            self.metadata.clone(),
        )
    }

    /// Gaussian-smooth the flux with a kernel of the given FWHM in wavelength
    /// units. The inverse variance is carried over unchanged.
    pub fn gaussian_smooth(&self, fwhm: f64) -> Self {
        let profile_sigma = fwhm / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt());
        let sigma_pixels = profile_sigma / self.median_pixel_spacing();
        if !(sigma_pixels.is_finite() && sigma_pixels > 0.0) || self.len() < 2 {
            return self.clone();
        }

        let kernel = gaussian_kernel(sigma_pixels);
        let radius = kernel.len() / 2;
        let n = self.len() as isize;
        let smoothed: Array1<f64> = (0..self.len())
            .map(|i| {
                kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let src = (i as isize + k as isize - radius as isize).clamp(0, n - 1);
                        self.flux[src as usize] * w
                    })
                    .sum()
            })
            .collect();

        Self {
            dispersion: self.dispersion.clone(),
            flux: smoothed,
            ivar: self.ivar.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Spline knot positions the continuum fitter would use.
    pub fn knots(&self, knot_spacing: f64, exclude: &[(f64, f64)]) -> Vec<f64> {
        continuum::knots_for_spectrum(self, knot_spacing, exclude)
    }

    /// Fit and divide out the continuum. See [`continuum::fit_continuum`].
    pub fn fit_continuum(&self, config: &ContinuumConfig) -> Result<FitResult> {
        continuum::fit_continuum(self, config)
    }

    /// Normalize by a sigma-clipped polynomial of degree `order`.
    pub fn fit_robust_polynomial(&self, order: usize) -> Result<RobustPolynomialFit> {
        continuum::fit_robust_polynomial(self, order)
    }

    /// Signal-to-noise of the flux from its scatter about a running median.
    pub fn estimate_snr(&self) -> f64 {
        estimate_snr(self.flux_slice(), SNR_MEDIAN_WINDOW)
    }

    /// Add Gaussian noise of standard deviation `ivar^-1/2` to the flux.
    ///
    /// Pixels without positive finite ivar are left untouched. A seed makes
    /// the draw reproducible.
    pub fn add_noise(&self, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let flux = self
            .flux
            .iter()
            .zip(&self.ivar)
            .map(|(&f, &w)| {
                let z: f64 = rng.sample(StandardNormal);
                if w.is_finite() && w > 0.0 {
                    f + z / w.sqrt()
                } else {
                    f
                }
            })
            .collect();

        Self {
            dispersion: self.dispersion.clone(),
            flux,
            ivar: self.ivar.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (sigma * 3.0).ceil() as usize;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}
