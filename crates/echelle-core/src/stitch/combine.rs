use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::PARALLEL_RESAMPLE_THRESHOLD;
use crate::error::{EchelleError, Result};
use crate::numeric::interp;
use crate::spectrum::{Metadata, Spectrum};
use crate::stitch::grid::{common_dispersion, validate_grid};

/// How overlapping orders are combined at each grid point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StitchMethod {
    /// Inverse-variance weighted mean; ivar is the summed ivar.
    #[default]
    Stitch,
    /// Weighted mean; ivar from the weighted scatter between orders.
    StitchWeighted,
    /// Plain sum of fluxes, e.g. for raw counts.
    Coadd,
}

impl fmt::Display for StitchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stitch => write!(f, "stitch"),
            Self::StitchWeighted => write!(f, "stitch_weighted"),
            Self::Coadd => write!(f, "coadd"),
        }
    }
}

impl FromStr for StitchMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "stitch" => Ok(Self::Stitch),
            "stitch_weighted" | "weighted" => Ok(Self::StitchWeighted),
            "coadd" => Ok(Self::Coadd),
            other => Err(format!("unknown stitch method '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub method: StitchMethod,
    /// Return the per-order resampled flux and ivar.
    pub keep_resampled: bool,
}

/// Orders resampled onto the common grid, one row per order.
#[derive(Clone, Debug)]
pub struct Resampled {
    pub flux: Array2<f64>,
    pub ivar: Array2<f64>,
}

#[derive(Clone, Debug)]
pub struct StitchOutput {
    pub spectrum: Spectrum,
    pub resampled: Option<Resampled>,
}

/// Merge orders onto one grid. `grid` replaces the common grid when given.
pub fn stitch_orders(spectra: &[Spectrum], grid: Option<&[f64]>, config: &StitchConfig) -> Result<StitchOutput> {
    if spectra.is_empty() {
        return Err(EchelleError::EmptySequence);
    }
    let grid = match grid {
        Some(g) => {
            validate_grid(g)?;
            g.to_vec()
        }
        None => common_dispersion(spectra)?,
    };

    let resampled = resample(spectra, &grid);
    let (flux, ivar) = combine(&resampled, config.method);
    tracing::debug!(
        orders = spectra.len(),
        points = grid.len(),
        method = %config.method,
        "Stitched orders"
    );

    let spectrum = Spectrum::new(Array1::from_vec(grid), flux, ivar, Metadata::new())?;
    Ok(StitchOutput {
        spectrum,
        resampled: config.keep_resampled.then_some(resampled),
    })
}

/// Linearly interpolate every order onto `grid`, with zero flux and ivar
/// outside its coverage and wherever `flux * ivar` is not finite.
fn resample(spectra: &[Spectrum], grid: &[f64]) -> Resampled {
    let one = |s: &Spectrum| -> (Vec<f64>, Vec<f64>) {
        let mut f = interp(grid, s.dispersion_slice(), s.flux_slice(), 0.0, 0.0);
        let mut w = interp(grid, s.dispersion_slice(), s.ivar_slice(), 0.0, 0.0);
        for (fv, wv) in f.iter_mut().zip(w.iter_mut()) {
            if !(*fv * *wv).is_finite() {
                *fv = 0.0;
                *wv = 0.0;
            }
        }
        (f, w)
    };

    let rows: Vec<(Vec<f64>, Vec<f64>)> = if spectra.len() * grid.len() >= PARALLEL_RESAMPLE_THRESHOLD {
        spectra.par_iter().map(one).collect()
    } else {
        spectra.iter().map(one).collect()
    };

    let (n, m) = (spectra.len(), grid.len());
    let mut flux = Array2::<f64>::zeros((n, m));
    let mut ivar = Array2::<f64>::zeros((n, m));
    for (i, (f, w)) in rows.into_iter().enumerate() {
        flux.row_mut(i).assign(&Array1::from_vec(f));
        ivar.row_mut(i).assign(&Array1::from_vec(w));
    }
    Resampled { flux, ivar }
}

fn combine(r: &Resampled, method: StitchMethod) -> (Array1<f64>, Array1<f64>) {
    let weight_sum = r.ivar.sum_axis(Axis(0));
    let weighted_flux = (&r.flux * &r.ivar).sum_axis(Axis(0));

    match method {
        StitchMethod::Stitch => (&weighted_flux / &weight_sum, weight_sum),
        StitchMethod::StitchWeighted => {
            let flux = &weighted_flux / &weight_sum;
            let deviation = &r.flux - &flux.view().insert_axis(Axis(0));
            let scatter = (&deviation * &deviation * &r.ivar).sum_axis(Axis(0));
            let ivar = (&scatter / &weight_sum).mapv(|ms| 1.0 / ms);
            (flux, ivar)
        }
        StitchMethod::Coadd => {
            let flux = r.flux.sum_axis(Axis(0));
            let inverse_sum = r
                .ivar
                .map(|&w| if w > 0.0 { 1.0 / w } else { 0.0 })
                .sum_axis(Axis(0));
            let ivar = inverse_sum.mapv(|s| if s > 0.0 { 1.0 / s } else { 0.0 });
            (flux, ivar)
        }
    }
}
