//! Alternative continuum estimators: a sigma-clipped polynomial and a
//! spline through knots that lose support when their neighbourhood is
//! dominated by lines.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::consts::{ROBUST_POLY_CLIP_SIGMA, ROBUST_POLY_MAX_ITERATIONS};
use crate::continuum::basis::{dot, family_terms, weighted_lstsq, BSpline, Domain, Family};
use crate::error::Result;
use crate::numeric::{finite_median, interp, median_filter, median_step, searchsorted};
use crate::spectrum::Spectrum;

/// Outcome of [`fit_robust_polynomial`].
#[derive(Clone, Debug)]
pub struct RobustPolynomialFit {
    /// Flux divided by the continuum over the whole input.
    pub normalized: Spectrum,
    pub continuum: Array1<f64>,
    /// RMS of the residuals that survived clipping.
    pub rms: f64,
}

impl RobustPolynomialFit {
    /// Median continuum level over the residual RMS.
    pub fn snr(&self) -> f64 {
        finite_median(self.continuum.iter().copied()) / self.rms
    }

    pub fn is_failure(&self) -> bool {
        self.continuum.iter().all(|c| c.is_nan())
    }
}

/// Unweighted polynomial fit of degree `order` with iterative rejection of
/// residuals beyond a few RMS.
///
/// Every finite sample starts in the fit. Too few finite samples give an
/// all-NaN continuum rather than an error.
pub fn fit_robust_polynomial(spectrum: &Spectrum, order: usize) -> Result<RobustPolynomialFit> {
    let dispersion = spectrum.dispersion_slice();
    let flux = spectrum.flux_slice();
    let n = dispersion.len();

    let mut keep: Vec<bool> = dispersion
        .iter()
        .zip(flux)
        .map(|(d, f)| d.is_finite() && f.is_finite())
        .collect();
    let domain = Domain::spanning(dispersion);
    let terms = order + 1;

    let mut coefficients = None;
    let mut rms = f64::NAN;
    for _ in 0..ROBUST_POLY_MAX_ITERATIONS {
        let used: Vec<usize> = (0..n).filter(|&i| keep[i]).collect();
        if used.len() <= order {
            break;
        }
        let rows: Vec<Vec<f64>> = used
            .iter()
            .map(|&i| family_terms(Family::Power, domain.map(dispersion[i]), terms))
            .collect();
        let y: Vec<f64> = used.iter().map(|&i| flux[i]).collect();
        let Some(coef) = weighted_lstsq(&rows, &y, &vec![1.0; used.len()]) else {
            break;
        };

        let residual: Vec<f64> = rows.iter().zip(&y).map(|(r, v)| v - dot(r, &coef)).collect();
        rms = (residual.iter().map(|r| r * r).sum::<f64>() / residual.len() as f64).sqrt();
        coefficients = Some(coef);

        let mut rejected = 0;
        for (&i, r) in used.iter().zip(&residual) {
            if r.abs() > ROBUST_POLY_CLIP_SIGMA * rms {
                keep[i] = false;
                rejected += 1;
            }
        }
        if rejected == 0 {
            break;
        }
    }

    let continuum = match &coefficients {
        Some(coef) => Array1::from_iter(
            dispersion
                .iter()
                .map(|&d| dot(&family_terms(Family::Power, domain.map(d), terms), coef)),
        ),
        None => {
            tracing::warn!(order, "Too few finite points for robust polynomial continuum");
            rms = f64::NAN;
            Array1::from_elem(n, f64::NAN)
        }
    };

    let normalized = Spectrum::new(
        spectrum.dispersion().clone(),
        spectrum.flux() / &continuum,
        &continuum * &continuum * spectrum.ivar(),
        spectrum.metadata.clone(),
    )?;
    Ok(RobustPolynomialFit {
        normalized,
        continuum,
        rms,
    })
}

/// Parameters of [`fit_knot_rejection`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnotRejectionConfig {
    /// Spacing between interior knots, in wavelength units.
    pub knot_spacing: f64,
    /// Place this many evenly spaced knots instead of using the spacing.
    pub knot_count: Option<usize>,
    pub spline_order: usize,
    /// Pixels within this many sigma of the knot polyline count as continuum.
    pub sigma_clip: f64,
    /// Knots whose neighbourhood holds a smaller continuum fraction are dropped.
    pub knot_reject_threshold: f64,
    pub max_iterations: usize,
}

impl Default for KnotRejectionConfig {
    fn default() -> Self {
        Self {
            knot_spacing: 5.0,
            knot_count: None,
            spline_order: 2,
            sigma_clip: 1.5,
            knot_reject_threshold: 0.7,
            max_iterations: 5,
        }
    }
}

/// Outcome of [`fit_knot_rejection`].
#[derive(Clone, Debug)]
pub struct KnotRejectionFit {
    /// Spline continuum over the full input; NaN if no fit was possible.
    pub continuum: Array1<f64>,
    /// Surviving knots and their running-median values.
    pub knots: Vec<f64>,
    pub knot_values: Vec<f64>,
    /// Pixels treated as continuum in the final pass.
    pub good: Vec<bool>,
}

impl KnotRejectionFit {
    pub fn is_failure(&self) -> bool {
        self.continuum.iter().all(|c| c.is_nan())
    }
}

fn initial_knots(dispersion: &[f64], config: &KnotRejectionConfig) -> (Vec<f64>, f64) {
    let (Some(&lo), Some(&hi)) = (dispersion.first(), dispersion.last()) else {
        return (Vec::new(), config.knot_spacing);
    };
    match config.knot_count {
        Some(count) => {
            let step = (hi - lo) / (count + 1) as f64;
            ((1..=count).map(|k| lo + k as f64 * step).collect(), step)
        }
        None => {
            let spacing = config.knot_spacing;
            let count = ((hi - lo) / spacing).floor().max(0.0) as usize;
            let first = lo + ((hi - lo) - count as f64 * spacing) / 2.0;
            ((0..count).map(|k| first + k as f64 * spacing).collect(), spacing)
        }
    }
}

/// Extend the polyline through `(xs, ys)` linearly past both end knots.
fn polyline(x: &[f64], xs: &[f64], ys: &[f64]) -> Vec<f64> {
    if xs.len() < 2 {
        let level = ys.first().copied().unwrap_or(f64::NAN);
        return vec![level; x.len()];
    }
    let last = xs.len() - 1;
    let slope = |a: usize, b: usize| (ys[b] - ys[a]) / (xs[b] - xs[a]);
    let (low_slope, high_slope) = (slope(0, 1), slope(last - 1, last));
    interp(x, xs, ys, f64::NAN, f64::NAN)
        .into_iter()
        .zip(x)
        .map(|(v, &xi)| {
            if xi < xs[0] {
                ys[0] + (xi - xs[0]) * low_slope
            } else if xi > xs[last] {
                ys[last] + (xi - xs[last]) * high_slope
            } else {
                v
            }
        })
        .collect()
}

/// Centred moving average over an odd window, zero outside the array.
fn moving_fraction(good: &[bool], window: usize) -> Vec<f64> {
    let half = window / 2;
    let n = good.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n.saturating_sub(1));
            good[lo..=hi].iter().filter(|&&g| g).count() as f64 / window as f64
        })
        .collect()
}

/// Spline continuum through knots that are dropped when too few pixels
/// around them look like continuum.
///
/// Each pass assigns knot values from a running median whose window spans
/// one knot spacing. Pixels within `sigma_clip` of the polyline through the
/// knots are continuum, knots with a low continuum fraction around them are
/// removed, and a weighted least-squares spline is fitted to the continuum
/// pixels.
pub fn fit_knot_rejection(spectrum: &Spectrum, config: &KnotRejectionConfig) -> KnotRejectionFit {
    let x = spectrum.dispersion_slice();
    let y = spectrum.flux_slice();
    let w = spectrum.ivar_slice();
    let n = x.len();

    let (mut knots, spacing) = initial_knots(x, config);
    let mut window = (spacing / median_step(x)).max(1.0) as usize;
    if window % 2 == 0 {
        window += 1;
    }
    let smoothed = median_filter(y, window);

    let mut knot_values = Vec::new();
    let mut good = vec![false; n];
    let mut continuum = Array1::from_elem(n, f64::NAN);

    for iteration in 0..config.max_iterations {
        let at: Vec<usize> = knots
            .iter()
            .map(|&k| searchsorted(x, k).min(n.saturating_sub(1)))
            .collect();
        knot_values = at.iter().map(|&i| smoothed[i]).collect();

        let line = polyline(x, &knots, &knot_values);
        good = (0..n)
            .map(|i| ((y[i] - line[i]) * w[i].sqrt()).abs() < config.sigma_clip)
            .collect();

        let fraction = moving_fraction(&good, window);
        let keep: Vec<bool> = at
            .iter()
            .map(|&i| fraction[i] >= config.knot_reject_threshold)
            .collect();
        let rejected = keep.iter().filter(|&&k| !k).count();
        knots = knots.iter().zip(&keep).filter(|(_, &k)| k).map(|(&v, _)| v).collect();
        knot_values = knot_values.iter().zip(&keep).filter(|(_, &k)| k).map(|(&v, _)| v).collect();
        tracing::debug!(iteration, rejected, remaining = knots.len(), "Knot rejection pass");

        let used: Vec<usize> = (0..n).filter(|&i| good[i] && w[i].is_finite()).collect();
        let (Some(&first), Some(&last)) = (used.first(), used.last()) else {
            tracing::warn!("No continuum pixels left for knot-rejection fit");
            return KnotRejectionFit {
                continuum: Array1::from_elem(n, f64::NAN),
                knots,
                knot_values,
                good,
            };
        };

        let spline = BSpline::new(config.spline_order, x[first], x[last], &knots);
        let rows: Vec<Vec<f64>> = used.iter().map(|&i| spline.row(x[i])).collect();
        let values: Vec<f64> = used.iter().map(|&i| y[i]).collect();
        let weights: Vec<f64> = used.iter().map(|&i| w[i]).collect();
        continuum = match weighted_lstsq(&rows, &values, &weights) {
            Some(coef) => Array1::from_iter(x.iter().map(|&v| dot(&spline.row(v), &coef))),
            None => Array1::from_elem(n, f64::NAN),
        };
    }

    KnotRejectionFit {
        continuum,
        knots,
        knot_values,
        good,
    }
}
