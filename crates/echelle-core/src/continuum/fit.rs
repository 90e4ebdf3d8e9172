use ndarray::Array1;

use crate::consts::{MAX_SPLINE_ORDER, POLYSINC_MAX_ITERATIONS, RESIDUAL_STD_RELATIVE_FLOOR};
use crate::continuum::basis::{dot, family_terms, weighted_lstsq, BSpline, Domain, Family};
use crate::continuum::config::{BasisFunction, ContinuumConfig};
use crate::continuum::knots::place_knots;
use crate::continuum::levmar::{levenberg_marquardt, sinc};
use crate::error::Result;
use crate::numeric::{finite_mean, finite_median, finite_std, searchsorted};
use crate::spectrum::Spectrum;

/// Outcome of a continuum fit.
///
/// A failed fit (too few usable points) is not an error: `normalized` then
/// holds NaN flux and ivar over the whole input, see [`FitResult::is_failure`].
#[derive(Clone, Debug)]
pub struct FitResult {
    /// Flux divided by the continuum, restricted to `left..=right`.
    pub normalized: Spectrum,
    /// Continuum over the full input; NaN outside `left..=right`.
    pub continuum: Array1<f64>,
    pub left: usize,
    pub right: usize,
    /// Number of fits performed.
    pub iterations: usize,
    pub knots: Vec<f64>,
    /// Pixels used in the final fit.
    pub mask: Vec<bool>,
}

impl FitResult {
    pub fn is_failure(&self) -> bool {
        self.normalized.flux().iter().all(|v| v.is_nan())
    }

    fn failure(spectrum: &Spectrum, left: usize, right: usize, knots: Vec<f64>, iterations: usize) -> Result<Self> {
        let n = spectrum.len();
        let nan = Array1::from_elem(n, f64::NAN);
        Ok(Self {
            normalized: Spectrum::new(
                spectrum.dispersion().clone(),
                nan.clone(),
                nan.clone(),
                spectrum.metadata.clone(),
            )?,
            continuum: nan,
            left,
            right,
            iterations,
            knots,
            mask: vec![false; n],
        })
    }
}

/// Pixels with finite flux and ivar and positive flux.
fn usable(flux: &[f64], ivar: &[f64]) -> Vec<bool> {
    flux.iter()
        .zip(ivar)
        .map(|(&f, &w)| f.is_finite() && w.is_finite() && f > 0.0)
        .collect()
}

/// Indices `lo <= d < hi` for each range.
fn range_mask(dispersion: &[f64], ranges: &[(f64, f64)]) -> Vec<bool> {
    let mut mask = vec![false; dispersion.len()];
    for &(lo, hi) in ranges {
        let (a, b) = (searchsorted(dispersion, lo), searchsorted(dispersion, hi));
        for m in mask.iter_mut().take(b).skip(a) {
            *m = true;
        }
    }
    mask
}

fn candidate_span(dispersion: &[f64], mask: &[bool]) -> Option<(f64, f64)> {
    let first = mask.iter().position(|&m| m)?;
    let last = mask.iter().rposition(|&m| m)?;
    Some((dispersion[first], dispersion[last]))
}

/// Knot positions for `spectrum` with the given exclusions applied.
pub fn knots_for_spectrum(spectrum: &Spectrum, knot_spacing: f64, exclude: &[(f64, f64)]) -> Vec<f64> {
    let dispersion = spectrum.dispersion_slice();
    let excluded = range_mask(dispersion, exclude);
    let mask: Vec<bool> = usable(spectrum.flux_slice(), spectrum.ivar_slice())
        .into_iter()
        .zip(excluded)
        .map(|(u, e)| u && !e)
        .collect();
    place_knots(dispersion, Some(knot_spacing), candidate_span(dispersion, &mask))
}

/// Fit the continuum with iterative asymmetric sigma clipping and divide it out.
pub fn fit_continuum(spectrum: &Spectrum, config: &ContinuumConfig) -> Result<FitResult> {
    let dispersion = spectrum.dispersion_slice();
    let flux = spectrum.flux_slice();
    let ivar = spectrum.ivar_slice();
    let n = spectrum.len();

    let finite_positive = usable(flux, ivar);
    let (Some(first_usable), Some(last_usable)) = (
        finite_positive.iter().position(|&m| m),
        finite_positive.iter().rposition(|&m| m),
    ) else {
        tracing::warn!("No finite positive flux, continuum fit failed");
        return FitResult::failure(spectrum, 0, n.saturating_sub(1), Vec::new(), 0);
    };
    let (mut left, mut right) = (first_usable, last_usable);

    let excluded = range_mask(dispersion, &config.exclude);
    let included = range_mask(dispersion, &config.include);
    let mut mask: Vec<bool> = (0..n)
        .map(|i| finite_positive[i] && (!excluded[i] || included[i]))
        .collect();

    // Exclusions covering an edge move the normalized range inwards. A failed
    // fit still reports the bounds of the usable flux.
    if !config.exclude.is_empty() {
        if let (Some(first), Some(last)) = (mask.iter().position(|&m| m), mask.iter().rposition(|&m| m)) {
            left = left.max(first);
            right = right.min(last);
        }
    }

    let order = match config.function {
        BasisFunction::Spline if config.order > MAX_SPLINE_ORDER => {
            tracing::warn!(
                order = config.order,
                max = MAX_SPLINE_ORDER,
                "Spline order too high, clamping"
            );
            MAX_SPLINE_ORDER
        }
        _ => config.order,
    };

    let knots = match config.function {
        BasisFunction::Spline => place_knots(dispersion, config.knot_spacing, candidate_span(dispersion, &mask)),
        _ => Vec::new(),
    };

    let mut continuum = Vec::new();
    let mut iterations = 0;
    for _ in 0..config.max_iterations.max(1) {
        let candidates: Vec<usize> = (0..n).filter(|&i| mask[i]).collect();
        if candidates.len() <= order {
            tracing::warn!(
                points = candidates.len(),
                order,
                "Too few points for continuum fit"
            );
            return FitResult::failure(spectrum, first_usable, last_usable, knots, iterations);
        }

        let (x, y, w) = fit_points(&candidates, dispersion, flux, ivar, config);
        iterations += 1;
        continuum = match evaluate_fit(config.function, order, &knots, &x, &y, &w, dispersion) {
            Some(c) => c,
            None => {
                tracing::warn!(function = %config.function, "Continuum least-squares solve failed");
                return FitResult::failure(spectrum, first_usable, last_usable, knots, iterations);
            }
        };

        let difference: Vec<f64> = continuum.iter().zip(flux).map(|(c, f)| c - f).collect();
        let finite_difference: Vec<f64> = difference
            .iter()
            .zip(flux)
            .filter(|(_, f)| f.is_finite())
            .map(|(d, _)| *d)
            .collect();
        let std = finite_std(&finite_difference);
        let scale = finite_mean(candidates.iter().map(|&i| flux[i].abs()));
        if !(std > RESIDUAL_STD_RELATIVE_FLOOR * scale) {
            break;
        }

        let mut rejected = 0;
        for &i in &candidates {
            let sigma = difference[i] / std;
            if !included[i] && (sigma > config.high_sigma_clip || sigma < -config.low_sigma_clip) {
                mask[i] = false;
                rejected += 1;
            }
        }
        tracing::debug!(iteration = iterations, rejected, std, "Continuum clip pass");
        if rejected == 0 {
            break;
        }
    }

    let continuum: Vec<f64> = continuum.into_iter().map(|c| c * config.scale).collect();
    let range = left..=right;
    let normalized = Spectrum::new(
        Array1::from_iter(range.clone().map(|i| dispersion[i])),
        Array1::from_iter(range.clone().map(|i| flux[i] / continuum[i])),
        Array1::from_iter(range.clone().map(|i| continuum[i] * ivar[i] * continuum[i])),
        spectrum.metadata.clone(),
    )?;
    let continuum = Array1::from_iter(
        continuum
            .iter()
            .enumerate()
            .map(|(i, &c)| if range.contains(&i) { c } else { f64::NAN }),
    );

    tracing::info!(
        function = %config.function,
        iterations,
        points = mask.iter().filter(|&&m| m).count(),
        "Continuum fit converged"
    );
    Ok(FitResult {
        normalized,
        continuum,
        left,
        right,
        iterations,
        knots,
        mask,
    })
}

/// Candidate points plus the synthetic points, sorted by wavelength.
fn fit_points(
    candidates: &[usize],
    dispersion: &[f64],
    flux: &[f64],
    ivar: &[f64],
    config: &ContinuumConfig,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut x: Vec<f64> = candidates.iter().map(|&i| dispersion[i]).collect();
    let mut y: Vec<f64> = candidates.iter().map(|&i| flux[i]).collect();
    let mut w: Vec<f64> = candidates.iter().map(|&i| ivar[i]).collect();

    let median_weight = finite_median(w.iter().copied());
    for point in &config.additional_points {
        let at = searchsorted(&x, point.wavelength);
        x.insert(at, point.wavelength);
        y.insert(at, point.flux);
        w.insert(at, median_weight * point.weight);
    }
    (x, y, w)
}

/// Fit the basis to `(x, y, w)` and evaluate it on `grid`.
fn evaluate_fit(
    function: BasisFunction,
    order: usize,
    knots: &[f64],
    x: &[f64],
    y: &[f64],
    w: &[f64],
    grid: &[f64],
) -> Option<Vec<f64>> {
    let family = match function {
        BasisFunction::Spline => {
            let lo = x.first().copied()?;
            let hi = x.last().copied()?;
            let spline = BSpline::new(order, lo, hi, knots);
            let rows: Vec<Vec<f64>> = x.iter().map(|&v| spline.row(v)).collect();
            let coef = weighted_lstsq(&rows, y, w)?;
            return Some(grid.iter().map(|&g| dot(&spline.row(g), &coef)).collect());
        }
        BasisFunction::Polysinc => return fit_polysinc(order, x, y, w, grid),
        BasisFunction::Polynomial => Family::Power,
        BasisFunction::Legendre => Family::Legendre,
        BasisFunction::Chebyshev => Family::Chebyshev,
    };

    let domain = Domain::spanning(x);
    let terms = order + 1;
    let rows: Vec<Vec<f64>> = x
        .iter()
        .map(|&v| family_terms(family, domain.map(v), terms))
        .collect();
    let coef = weighted_lstsq(&rows, y, w)?;
    Some(
        grid.iter()
            .map(|&g| dot(&family_terms(family, domain.map(g), terms), &coef))
            .collect(),
    )
}

fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// `A sinc^2((x - c) / s) * poly(u)` with `poly` of `order` coefficients on
/// the mapped domain. The sinc envelope is fitted first on its own.
fn fit_polysinc(order: usize, x: &[f64], y: &[f64], w: &[f64], grid: &[f64]) -> Option<Vec<f64>> {
    let envelope = |v: f64, p: &[f64]| p[0] * sinc((v - p[1]) / p[2]).powi(2);
    let start = vec![
        percentile(y, 95.0),
        finite_median(x.iter().copied()),
        percentile(x, 75.0) - percentile(x, 25.0),
    ];
    let unit = vec![1.0; x.len()];
    let sinc_params = levenberg_marquardt(&envelope, x, y, &unit, start, POLYSINC_MAX_ITERATIONS)?;

    let domain = Domain::spanning(x);
    let model = |v: f64, p: &[f64]| {
        let poly = dot(&family_terms(Family::Power, domain.map(v), p.len() - 3), &p[3..]);
        envelope(v, p) * poly
    };
    let mut start = sinc_params;
    start.push(1.0);
    start.extend(std::iter::repeat(0.0).take(order.saturating_sub(1)));
    let params = levenberg_marquardt(&model, x, y, w, start, POLYSINC_MAX_ITERATIONS)?;

    let curve: Vec<f64> = grid.iter().map(|&g| model(g, &params)).collect();
    curve.iter().all(|c| c.is_finite()).then_some(curve)
}
