//! Small array helpers shared by the reader, fitter and stitcher.

use crate::consts::BIWEIGHT_TUNING;

/// Index of the first element of sorted `a` that is not less than `v`.
pub fn searchsorted(a: &[f64], v: f64) -> usize {
    a.partition_point(|&x| x < v)
}

/// Piecewise-linear interpolation of `(xp, fp)` evaluated at every `x`.
///
/// `xp` must be strictly increasing. Positions below `xp[0]` take `left`,
/// positions above the last sample take `right`; the end points themselves
/// map exactly onto `fp`.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64], left: f64, right: f64) -> Vec<f64> {
    debug_assert_eq!(xp.len(), fp.len());
    let n = xp.len();
    if n == 0 {
        return vec![left; x.len()];
    }
    let last = n - 1;

    x.iter()
        .map(|&xi| {
            if xi.is_nan() {
                return f64::NAN;
            }
            if xi < xp[0] {
                return left;
            }
            if xi > xp[last] {
                return right;
            }
            if xi == xp[last] {
                return fp[last];
            }
            let j = xp.partition_point(|&v| v <= xi);
            let (x0, x1) = (xp[j - 1], xp[j]);
            let t = (xi - x0) / (x1 - x0);
            fp[j - 1] + t * (fp[j] - fp[j - 1])
        })
        .collect()
}

/// Like [`interp`], but positions outside `xp` take the nearest end value.
pub fn interp_clamped(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    match (fp.first(), fp.last()) {
        (Some(&first), Some(&last)) => interp(x, xp, fp, first, last),
        _ => vec![f64::NAN; x.len()],
    }
}

/// Mean of the finite values, or NaN when there are none.
pub fn finite_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population standard deviation of the finite values, or NaN when empty.
pub fn finite_std(values: &[f64]) -> f64 {
    let mean = finite_mean(values.iter().copied());
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), &v| (s + (v - mean) * (v - mean), c + 1));
    (sum / count as f64).sqrt()
}

/// Median of the finite values, or NaN when there are none.
pub fn finite_median(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median spacing between consecutive samples.
pub fn median_step(x: &[f64]) -> f64 {
    finite_median(x.windows(2).map(|w| w[1] - w[0]))
}

/// Running median over an odd `window`, zero-padded at both ends.
pub fn median_filter(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1) | 1;
    let half = window / 2;
    let n = values.len();
    let mut buffer = Vec::with_capacity(window);
    (0..n)
        .map(|i| {
            buffer.clear();
            for j in i as isize - half as isize..=(i + half) as isize {
                let v = if j < 0 || j as usize >= n { 0.0 } else { values[j as usize] };
                buffer.push(v);
            }
            buffer.sort_unstable_by(|a, b| a.total_cmp(b));
            buffer[half]
        })
        .collect()
}

/// Tukey biweight scale of the finite values, tuning constant `c`.
///
/// Returns 0 when the median absolute deviation vanishes and NaN when there
/// are no finite values.
pub fn biweight_scale(values: &[f64], c: f64) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    let center = finite_median(finite.iter().copied());
    let mad = finite_median(finite.iter().map(|v| (v - center).abs()));
    if mad == 0.0 {
        return 0.0;
    }

    let (mut numerator, mut denominator) = (0.0, 0.0);
    for &v in &finite {
        let d = v - center;
        let u = d / (c * mad);
        if u.abs() < 1.0 {
            let u2 = u * u;
            numerator += d * d * (1.0 - u2).powi(4);
            denominator += (1.0 - u2) * (1.0 - 5.0 * u2);
        }
    }
    (finite.len() as f64).sqrt() * numerator.sqrt() / denominator.abs()
}

/// Signal-to-noise from the biweight scatter of flux about its running median.
pub fn estimate_snr(flux: &[f64], window: usize) -> f64 {
    let continuum = median_filter(flux, window);
    let ratio: Vec<f64> = flux.iter().zip(&continuum).map(|(f, c)| f / c).collect();
    1.0 / biweight_scale(&ratio, BIWEIGHT_TUNING)
}
