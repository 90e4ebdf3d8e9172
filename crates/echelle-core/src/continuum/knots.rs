use crate::numeric::searchsorted;

/// Knots at fixed `spacing`, centred on the dispersion range and trimmed to
/// the wavelength span of the fit candidates.
///
/// The leftover `(range mod spacing)` is split between both ends; when that
/// leaves less than half a spacing, another half spacing is added.
pub fn place_knots(dispersion: &[f64], spacing: Option<f64>, span: Option<(f64, f64)>) -> Vec<f64> {
    let spacing = match spacing {
        Some(s) if s != 0.0 && s.is_finite() => s.abs(),
        _ => return Vec::new(),
    };
    let (Some(&first), Some(&last), Some((lo, hi))) = (dispersion.first(), dispersion.last(), span)
    else {
        return Vec::new();
    };

    let mut end = ((last - first) % spacing) / 2.0;
    if spacing / 2.0 > end {
        end += spacing / 2.0;
    }
    let start = first + end;
    let stop = last - end + spacing;
    let count = ((stop - start) / spacing).ceil().max(0.0) as usize;
    let mut knots: Vec<f64> = (0..count).map(|k| start + k as f64 * spacing).collect();

    if knots.last().is_some_and(|&k| k > hi) {
        knots.truncate(searchsorted(&knots, hi));
    }
    if knots.first().is_some_and(|&k| k < lo) {
        knots.drain(..searchsorted(&knots, lo));
    }
    knots
}
