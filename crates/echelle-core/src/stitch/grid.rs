use crate::consts::GRID_EDGE_SLACK;
use crate::error::{EchelleError, Result};
use crate::spectrum::Spectrum;

/// Wavelength coverage and sampling of one order.
#[derive(Clone, Copy, Debug)]
struct Coverage {
    min: f64,
    max: f64,
    step: f64,
}

/// Build a common dispersion grid for a set of orders.
///
/// Every order's end points split the full range into regions. Each region
/// covered by at least one order is sampled uniformly at the finest median
/// pixel spacing among the orders covering it; regions nobody covers are
/// left out.
pub fn common_dispersion(spectra: &[Spectrum]) -> Result<Vec<f64>> {
    if spectra.is_empty() {
        return Err(EchelleError::EmptySequence);
    }

    let coverage: Vec<Coverage> = spectra
        .iter()
        .filter_map(|s| {
            let (min, max) = s.wavelength_range()?;
            Some(Coverage {
                min,
                max,
                step: s.median_pixel_spacing(),
            })
        })
        .collect();

    let mut edges: Vec<f64> = coverage.iter().flat_map(|c| [c.min, c.max]).collect();
    edges.sort_unstable_by(|a, b| a.total_cmp(b));
    edges.dedup();

    let mut grid = Vec::new();
    for region in edges.windows(2) {
        let (left, right) = (region[0], region[1]);
        let step = coverage
            .iter()
            .filter(|c| !(c.max <= left || c.min >= right))
            .map(|c| c.step)
            .filter(|s| s.is_finite() && *s > 0.0)
            .fold(f64::INFINITY, f64::min);
        if !step.is_finite() {
            tracing::debug!(left, right, "Skipping region without coverage");
            continue;
        }

        let count = ((right - left) / step).ceil() as usize;
        let mut points: Vec<f64> = (0..count).map(|k| left + k as f64 * step).collect();
        if let Some(&last) = points.last() {
            if right - last < step * (1.0 - GRID_EDGE_SLACK) {
                points.pop();
            }
        }
        grid.extend(points);
    }

    validate_grid(&grid)?;
    Ok(grid)
}

/// Ensure a grid is strictly increasing.
pub fn validate_grid(grid: &[f64]) -> Result<()> {
    match grid.windows(2).position(|w| !(w[1] > w[0])) {
        Some(i) => Err(EchelleError::NonContiguousGrid { index: i + 1 }),
        None => Ok(()),
    }
}
