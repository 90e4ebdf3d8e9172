//! Magellan/MIKE products reduced with CarPy.
//!
//! These are seven-band multispec containers whose orders are numbered by
//! `ECORD0`, `ECORD1`, ... cards. Bands, zero-indexed: sky, object, noise,
//! signal-to-noise, lamp, flat, object divided by the normalised flat.

use ndarray::{Array2, Axis};

use crate::consts::SNR_MEDIAN_WINDOW;
use crate::error::{EchelleError, Result};
use crate::io::fits::FitsFile;
use crate::io::multispec::{order_dispersions, order_mappings, require_multispec};
use crate::io::reader::{RawOrders, ReaderOptions};
use crate::numeric::estimate_snr;
use crate::spectrum::Metadata;

const MIKE_BANDS: usize = 7;
const OBJECT_BAND: usize = 1;
const NOISE_BAND: usize = 2;
const FLAT_DIVIDED_BAND: usize = 6;

/// `ECORD0`, `ECORD1`, ... until the first missing card.
fn order_numbers(header: &Metadata) -> Vec<i64> {
    (0..)
        .map(|i| header.get(&format!("ECORD{i}")).and_then(|v| v.as_i64()))
        .take_while(Option::is_some)
        .flatten()
        .collect()
}

/// Per-order inverse variance for the selected flux band.
///
/// The object band takes `noise^-2`, the flat-divided band folds the flat
/// back into the noise, and any other band gets a constant `snr^2` estimated
/// from its own scatter.
fn band_ivar(cube: &ndarray::Array3<f64>, flux_band: usize) -> Array2<f64> {
    let band = |i: usize| cube.index_axis(Axis(0), i);
    let mut ivar = match flux_band {
        OBJECT_BAND => band(NOISE_BAND).mapv(|n| n.powi(-2)),
        FLAT_DIVIDED_BAND => {
            let flat = &band(OBJECT_BAND) / &band(FLAT_DIVIDED_BAND);
            (&flat / &band(NOISE_BAND)).mapv(|v| v * v)
        }
        other => {
            let flux = band(other);
            let mut ivar = Array2::<f64>::zeros(flux.dim());
            for (mut row, order) in ivar.outer_iter_mut().zip(flux.outer_iter()) {
                let snr = estimate_snr(&order.to_vec(), SNR_MEDIAN_WINDOW);
                row.fill(snr * snr);
            }
            ivar
        }
    };
    ivar.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });
    ivar
}

pub(crate) fn read_mike(fits: &FitsFile, options: &ReaderOptions) -> Result<RawOrders> {
    let header = require_multispec(fits)?;
    let numbers = order_numbers(header);
    if numbers.is_empty() {
        return Err(EchelleError::StructuralRead("no ECORD order numbers".into()));
    }

    let cube = fits
        .primary()
        .image()
        .filter(|img| img.ndim() == 3)
        .ok_or_else(|| EchelleError::StructuralRead("MIKE product needs 3-D data".into()))?
        .to_array3()?;
    let (bands, orders, pixels) = cube.dim();
    if bands != MIKE_BANDS {
        return Err(EchelleError::StructuralRead(format!(
            "MIKE product has {bands} bands, expected {MIKE_BANDS}"
        )));
    }
    if numbers.len() != orders {
        return Err(EchelleError::StructuralRead(format!(
            "{} ECORD cards for {orders} orders",
            numbers.len()
        )));
    }

    let flux_band = options.flux_band.unwrap_or(OBJECT_BAND);
    if flux_band >= MIKE_BANDS {
        return Err(EchelleError::StructuralRead(format!(
            "flux band {flux_band} outside the {MIKE_BANDS} MIKE bands"
        )));
    }
    tracing::info!(orders, flux_band, "Recognised MIKE product");

    let mappings = order_mappings(header, options.card_width)?;
    let dispersion = if mappings.is_empty() {
        vec![(0..pixels).map(|p| p as f64).collect(); orders]
    } else {
        order_dispersions(&mappings, orders, pixels)?
    };

    let ivar = band_ivar(&cube, flux_band);
    let flux = cube.index_axis(Axis(0), flux_band);
    let trimmed = |rows: Vec<Vec<f64>>| -> Vec<Vec<f64>> {
        rows.into_iter()
            .zip(&dispersion)
            .map(|(mut r, d)| {
                r.truncate(d.len());
                r
            })
            .collect()
    };
    let flux = trimmed(flux.outer_iter().map(|r| r.to_vec()).collect());
    let ivar = trimmed(ivar.outer_iter().map(|r| r.to_vec()).collect());

    Ok(RawOrders {
        dispersion,
        flux,
        ivar,
        metadata: header.clone(),
        order_numbers: numbers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_stop_at_first_gap() {
        let mut header = Metadata::new();
        header.insert("ECORD0", 71i64);
        header.insert("ECORD1", 70i64);
        header.insert("ECORD3", 68i64);
        assert_eq!(order_numbers(&header), vec![71, 70]);
    }
}
