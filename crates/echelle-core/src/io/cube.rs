use std::path::Path;

use ndarray::{Array3, Axis};

use crate::error::{EchelleError, Result};
use crate::io::fingerprint::{self, Product, CUBE_BAND_IDS};
use crate::io::fits::FitsFile;
use crate::io::fits_writer::{write_fits, OutputHdu};
use crate::io::reader::RawOrders;
use crate::spectrum::{Metadata, Spectrum};

fn primary_cube(fits: &FitsFile) -> Result<Array3<f64>> {
    let cube = fits
        .primary()
        .image()
        .filter(|img| img.ndim() == 3)
        .ok_or_else(|| EchelleError::StructuralRead("expected a 3-D primary array".into()))?
        .to_array3()?;
    if cube.len_of(Axis(0)) < 3 {
        return Err(EchelleError::StructuralRead(format!(
            "cube has {} bands, need wavelength, flux and ivar",
            cube.len_of(Axis(0))
        )));
    }
    Ok(cube)
}

fn split_bands(cube: &Array3<f64>, reverse_orders: bool) -> RawOrders {
    let rows = |band: usize| -> Vec<Vec<f64>> {
        let mut rows: Vec<Vec<f64>> = cube
            .index_axis(Axis(0), band)
            .outer_iter()
            .map(|r| r.to_vec())
            .collect();
        if reverse_orders {
            rows.reverse();
        }
        rows
    };
    RawOrders {
        dispersion: rows(0),
        flux: rows(1),
        ivar: rows(2),
        metadata: Metadata::new(),
        order_numbers: Vec::new(),
    }
}

/// Wavelength/flux/ivar cube, as written by [`write_order_cube`].
pub(crate) fn read_wave_flux_ivar_cube(fits: &FitsFile) -> Result<RawOrders> {
    let header = &fits.primary().header;
    let fp = fingerprint::identify(header);
    if fp.product() != Some(Product::WaveFluxIvarCube) {
        return Err(EchelleError::StructuralRead(format!(
            "band checksum {} is not a wavelength/flux/ivar cube",
            fp.checksum()
        )));
    }

    let mut raw = split_bands(&primary_cube(fits)?, false);
    // Ragged orders are padded by repeating the last wavelength.
    for ((d, f), i) in raw
        .dispersion
        .iter_mut()
        .zip(raw.flux.iter_mut())
        .zip(raw.ivar.iter_mut())
    {
        let keep = 1 + d.windows(2).take_while(|w| w[1] > w[0]).count();
        let keep = keep.min(d.len());
        d.truncate(keep);
        f.truncate(keep);
        i.truncate(keep);
    }
    raw.metadata = header.clone();
    Ok(raw)
}

/// CERES pipeline output: bands 0/1/2 hold wavelength/flux/ivar, red orders first.
pub(crate) fn read_ceres(fits: &FitsFile) -> Result<RawOrders> {
    if fits.len() != 1 {
        return Err(EchelleError::StructuralRead(format!(
            "CERES product expects one HDU, found {}",
            fits.len()
        )));
    }
    let header = &fits.primary().header;
    match header.get_str("PIPELINE").map(str::trim) {
        Some("CERES") => {}
        other => {
            return Err(EchelleError::StructuralRead(format!(
                "PIPELINE is {other:?}, not CERES"
            )))
        }
    }

    let mut raw = split_bands(&primary_cube(fits)?, true);
    raw.metadata = header.clone();
    Ok(raw)
}

/// Write orders as a (wavelength, flux, ivar) x orders x pixels cube.
///
/// Shorter orders are padded with their last wavelength and zero flux and
/// ivar, which the cube reader strips again.
pub fn write_order_cube(path: &Path, orders: &[Spectrum]) -> Result<()> {
    if orders.is_empty() {
        return Err(EchelleError::EmptySequence);
    }
    let pixels = orders.iter().map(Spectrum::len).max().unwrap_or(0);
    let mut cube = Array3::<f64>::zeros((3, orders.len(), pixels));

    for (j, order) in orders.iter().enumerate() {
        let n = order.len();
        let last = order.dispersion().last().copied().unwrap_or(0.0);
        for p in 0..pixels {
            let (d, f, i) = if p < n {
                (order.dispersion()[p], order.flux()[p], order.ivar()[p])
            } else {
                (last, 0.0, 0.0)
            };
            cube[[0, j, p]] = d;
            cube[[1, j, p]] = f;
            cube[[2, j, p]] = i;
        }
    }

    let mut header = Metadata::new();
    for (i, id) in CUBE_BAND_IDS.iter().enumerate() {
        header.insert(format!("BANDID{}", i + 1), *id);
    }
    let shape = vec![3, orders.len(), pixels];
    let data = cube.into_raw_vec_and_offset().0;
    tracing::debug!(path = %path.display(), orders = orders.len(), pixels, "Writing order cube");
    write_fits(path, &[OutputHdu::image(shape, data).with_header(header)])
}
