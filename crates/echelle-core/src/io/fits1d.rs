use crate::consts::PLACEHOLDER_IVAR;
use crate::error::{EchelleError, Result};
use crate::io::fits::{FitsFile, Hdu};
use crate::io::reader::RawOrders;

const DISPERSION_COLUMNS: [&str; 3] = ["dispersion", "disp", "WAVELENGTH[COORD]"];
const FLUX_COLUMNS: [&str; 2] = ["flux", "SPECTRUM[FLUX]"];

fn first_column(hdu: &Hdu, names: &[&str]) -> Result<Vec<f64>> {
    names
        .iter()
        .find_map(|n| hdu.column(n))
        .map(|c| c.values.clone())
        .ok_or_else(|| {
            EchelleError::StructuralRead(format!("no column named any of {}", names.join(", ")))
        })
}

/// Single-order FITS: a binary table with named columns in the first
/// extension, or a linear-WCS primary image.
pub(crate) fn read_fits_spectrum1d(fits: &FitsFile) -> Result<RawOrders> {
    let metadata = fits.primary().header.clone();
    let first_with_data = fits.hdus.iter().position(Hdu::has_data);

    let (dispersion, flux, ivar) = if fits.len() == 2 && first_with_data == Some(1) {
        read_table(&fits.hdus[1])?
    } else {
        read_linear_image(fits)?
    };

    Ok(RawOrders {
        dispersion: vec![dispersion],
        flux: vec![flux],
        ivar: vec![ivar],
        metadata,
        order_numbers: Vec::new(),
    })
}

fn read_table(hdu: &Hdu) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let dispersion = first_column(hdu, &DISPERSION_COLUMNS)?;
    let flux = first_column(hdu, &FLUX_COLUMNS)?;

    let ivar = if let Some(c) = hdu.column("ivar") {
        c.values.clone()
    } else if let Some(c) = hdu.column("SPECTRUM[SIGMA]") {
        c.values.iter().map(|s| 1.0 / (s * s)).collect()
    } else if let Some(c) = hdu.column("variance") {
        c.values.iter().map(|v| 1.0 / v).collect()
    } else {
        return Err(EchelleError::StructuralRead(
            "no ivar, SPECTRUM[SIGMA] or variance column".into(),
        ));
    };
    Ok((dispersion, flux, ivar))
}

fn read_linear_image(fits: &FitsFile) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let primary = fits.primary();
    let header = &primary.header;
    let required = |key: &str| {
        header
            .get_f64(key)
            .ok_or_else(|| EchelleError::StructuralRead(format!("missing {key}")))
    };
    let crval = required("CRVAL1")?;
    let cdelt = required("CDELT1")?;
    let naxis = required("NAXIS1")? as usize;
    let crpix = header.get_f64("CRPIX1").unwrap_or(1.0);
    let ltv = header.get_f64("LTV1").unwrap_or(0.0);

    let dispersion: Vec<f64> = (0..naxis)
        .map(|i| crval + (i as f64 + 1.0 - crpix) * cdelt - ltv * cdelt)
        .collect();

    let flux = primary
        .image()
        .ok_or_else(|| EchelleError::StructuralRead("linear spectrum without data".into()))?
        .to_array1()?
        .to_vec();

    let ivar = if fits.len() == 1 {
        vec![PLACEHOLDER_IVAR; flux.len()]
    } else {
        fits.hdus[1]
            .image()
            .ok_or_else(|| EchelleError::StructuralRead("second HDU holds no ivar image".into()))?
            .to_array1()?
            .to_vec()
    };
    Ok((dispersion, flux, ivar))
}
