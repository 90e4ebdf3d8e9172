use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::LINEAR_DISPERSION_TOLERANCE;
use crate::error::{EchelleError, Result};
use crate::io::fits_writer::{write_fits, OutputHdu};
use crate::spectrum::{MetaValue, Metadata, Spectrum};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Replace an existing file.
    pub overwrite: bool,
    /// Write the spectrum's metadata as header cards (FITS only).
    pub include_metadata: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            include_metadata: false,
        }
    }
}

/// Encoding chosen for a spectrum on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    LinearFits,
    TableFits,
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LinearFits => write!(f, "linear FITS image"),
            Self::TableFits => write!(f, "FITS binary table"),
            Self::Text => write!(f, "text columns"),
        }
    }
}

/// Uniform grid `(start, step)` matching the dispersion within tolerance.
///
/// The grid starts at the first sample with the mean pixel step.
pub fn linear_solution(dispersion: &[f64]) -> Option<(f64, f64)> {
    let (&first, &last) = (dispersion.first()?, dispersion.last()?);
    if dispersion.len() < 2 {
        return None;
    }
    let step = (last - first) / (dispersion.len() - 1) as f64;
    let max_dev = dispersion
        .iter()
        .enumerate()
        .map(|(i, d)| (first + i as f64 * step - d).abs())
        .fold(0.0, f64::max);
    (max_dev <= LINEAR_DISPERSION_TOLERANCE).then_some((first, step))
}

fn is_fits_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("fits") || e.eq_ignore_ascii_case("fit"))
}

/// Format [`write_spectrum`] would use for this path and spectrum.
pub fn output_format(path: &Path, spectrum: &Spectrum) -> OutputFormat {
    if !is_fits_path(path) {
        OutputFormat::Text
    } else if linear_solution(spectrum.dispersion_slice()).is_some() {
        OutputFormat::LinearFits
    } else {
        OutputFormat::TableFits
    }
}

/// Write a spectrum as linear FITS, a FITS binary table, or text.
pub fn write_spectrum(path: &Path, spectrum: &Spectrum, options: &WriteOptions) -> Result<OutputFormat> {
    if path.exists() && !options.overwrite {
        return Err(EchelleError::Write(format!(
            "{} already exists and overwrite is disabled",
            path.display()
        )));
    }

    let format = output_format(path, spectrum);
    let mut header = if options.include_metadata {
        spectrum.metadata.clone()
    } else {
        Metadata::new()
    };

    match format {
        OutputFormat::Text => {
            if options.include_metadata {
                tracing::warn!(path = %path.display(), "Text output cannot carry metadata");
            }
            write_text(path, spectrum)?;
        }
        OutputFormat::LinearFits => {
            let (start, step) = linear_solution(spectrum.dispersion_slice())
                .ok_or_else(|| EchelleError::Write("dispersion is not linear".into()))?;
            set_linear_wcs(&mut header, start, step);
            let n = spectrum.len();
            write_fits(
                path,
                &[
                    OutputHdu::image(vec![n], spectrum.flux().to_vec()).with_header(header),
                    OutputHdu::image(vec![n], spectrum.ivar().to_vec()),
                ],
            )?;
        }
        OutputFormat::TableFits => {
            let sigma = spectrum.ivar().iter().map(|w| w.powf(-0.5)).collect();
            let table = OutputHdu::table(vec![
                ("WAVELENGTH[COORD]".to_string(), spectrum.dispersion().to_vec()),
                ("SPECTRUM[FLUX]".to_string(), spectrum.flux().to_vec()),
                ("SPECTRUM[SIGMA]".to_string(), sigma),
            ])
            .with_header(header);
            write_fits(path, &[table])?;
        }
    }

    tracing::debug!(path = %path.display(), ?format, "Wrote spectrum");
    Ok(format)
}

fn set_linear_wcs(header: &mut Metadata, start: f64, step: f64) {
    header.insert("CTYPE1", MetaValue::from("LINEAR"));
    header.insert("CRVAL1", start);
    header.insert("CRPIX1", 1i64);
    header.insert("CDELT1", step);
}

fn write_text(path: &Path, spectrum: &Spectrum) -> Result<()> {
    let min_ivar = spectrum.ivar().iter().copied().fold(f64::INFINITY, f64::min);
    let precision = if min_ivar > 1e-12 && min_ivar < 1e-4 { 12 } else { 4 };

    let mut w = BufWriter::new(File::create(path)?);
    for ((d, f), i) in spectrum
        .dispersion()
        .iter()
        .zip(spectrum.flux())
        .zip(spectrum.ivar())
    {
        writeln!(w, "{d:.precision$} {f:.precision$} {i:.precision$}")?;
    }
    w.flush()?;
    Ok(())
}

/// Write a bare linearly-sampled flux image.
pub fn write_linear_flux(path: &Path, start: f64, step: f64, flux: &[f64]) -> Result<()> {
    let mut header = Metadata::new();
    set_linear_wcs(&mut header, start, step);
    write_fits(
        path,
        &[OutputHdu::image(vec![flux.len()], flux.to_vec()).with_header(header)],
    )
}
