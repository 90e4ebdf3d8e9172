#![allow(dead_code)]

use std::path::Path;

use echelle_core::io::fits_writer::{write_fits, OutputHdu};
use echelle_core::spectrum::{MetaValue, Metadata, Spectrum};

/// `start + i * step` for `i` in `0..n`.
pub fn linear_dispersion(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Linear grid with constant flux and ivar.
pub fn constant_spectrum(start: f64, step: f64, n: usize, flux: f64, ivar: f64) -> Spectrum {
    Spectrum::from_vecs(
        linear_dispersion(start, step, n),
        vec![flux; n],
        vec![ivar; n],
    )
    .unwrap()
}

/// Linear grid with flux computed from wavelength and constant ivar.
pub fn shaped_spectrum(start: f64, step: f64, n: usize, ivar: f64, f: impl Fn(f64) -> f64) -> Spectrum {
    let dispersion = linear_dispersion(start, step, n);
    let flux = dispersion.iter().map(|&d| f(d)).collect();
    Spectrum::from_vecs(dispersion, flux, vec![ivar; n]).unwrap()
}

/// Header of a multispec container with one `WAT2` card per order.
pub fn multispec_header(specs: &[&str]) -> Metadata {
    let mut header = Metadata::new();
    header.insert("CTYPE1", "MULTISPE");
    header.insert("WAT0_001", "system=multispec");
    header.insert("WAT1_001", "wtype=multispec label=Wavelength units=angstroms");
    for (i, spec) in specs.iter().enumerate() {
        let card = if i == 0 {
            format!("wtype=multispec spec{} = \"{spec}\"", i + 1)
        } else {
            format!("spec{} = \"{spec}\"", i + 1)
        };
        header.insert(format!("WAT2_{:03}", i + 1), card);
    }
    header
}

/// Write a (bands, orders, pixels) or (orders, pixels) multispec image.
pub fn write_multispec(path: &Path, header: Metadata, bands: &[Vec<Vec<f64>>]) {
    let orders = bands[0].len();
    let pixels = bands[0][0].len();
    let data: Vec<f64> = bands.iter().flatten().flatten().copied().collect();
    let shape = if bands.len() == 1 {
        vec![orders, pixels]
    } else {
        vec![bands.len(), orders, pixels]
    };
    write_fits(path, &[OutputHdu::image(shape, data).with_header(header)]).unwrap();
}

/// Headers mixing every value kind.
pub fn sample_metadata() -> Metadata {
    let mut m = Metadata::new();
    m.insert("OBJECT", "HD 122563");
    m.insert("EXPTIME", 1200.0);
    m.insert("NCOMBINE", 3i64);
    m.insert("FLIPPED", MetaValue::Bool(false));
    m
}
