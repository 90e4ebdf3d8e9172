use ndarray::{Array2, Axis};

use crate::consts::NONPOSITIVE_FLUX_IVAR;
use crate::dispersion::{split_wat_specs, DispersionMapping};
use crate::error::{EchelleError, Result};
use crate::io::fingerprint::{self, Fingerprint, IvarRule, CARPY_FLAT_CORRECTED_BAND};
use crate::io::fits::FitsFile;
use crate::io::reader::{ReaderOptions, RawOrders};
use crate::spectrum::{MetaValue, Metadata};

/// Metadata flag set when band semantics could not be identified.
pub const BANDS_UNIDENTIFIED_KEY: &str = "bands_unidentified";

fn is_multispec(header: &Metadata) -> bool {
    let ctype = header
        .get_str("CTYPE1")
        .is_some_and(|c| c.to_uppercase().starts_with("MULTISPE"));
    let wat0 = header
        .get_str("WAT0_001")
        .is_some_and(|w| w.to_lowercase() == "system=multispec");
    ctype || wat0
}

/// Collect `WAT2_001`, `WAT2_002`, ... until the first missing card.
fn wat2_cards(header: &Metadata) -> Vec<String> {
    (1..)
        .map(|i| header.get(&format!("WAT2_{i:03}")))
        .take_while(Option::is_some)
        .flatten()
        .map(MetaValue::to_string)
        .collect()
}

pub(crate) fn order_mappings(header: &Metadata, card_width: usize) -> Result<Vec<DispersionMapping>> {
    split_wat_specs(&wat2_cards(header), card_width)
        .iter()
        .map(|s| DispersionMapping::parse(s))
        .collect()
}

/// Decode each order's dispersion, truncated to the data's pixel axis.
pub(crate) fn order_dispersions(mappings: &[DispersionMapping], orders: usize, pixels: usize) -> Result<Vec<Vec<f64>>> {
    if mappings.len() < orders {
        return Err(EchelleError::StructuralRead(format!(
            "{} dispersion mappings for {orders} orders",
            mappings.len()
        )));
    }
    mappings[..orders]
        .iter()
        .map(|m| {
            let mut d = m.decode()?;
            d.truncate(pixels);
            Ok(d)
        })
        .collect()
}

pub(crate) fn require_multispec(fits: &FitsFile) -> Result<&Metadata> {
    let header = &fits.primary().header;
    if !is_multispec(header) {
        return Err(EchelleError::StructuralRead("not a multispec container".into()));
    }
    Ok(header)
}

/// Multi-order container with per-order dispersion mappings and bands
/// resolved through the fingerprint table.
pub(crate) fn read_multispec(fits: &FitsFile, options: &ReaderOptions) -> Result<RawOrders> {
    let header = require_multispec(fits)?;
    let image = fits
        .primary()
        .image()
        .ok_or_else(|| EchelleError::StructuralRead("multispec without primary data".into()))?;

    let mut metadata = header.clone();
    let (flux, ivar) = match image.ndim() {
        1 | 2 => {
            // A single band carries no noise information.
            let flux = image.to_array2()?;
            let ivar = unidentified_ivar(&flux, &fingerprint::band_checksum(header), options, &mut metadata)?;
            (flux, ivar)
        }
        3 => {
            let cube = image.to_array3()?;
            let band = |i: usize| -> Result<Array2<f64>> {
                if i >= cube.len_of(Axis(0)) {
                    return Err(EchelleError::StructuralRead(format!(
                        "band {i} missing from {}-band container",
                        cube.len_of(Axis(0))
                    )));
                }
                Ok(cube.index_axis(Axis(0), i).to_owned())
            };

            match fingerprint::identify(header) {
                Fingerprint::Known { product, checksum } => {
                    let assignment = product.bands().ok_or_else(|| {
                        EchelleError::StructuralRead(format!("{product} is not a multispec layout"))
                    })?;
                    let assignment =
                        assignment.with_overrides(product, options.flux_band, options.noise_band);
                    let noise_band = assignment.noise_band.resolve(cube.len_of(Axis(0)));
                    tracing::info!(
                        %product,
                        checksum = %checksum,
                        flux_band = assignment.flux_band,
                        noise_band,
                        "Recognised band layout"
                    );

                    match assignment.rule {
                        IvarRule::InverseSquareNoise => {
                            let flux = band(assignment.flux_band)?;
                            let ivar = band(noise_band)?.mapv(|n| n.powi(-2));
                            (flux, ivar)
                        }
                        IvarRule::FlatCorrected => {
                            let corrected = band(CARPY_FLAT_CORRECTED_BAND)?;
                            let object = band(1)?;
                            let noise = band(2)?;
                            let flat = &object / &corrected;
                            let ivar = (&flat / &noise).mapv(|v| v * v);
                            (corrected, ivar)
                        }
                    }
                }
                Fingerprint::Unknown { checksum } => {
                    let flux = band(options.flux_band.unwrap_or(0))?;
                    let ivar = unidentified_ivar(&flux, &checksum, options, &mut metadata)?;
                    (flux, ivar)
                }
            }
        }
        n => {
            return Err(EchelleError::StructuralRead(format!(
                "multispec data with {n} axes"
            )))
        }
    };

    let (orders, pixels) = flux.dim();
    let mappings = order_mappings(header, options.card_width)?;
    let mut dispersion = order_dispersions(&mappings, orders, pixels)?;
    let mut flux: Vec<Vec<f64>> = flux.outer_iter().map(|r| r.to_vec()).collect();
    let mut ivar: Vec<Vec<f64>> = ivar.outer_iter().map(|r| r.to_vec()).collect();

    let first_min = dispersion.first().map(|d| slice_min(d));
    let last_min = dispersion.last().map(|d| slice_min(d));
    if let (Some(first), Some(last)) = (first_min, last_min) {
        if first > last {
            dispersion.reverse();
            flux.reverse();
            ivar.reverse();
        }
    }

    for (f, i) in flux.iter().zip(ivar.iter_mut()) {
        for (fv, iv) in f.iter().zip(i.iter_mut()) {
            if *fv <= 0.0 {
                *iv = NONPOSITIVE_FLUX_IVAR;
            }
        }
    }

    for ((d, f), i) in dispersion.iter().zip(flux.iter_mut()).zip(ivar.iter_mut()) {
        f.truncate(d.len());
        i.truncate(d.len());
    }

    Ok(RawOrders {
        dispersion,
        flux,
        ivar,
        metadata,
        order_numbers: Vec::new(),
    })
}

fn unidentified_ivar(
    flux: &Array2<f64>,
    checksum: &str,
    options: &ReaderOptions,
    metadata: &mut Metadata,
) -> Result<Array2<f64>> {
    if !options.allow_unidentified {
        return Err(EchelleError::UnidentifiedBands {
            checksum: checksum.to_string(),
        });
    }
    tracing::warn!(checksum, "Could not identify flux and noise bands, using NaN ivar");
    metadata.insert(BANDS_UNIDENTIFIED_KEY, true);
    Ok(Array2::from_elem(flux.dim(), f64::NAN))
}

fn slice_min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Single-band multispec without a noise band; ivar assumes Poisson noise.
pub(crate) fn read_legacy_multispec(fits: &FitsFile, options: &ReaderOptions) -> Result<RawOrders> {
    if fits.len() != 1 {
        return Err(EchelleError::StructuralRead(format!(
            "legacy multispec expects one HDU, found {}",
            fits.len()
        )));
    }
    let header = require_multispec(fits)?;
    let image = fits
        .primary()
        .image()
        .filter(|img| img.ndim() == 2)
        .ok_or_else(|| EchelleError::StructuralRead("legacy multispec needs 2-D data".into()))?;
    let flux = image.to_array2()?;
    let (orders, pixels) = flux.dim();

    let mappings = order_mappings(header, options.card_width)?;
    let dispersion = if mappings.is_empty() {
        vec![(0..pixels).map(|p| p as f64).collect(); orders]
    } else {
        order_dispersions(&mappings, orders, pixels)?
    };

    let mut flux: Vec<Vec<f64>> = flux.outer_iter().map(|r| r.to_vec()).collect();
    for (f, d) in flux.iter_mut().zip(&dispersion) {
        f.truncate(d.len());
    }
    let ivar = flux
        .iter()
        .map(|f| f.iter().map(|v| 1.0 / v).collect())
        .collect();

    Ok(RawOrders {
        dispersion,
        flux,
        ivar,
        metadata: header.clone(),
        order_numbers: Vec::new(),
    })
}
