//! Band-layout fingerprints of multi-band containers.
//!
//! The bands of a multi-order container do not say which one holds flux and
//! which one holds noise. The reduction pipeline that produced a file is
//! recognised from an MD5 checksum over its `BANDID*` header values, and a
//! closed table maps each known pipeline to its band assignment.

use std::fmt;

use md5::{Digest, Md5};

use crate::spectrum::Metadata;

/// Known producers of multi-band containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Product {
    CarpyMike,
    CarpyMikeOld,
    CarpyMage,
    DuPont,
    Iraf3Band,
    Iraf4Band,
    Apo,
    /// Matched on `OBSERVAT` only; the checksum is not in the table.
    Observatory(Observatory),
    /// Wavelength/flux/ivar cube written by [`crate::io::write_order_cube`].
    WaveFluxIvarCube,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observatory {
    Apo,
    McDonald,
}

/// Checksum table, in lookup order.
const CHECKSUMS: [(&str, Product); 7] = [
    ("0da149208a3c8ba608226544605ed600", Product::CarpyMike),
    ("e802331006006930ee0e60c7fbc66cec", Product::CarpyMikeOld),
    ("6b2c2ec1c4e1b122ccab15eb9bd305bc", Product::CarpyMage),
    ("2ab648afed96dcff5ccd10e5b45730c1", Product::DuPont),
    ("a4d8f6f51a7260fce1642f7b42012969", Product::Iraf3Band),
    ("30fdecbbc94c9393c73537eefb02efda", Product::Iraf4Band),
    ("8538046d98bf8a760b04690e53e394a1", Product::WaveFluxIvarCube),
];

/// APO band layout; only trusted on files whose `OBSERVAT` names an
/// observatory.
const APO_CHECKSUM: &str = "9d008ba2c3dc15549fd8ffe8a605ec15";

/// `BANDID` values written into wavelength/flux/ivar cubes.
pub const CUBE_BAND_IDS: [&str; 3] = ["wavelength array", "flux array", "ivar array"];

/// Band that holds the noise spectrum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoiseBand {
    Index(usize),
    Last,
}

impl NoiseBand {
    pub fn resolve(self, bands: usize) -> usize {
        match self {
            Self::Index(i) => i,
            Self::Last => bands.saturating_sub(1),
        }
    }
}

/// How flux and inverse variance are taken from the bands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IvarRule {
    /// `ivar = noise^-2`.
    InverseSquareNoise,
    /// Flux from the flat-divided band; `ivar = ((band1 / band6) / band2)^2`.
    FlatCorrected,
}

/// Flux/noise band selection for a recognised product.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandAssignment {
    pub flux_band: usize,
    pub noise_band: NoiseBand,
    pub rule: IvarRule,
}

/// CarPy band holding the object spectrum divided by the normalised flat.
pub const CARPY_FLAT_CORRECTED_BAND: usize = 6;
const CARPY_OBJECT_BAND: usize = 1;
const CARPY_NOISE_BAND: usize = 2;

impl BandAssignment {
    /// Apply caller overrides. CarPy products switch to the flat-corrected
    /// rule when flux is taken from band 6.
    pub fn with_overrides(self, product: Product, flux: Option<usize>, noise: Option<usize>) -> Self {
        let flux_band = flux.unwrap_or(self.flux_band);
        let noise_band = noise.map_or(self.noise_band, NoiseBand::Index);
        let rule = if product.is_carpy() && flux_band == CARPY_FLAT_CORRECTED_BAND {
            IvarRule::FlatCorrected
        } else {
            self.rule
        };
        Self {
            flux_band,
            noise_band,
            rule,
        }
    }
}

impl Product {
    pub fn is_carpy(self) -> bool {
        matches!(
            self,
            Self::CarpyMike | Self::CarpyMikeOld | Self::CarpyMage | Self::DuPont
        )
    }

    /// Default band assignment; `None` for layouts that carry ivar directly.
    pub fn bands(self) -> Option<BandAssignment> {
        let (flux_band, noise_band) = match self {
            Self::CarpyMike | Self::CarpyMikeOld | Self::CarpyMage | Self::DuPont => {
                (CARPY_OBJECT_BAND, NoiseBand::Index(CARPY_NOISE_BAND))
            }
            Self::Iraf3Band => (0, NoiseBand::Index(2)),
            Self::Iraf4Band | Self::Apo => (0, NoiseBand::Index(3)),
            Self::Observatory(_) => (0, NoiseBand::Last),
            Self::WaveFluxIvarCube => return None,
        };
        Some(BandAssignment {
            flux_band,
            noise_band,
            rule: IvarRule::InverseSquareNoise,
        })
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CarpyMike => write!(f, "CarPy MIKE"),
            Self::CarpyMikeOld => write!(f, "CarPy MIKE (old)"),
            Self::CarpyMage => write!(f, "CarPy MagE"),
            Self::DuPont => write!(f, "du Pont"),
            Self::Iraf3Band => write!(f, "IRAF 3-band"),
            Self::Iraf4Band => write!(f, "IRAF 4-band"),
            Self::Apo => write!(f, "APO"),
            Self::Observatory(Observatory::Apo) => write!(f, "APO (observatory)"),
            Self::Observatory(Observatory::McDonald) => write!(f, "McDonald (observatory)"),
            Self::WaveFluxIvarCube => write!(f, "wavelength/flux/ivar cube"),
        }
    }
}

/// Result of fingerprinting a header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fingerprint {
    Known { product: Product, checksum: String },
    Unknown { checksum: String },
}

impl Fingerprint {
    pub fn checksum(&self) -> &str {
        match self {
            Self::Known { checksum, .. } | Self::Unknown { checksum } => checksum,
        }
    }

    pub fn product(&self) -> Option<Product> {
        match self {
            Self::Known { product, .. } => Some(*product),
            Self::Unknown { .. } => None,
        }
    }
}

/// MD5 hex digest of the `;`-joined `BANDID*` values, in header order.
pub fn band_checksum(header: &Metadata) -> String {
    let joined = header
        .iter()
        .filter(|(k, _)| k.starts_with("BANDID"))
        .map(|(_, v)| v.to_string())
        .collect::<Vec<_>>()
        .join(";");
    checksum_of(&joined)
}

pub(crate) fn checksum_of(text: &str) -> String {
    let digest = Md5::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Identify the producing pipeline from the checksum, then the observatory.
pub fn identify(header: &Metadata) -> Fingerprint {
    identify_checksum(header, band_checksum(header))
}

fn identify_checksum(header: &Metadata, checksum: String) -> Fingerprint {
    if let Some(&(_, product)) = CHECKSUMS.iter().find(|(c, _)| *c == checksum) {
        return Fingerprint::Known { product, checksum };
    }

    let observatory = match header.get_str("OBSERVAT").map(str::trim) {
        Some("APO") => Some(Observatory::Apo),
        Some("MCDONALD") => Some(Observatory::McDonald),
        _ => None,
    };
    match observatory {
        Some(_) if checksum == APO_CHECKSUM => Fingerprint::Known {
            product: Product::Apo,
            checksum,
        },
        Some(obs) => Fingerprint::Known {
            product: Product::Observatory(obs),
            checksum,
        },
        None => Fingerprint::Unknown { checksum },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_band_ids_hash_to_table_entry() {
        let mut header = Metadata::new();
        for (i, id) in CUBE_BAND_IDS.iter().enumerate() {
            header.insert(format!("BANDID{}", i + 1), *id);
        }
        assert_eq!(band_checksum(&header), "8538046d98bf8a760b04690e53e394a1");
        assert_eq!(identify(&header).product(), Some(Product::WaveFluxIvarCube));
    }

    #[test]
    fn carpy_flux_band_six_switches_rule() {
        let bands = Product::CarpyMike
            .bands()
            .unwrap()
            .with_overrides(Product::CarpyMike, Some(6), None);
        assert_eq!(bands.rule, IvarRule::FlatCorrected);

        let bands = Product::Iraf3Band
            .bands()
            .unwrap()
            .with_overrides(Product::Iraf3Band, Some(6), None);
        assert_eq!(bands.rule, IvarRule::InverseSquareNoise);
    }

    #[test]
    fn apo_checksum_needs_observatory() {
        let lookup = |observat: Option<&str>| {
            let mut header = Metadata::new();
            if let Some(o) = observat {
                header.insert("OBSERVAT", o);
            }
            identify_checksum(&header, APO_CHECKSUM.to_string())
        };
        assert!(matches!(lookup(None), Fingerprint::Unknown { .. }));
        assert_eq!(lookup(Some("APO")).product(), Some(Product::Apo));
        assert_eq!(lookup(Some("MCDONALD")).product(), Some(Product::Apo));
    }

    #[test]
    fn observatory_fallback_uses_last_band() {
        let mut header = Metadata::new();
        header.insert("BANDID1", "something new");
        header.insert("OBSERVAT", "MCDONALD ");
        let fp = identify(&header);
        let bands = fp.product().and_then(Product::bands).unwrap();
        assert_eq!(bands.noise_band.resolve(5), 4);
    }
}
