pub mod consts;
pub mod continuum;
pub mod dispersion;
pub mod error;
pub mod io;
pub mod numeric;
pub mod pipeline;
pub mod spectrum;
pub mod stitch;

pub use error::{EchelleError, Result};
pub use spectrum::{MetaValue, Metadata, Redshift, Spectrum};
