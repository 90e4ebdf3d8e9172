pub mod ascii;
pub mod cube;
pub mod fingerprint;
pub mod fits;
pub mod fits1d;
pub mod fits_writer;
pub mod mike;
pub mod multispec;
pub mod reader;
pub mod writer;

pub use cube::write_order_cube;
pub use reader::{read_spectrum, ReadOutcome, ReadStrategy, ReaderOptions, StrategyFailure};
pub use writer::{write_linear_flux, write_spectrum, OutputFormat, WriteOptions};
