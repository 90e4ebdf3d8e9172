pub mod combine;
pub mod grid;

pub use combine::{stitch_orders, Resampled, StitchConfig, StitchMethod, StitchOutput};
pub use grid::{common_dispersion, validate_grid};
