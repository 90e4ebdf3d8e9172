pub mod basis;
pub mod config;
pub mod fit;
pub mod knots;
pub mod levmar;
pub mod robust;

pub use config::{AdditionalPoint, BasisFunction, ContinuumConfig};
pub use fit::{fit_continuum, knots_for_spectrum, FitResult};
pub use knots::place_knots;
pub use robust::{
    fit_knot_rejection, fit_robust_polynomial, KnotRejectionConfig, KnotRejectionFit, RobustPolynomialFit,
};
