/// Speed of light in km/s, used to convert velocities to redshifts.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Maximum deviation (wavelength units) from a best-fit uniform grid for a
/// dispersion to be written with the compact linear encoding.
pub const LINEAR_DISPERSION_TOLERANCE: f64 = 1e-3;

/// Inverse variance assigned to inputs that carry no noise information
/// (two-column text, single-HDU linear images). Roughly S/N ~ 300.
pub const PLACEHOLDER_IVAR: f64 = 1e5;

/// Inverse variance assigned to non-positive flux pixels of multi-order
/// containers.
pub const NONPOSITIVE_FLUX_IVAR: f64 = 1e-12;

/// Width that each `WAT2_nnn` card value is padded to before concatenation.
pub const DEFAULT_WAT_CARD_WIDTH: usize = 68;

/// Default spline knot spacing in wavelength units.
pub const DEFAULT_KNOT_SPACING: f64 = 200.0;

/// Default lower sigma-clip threshold (residuals below -low are rejected).
pub const DEFAULT_LOW_SIGMA_CLIP: f64 = 1.0;

/// Default upper sigma-clip threshold (residuals above +high are rejected).
pub const DEFAULT_HIGH_SIGMA_CLIP: f64 = 0.2;

/// Default number of clip-and-refit iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// Default basis order (spline degree or polynomial degree).
pub const DEFAULT_CONTINUUM_ORDER: usize = 3;

/// Splines above this degree are clamped.
pub const MAX_SPLINE_ORDER: usize = 5;

/// Residual standard deviations below this fraction of the mean absolute flux
/// are treated as an exact fit and stop the clip loop.
pub const RESIDUAL_STD_RELATIVE_FLOOR: f64 = 1e-10;

/// Relative singular-value cutoff for least-squares solves.
pub const LSTSQ_SINGULAR_EPS: f64 = 1e-12;

/// Maximum Levenberg-Marquardt iterations for the sinc-squared basis.
pub const POLYSINC_MAX_ITERATIONS: usize = 500;

/// Minimum total sample count (orders x grid points) to resample orders in
/// parallel.
pub const PARALLEL_RESAMPLE_THRESHOLD: usize = 65_536;

/// Minimum order count to normalize orders in parallel.
pub const PARALLEL_ORDER_THRESHOLD: usize = 4;

/// Fractional slack when deciding whether a region's last grid point sits
/// closer than one step to the region's right edge.
pub const GRID_EDGE_SLACK: f64 = 1e-9;

/// Running-median window for signal-to-noise estimates.
pub const SNR_MEDIAN_WINDOW: usize = 51;

/// Tuning constant of the biweight scale.
pub const BIWEIGHT_TUNING: f64 = 9.0;

/// Residuals beyond this many RMS are rejected by the robust polynomial fit.
pub const ROBUST_POLY_CLIP_SIGMA: f64 = 3.0;

/// Maximum reject-and-refit passes of the robust polynomial fit.
pub const ROBUST_POLY_MAX_ITERATIONS: usize = 10;
