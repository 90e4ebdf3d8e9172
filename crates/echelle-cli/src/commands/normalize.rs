use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use echelle_core::continuum::{fit_continuum, AdditionalPoint, BasisFunction, ContinuumConfig};
use echelle_core::io::{read_spectrum, write_spectrum, WriteOptions};

use super::info::ReaderArgs;

/// Parse a `lo:hi` wavelength range.
pub fn parse_range(s: &str) -> std::result::Result<(f64, f64), String> {
    let (lo, hi) = s
        .split_once(':')
        .ok_or_else(|| format!("expected LO:HI, got '{s}'"))?;
    let lo: f64 = lo.trim().parse().map_err(|e| format!("bad range start: {e}"))?;
    let hi: f64 = hi.trim().parse().map_err(|e| format!("bad range end: {e}"))?;
    if hi <= lo {
        return Err(format!("empty range '{s}'"));
    }
    Ok((lo, hi))
}

/// Parse a `wavelength:flux[:weight]` synthetic point; weight defaults to 1.
pub fn parse_point(s: &str) -> std::result::Result<AdditionalPoint, String> {
    let fields: Vec<&str> = s.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(format!("expected WAVELENGTH:FLUX[:WEIGHT], got '{s}'"));
    }
    let number = |field: &str, what: &str| {
        field
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("bad point {what}: {e}"))
    };
    Ok(AdditionalPoint {
        wavelength: number(fields[0], "wavelength")?,
        flux: number(fields[1], "flux")?,
        weight: fields.get(2).map_or(Ok(1.0), |w| number(w, "weight"))?,
    })
}

#[derive(Args, Clone)]
pub struct ContinuumArgs {
    /// Basis function (spline, poly, legendre, chebyshev, polysinc)
    #[arg(long, default_value = "spline")]
    pub function: BasisFunction,

    /// Spline knot spacing in wavelength units (0 for no interior knots)
    #[arg(long, default_value = "200")]
    pub knot_spacing: f64,

    /// Spline degree or polynomial degree
    #[arg(long, default_value = "3")]
    pub order: usize,

    /// Lower sigma-clip threshold
    #[arg(long, default_value = "1.0")]
    pub low_sigma: f64,

    /// Upper sigma-clip threshold
    #[arg(long, default_value = "0.2")]
    pub high_sigma: f64,

    /// Maximum number of fit iterations
    #[arg(long, default_value = "3")]
    pub max_iterations: usize,

    /// Wavelength range to exclude, as LO:HI (repeatable)
    #[arg(long, value_parser = parse_range)]
    pub exclude: Vec<(f64, f64)>,

    /// Wavelength range that is always fitted, as LO:HI (repeatable)
    #[arg(long, value_parser = parse_range)]
    pub include: Vec<(f64, f64)>,

    /// Multiplier applied to the fitted continuum
    #[arg(long, default_value = "1.0")]
    pub scale: f64,

    /// Synthetic point added to the fit, as WAVELENGTH:FLUX[:WEIGHT] (repeatable)
    #[arg(long = "add-point", value_parser = parse_point)]
    pub additional_points: Vec<AdditionalPoint>,
}

impl ContinuumArgs {
    pub fn config(&self) -> ContinuumConfig {
        ContinuumConfig {
            knot_spacing: (self.knot_spacing > 0.0).then_some(self.knot_spacing),
            low_sigma_clip: self.low_sigma,
            high_sigma_clip: self.high_sigma,
            max_iterations: self.max_iterations,
            order: self.order,
            exclude: self.exclude.clone(),
            include: self.include.clone(),
            function: self.function,
            scale: self.scale,
            additional_points: self.additional_points.clone(),
            ..Default::default()
        }
    }
}

#[derive(Args)]
pub struct NormalizeArgs {
    /// Input spectrum
    pub file: PathBuf,

    /// Zero-indexed order to normalize, for multi-order files
    #[arg(long)]
    pub index: Option<usize>,

    #[command(flatten)]
    pub continuum: ContinuumArgs,

    #[command(flatten)]
    pub reader: ReaderArgs,

    /// Output file path (.fits or text)
    #[arg(short, long, default_value = "normalized.fits")]
    pub output: PathBuf,
}

pub fn run(args: &NormalizeArgs) -> Result<()> {
    let outcome = read_spectrum(&args.file, &args.reader.options())
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let spectrum = match (args.index, outcome.orders.len()) {
        (Some(i), n) if i < n => &outcome.orders[i],
        (Some(i), n) => bail!("order {i} out of range, file has {n} orders"),
        (None, 1) => &outcome.orders[0],
        (None, n) => bail!("file has {n} orders, choose one with --index"),
    };

    let config = args.continuum.config();
    let fit = fit_continuum(spectrum, &config)?;
    if fit.is_failure() {
        bail!("continuum fit failed: too few usable points for order {}", config.order);
    }

    println!(
        "Fitted {} continuum in {} iteration(s), {} of {} pixels kept",
        config.function,
        fit.iterations,
        fit.mask.iter().filter(|&&m| m).count(),
        spectrum.len()
    );

    let format = write_spectrum(&args.output, &fit.normalized, &WriteOptions::default())
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Saved {} to {}", format, args.output.display());

    Ok(())
}
