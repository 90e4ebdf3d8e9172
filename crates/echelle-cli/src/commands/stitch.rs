use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use echelle_core::io::{read_spectrum, write_spectrum, WriteOptions};
use echelle_core::stitch::{stitch_orders, StitchConfig, StitchMethod};

use super::info::ReaderArgs;

#[derive(Args)]
pub struct StitchArgs {
    /// Input spectra; every order of every file is stitched
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Combination method (stitch, stitch_weighted, coadd)
    #[arg(long, default_value = "stitch")]
    pub method: StitchMethod,

    #[command(flatten)]
    pub reader: ReaderArgs,

    /// Output file path (.fits or text)
    #[arg(short, long, default_value = "stitched.fits")]
    pub output: PathBuf,
}

pub fn run(args: &StitchArgs) -> Result<()> {
    let options = args.reader.options();
    let mut orders = Vec::new();
    for file in &args.files {
        let outcome = read_spectrum(file, &options)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        println!("{}: {} order(s) via {}", file.display(), outcome.orders.len(), outcome.strategy);
        orders.extend(outcome.orders);
    }

    let config = StitchConfig {
        method: args.method,
        keep_resampled: false,
    };
    let stitched = stitch_orders(&orders, None, &config)?;
    let spectrum = stitched.spectrum;
    println!("Combined {} order(s) into {} points ({})", orders.len(), spectrum.len(), args.method);

    let format = write_spectrum(&args.output, &spectrum, &WriteOptions::default())
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Saved {} to {}", format, args.output.display());

    Ok(())
}
