use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use echelle_core::io::{read_spectrum, ReaderOptions};

#[derive(Args, Clone)]
pub struct ReaderArgs {
    /// Zero-indexed flux band of multi-band files
    #[arg(long)]
    pub flux_band: Option<usize>,

    /// Zero-indexed noise band of multi-band files
    #[arg(long)]
    pub noise_band: Option<usize>,

    /// Accept unrecognised band layouts (ivar becomes NaN)
    #[arg(long)]
    pub allow_unidentified: bool,

    /// Header card width used when joining WAT2 cards
    #[arg(long, default_value = "68")]
    pub card_width: usize,
}

impl ReaderArgs {
    pub fn options(&self) -> ReaderOptions {
        ReaderOptions {
            flux_band: self.flux_band,
            noise_band: self.noise_band,
            card_width: self.card_width,
            allow_unidentified: self.allow_unidentified,
        }
    }
}

#[derive(Args)]
pub struct InfoArgs {
    /// Input spectrum (FITS or text)
    pub file: PathBuf,

    #[command(flatten)]
    pub reader: ReaderArgs,

    /// Print every metadata entry of the first order
    #[arg(long)]
    pub metadata: bool,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let outcome = read_spectrum(&args.file, &args.reader.options())
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    println!("File:        {}", args.file.display());
    println!("Format:      {}", outcome.strategy);
    println!("Orders:      {}", outcome.orders.len());
    for failure in &outcome.attempts {
        println!("  skipped    {failure}");
    }
    println!();

    for (i, order) in outcome.orders.iter().enumerate() {
        let (lo, hi) = order.wavelength_range().unwrap_or((f64::NAN, f64::NAN));
        println!(
            "  [{i:>3}] {:>10.3} - {:<10.3} {:>6} px  step {:.5}",
            lo,
            hi,
            order.len(),
            order.median_pixel_spacing()
        );
    }

    if args.metadata {
        if let Some(first) = outcome.orders.first() {
            println!();
            for (key, value) in first.metadata.iter() {
                println!("  {key:<10} {value}");
            }
        }
    }

    Ok(())
}
