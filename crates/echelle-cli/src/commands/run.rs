use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use echelle_core::pipeline::{
    run_pipeline_reported, NormalizationConfig, PipelineConfig, PipelineStage, ProgressReporter,
};
use echelle_core::stitch::{StitchConfig, StitchMethod};
use indicatif::{ProgressBar, ProgressStyle};

use super::info::ReaderArgs;
use super::normalize::ContinuumArgs;

#[derive(Args)]
pub struct RunArgs {
    /// Input spectra
    pub files: Vec<PathBuf>,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip continuum normalization
    #[arg(long)]
    pub no_normalize: bool,

    /// Pixels trimmed from the blue end of every order
    #[arg(long, default_value = "0")]
    pub blue_trim: usize,

    /// Pixels trimmed from the red end of every order
    #[arg(long, default_value = "0")]
    pub red_trim: usize,

    #[command(flatten)]
    pub continuum: ContinuumArgs,

    /// Combination method (stitch, stitch_weighted, coadd)
    #[arg(long, default_value = "stitch")]
    pub method: StitchMethod,

    #[command(flatten)]
    pub reader: ReaderArgs,

    /// Output file path
    #[arg(short, long, default_value = "stitched.fits")]
    pub output: PathBuf,
}

struct BarReporter {
    pb: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        self.pb.set_message(stage.to_string());
        self.pb.set_length(total_items.unwrap_or(1) as u64);
        self.pb.set_position(0);
    }

    fn advance(&self, items_done: usize) {
        self.pb.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        if let Some(len) = self.pb.length() {
            self.pb.set_position(len);
        }
    }
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config: PipelineConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid pipeline config")?
    } else {
        build_config_from_args(args)
    };
    if args.config.is_some() && !args.files.is_empty() {
        config.spectrum_paths = args.files.clone();
    }
    if config.spectrum_paths.is_empty() {
        anyhow::bail!("no input spectra given");
    }

    crate::summary::print_pipeline_summary(&config);

    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter: Arc<dyn ProgressReporter> = Arc::new(BarReporter { pb: pb.clone() });

    let summary = run_pipeline_reported(&config, reporter)?;
    pb.finish_with_message("Done");

    crate::summary::print_run_result(&summary);
    Ok(())
}

fn build_config_from_args(args: &RunArgs) -> PipelineConfig {
    let normalization = (!args.no_normalize).then(|| NormalizationConfig {
        blue_trim: args.blue_trim,
        red_trim: args.red_trim,
        continuum: args.continuum.config(),
    });

    PipelineConfig {
        spectrum_paths: args.files.clone(),
        output: args.output.clone(),
        reader: args.reader.options(),
        normalization,
        stitch: StitchConfig {
            method: args.method,
            keep_resampled: false,
        },
        ..Default::default()
    }
}
