mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "echelle", about = "Echelle spectrum reading, normalization and stitching")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a spectrum file is read and its orders
    Info(commands::info::InfoArgs),
    /// Fit and divide out the continuum of one order
    Normalize(commands::normalize::NormalizeArgs),
    /// Combine orders onto a common wavelength grid
    Stitch(commands::stitch::StitchArgs),
    /// Run the full read, normalize, stitch pipeline
    Run(commands::run::RunArgs),
    /// Print a default pipeline config as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Normalize(args) => commands::normalize::run(args),
        Commands::Stitch(args) => commands::stitch::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
