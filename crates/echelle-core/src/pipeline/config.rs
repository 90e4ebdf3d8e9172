use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::continuum::ContinuumConfig;
use crate::io::{ReaderOptions, WriteOptions};
use crate::stitch::StitchConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub spectrum_paths: Vec<PathBuf>,
    pub output: PathBuf,
    #[serde(default)]
    pub reader: ReaderOptions,
    /// Continuum normalization of each order; skipped when absent.
    pub normalization: Option<NormalizationConfig>,
    #[serde(default)]
    pub stitch: StitchConfig,
    #[serde(default)]
    pub write: WriteOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            spectrum_paths: Vec::new(),
            output: PathBuf::from("stitched.fits"),
            reader: ReaderOptions::default(),
            normalization: Some(NormalizationConfig::default()),
            stitch: StitchConfig::default(),
            write: WriteOptions::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Pixels dropped from the blue end of every order before fitting.
    pub blue_trim: usize,
    /// Pixels dropped from the red end of every order before fitting.
    pub red_trim: usize,
    pub continuum: ContinuumConfig,
}
