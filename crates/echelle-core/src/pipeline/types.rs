use std::path::PathBuf;

use crate::io::{OutputFormat, ReadStrategy};

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Reading,
    Normalizing,
    Stitching,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading spectra"),
            Self::Normalizing => write!(f, "Normalizing orders"),
            Self::Stitching => write!(f, "Stitching orders"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars or logging. All methods
/// have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (files or orders), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// Work items within the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `run_pipeline` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Per-input record of how a file was read.
#[derive(Clone, Debug)]
pub struct InputSummary {
    pub path: PathBuf,
    pub strategy: ReadStrategy,
    pub orders: usize,
}

/// What a pipeline run did.
#[derive(Clone, Debug)]
pub struct PipelineSummary {
    pub inputs: Vec<InputSummary>,
    pub orders_read: usize,
    pub orders_stitched: usize,
    /// Orders whose continuum fit failed and were left out.
    pub failed_fits: usize,
    pub output: PathBuf,
    pub output_format: OutputFormat,
    pub output_points: usize,
    pub wavelength_range: Option<(f64, f64)>,
}
