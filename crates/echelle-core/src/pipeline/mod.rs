pub mod config;
mod orchestrator;
mod types;

pub use config::{NormalizationConfig, PipelineConfig};
pub use orchestrator::{normalize_orders, run_pipeline, run_pipeline_reported};
pub use types::{InputSummary, PipelineStage, PipelineSummary, ProgressReporter};
