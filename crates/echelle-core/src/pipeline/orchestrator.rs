use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::consts::PARALLEL_ORDER_THRESHOLD;
use crate::continuum::fit_continuum;
use crate::error::{EchelleError, Result};
use crate::io::{read_spectrum, write_spectrum};
use crate::spectrum::Spectrum;
use crate::stitch::stitch_orders;

use super::config::{NormalizationConfig, PipelineConfig};
use super::types::{InputSummary, NoOpReporter, PipelineStage, PipelineSummary, ProgressReporter};

/// Trim and continuum-normalize every order.
///
/// Orders whose fit fails are dropped; the second value counts them.
pub fn normalize_orders(
    orders: &[Spectrum],
    config: &NormalizationConfig,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<(Vec<Spectrum>, usize)> {
    let done = AtomicUsize::new(0);
    let normalize = |(index, order): (usize, &Spectrum)| -> Result<Option<Spectrum>> {
        let trimmed = order.trim_pixels(config.blue_trim, config.red_trim)?;
        let fit = fit_continuum(&trimmed, &config.continuum)?;
        reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
        if fit.is_failure() {
            warn!(order = index, "Continuum fit failed, skipping order");
            return Ok(None);
        }
        Ok(Some(fit.normalized))
    };

    let results: Vec<Option<Spectrum>> = if orders.len() >= PARALLEL_ORDER_THRESHOLD {
        orders.par_iter().enumerate().map(normalize).collect::<Result<_>>()?
    } else {
        orders.iter().enumerate().map(normalize).collect::<Result<_>>()?
    };

    let failed = results.iter().filter(|r| r.is_none()).count();
    Ok((results.into_iter().flatten().collect(), failed))
}

/// Run the full processing pipeline with a thread-safe progress reporter.
pub fn run_pipeline_reported(
    config: &PipelineConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<PipelineSummary> {
    if config.spectrum_paths.is_empty() {
        return Err(EchelleError::EmptySequence);
    }

    // Read
    reporter.begin_stage(PipelineStage::Reading, Some(config.spectrum_paths.len()));
    let mut orders = Vec::new();
    let mut inputs = Vec::with_capacity(config.spectrum_paths.len());
    for (i, path) in config.spectrum_paths.iter().enumerate() {
        let outcome = read_spectrum(path, &config.reader)?;
        info!(
            path = %path.display(),
            strategy = %outcome.strategy,
            orders = outcome.orders.len(),
            "Read input"
        );
        inputs.push(InputSummary {
            path: path.clone(),
            strategy: outcome.strategy,
            orders: outcome.orders.len(),
        });
        orders.extend(outcome.orders);
        reporter.advance(i + 1);
    }
    reporter.finish_stage();
    let orders_read = orders.len();

    // Normalize
    let mut failed_fits = 0;
    if let Some(normalization) = &config.normalization {
        reporter.begin_stage(PipelineStage::Normalizing, Some(orders.len()));
        let (normalized, failed) = normalize_orders(&orders, normalization, &reporter)?;
        reporter.finish_stage();
        if failed > 0 {
            warn!(failed, total = orders_read, "Some orders could not be normalized");
        }
        orders = normalized;
        failed_fits = failed;
    }

    // Stitch
    reporter.begin_stage(PipelineStage::Stitching, None);
    let stitched = stitch_orders(&orders, None, &config.stitch)?;
    reporter.finish_stage();

    // Write
    reporter.begin_stage(PipelineStage::Writing, None);
    let spectrum = stitched.spectrum;
    let output_format = write_spectrum(&config.output, &spectrum, &config.write)?;
    reporter.finish_stage();
    info!(
        output = %config.output.display(),
        points = spectrum.len(),
        format = ?output_format,
        "Pipeline complete"
    );

    Ok(PipelineSummary {
        inputs,
        orders_read,
        orders_stitched: orders.len(),
        failed_fits,
        output: config.output.clone(),
        output_format,
        output_points: spectrum.len(),
        wavelength_range: spectrum.wavelength_range(),
    })
}

/// Run the full processing pipeline.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineSummary> {
    let reporter: Arc<dyn ProgressReporter> = Arc::new(NoOpReporter);
    run_pipeline_reported(config, reporter)
}
