mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use echelle_core::error::EchelleError;
use echelle_core::io::{read_spectrum, write_spectrum, OutputFormat, ReaderOptions, WriteOptions};
use echelle_core::pipeline::{
    normalize_orders, run_pipeline, run_pipeline_reported, NormalizationConfig, PipelineConfig,
    PipelineStage, ProgressReporter,
};

use common::{constant_spectrum, shaped_spectrum};

#[derive(Default)]
struct Recorder {
    stages: Mutex<Vec<PipelineStage>>,
    finished: AtomicUsize,
}

impl ProgressReporter for Recorder {
    fn begin_stage(&self, stage: PipelineStage, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }

    fn finish_stage(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_pipeline_normalizes_and_stitches() {
    let dir = tempdir().unwrap();
    let blue = dir.path().join("blue.fits");
    let red = dir.path().join("red.fits");
    let output = dir.path().join("out.fits");
    let slope = |d: f64| 100.0 + 0.01 * (d - 4000.0);
    write_spectrum(&blue, &shaped_spectrum(4000.0, 0.5, 2001, 1.0, slope), &WriteOptions::default()).unwrap();
    write_spectrum(&red, &shaped_spectrum(4800.0, 0.5, 2001, 1.0, slope), &WriteOptions::default()).unwrap();

    let config = PipelineConfig {
        spectrum_paths: vec![blue, red],
        output: output.clone(),
        ..Default::default()
    };
    let recorder = Arc::new(Recorder::default());
    let summary = run_pipeline_reported(&config, recorder.clone()).unwrap();

    assert_eq!(summary.orders_read, 2);
    assert_eq!(summary.orders_stitched, 2);
    assert_eq!(summary.failed_fits, 0);
    assert_eq!(summary.output_format, OutputFormat::LinearFits);
    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![
            PipelineStage::Reading,
            PipelineStage::Normalizing,
            PipelineStage::Stitching,
            PipelineStage::Writing
        ]
    );
    assert_eq!(recorder.finished.load(Ordering::Relaxed), 4);

    let back = read_spectrum(&output, &ReaderOptions::default()).unwrap();
    let stitched = back.single().unwrap();
    assert_eq!(stitched.len(), summary.output_points);
    for &f in stitched.flux().iter() {
        assert_abs_diff_eq!(f, 1.0, epsilon = 1e-3);
    }
}

#[test]
fn test_failed_fits_are_skipped() {
    let orders = vec![
        constant_spectrum(4000.0, 1.0, 500, 1.0, 1.0),
        constant_spectrum(4500.0, 1.0, 500, -1.0, 1.0),
    ];
    let reporter: Arc<dyn ProgressReporter> = Arc::new(Recorder::default());
    let (normalized, failed) = normalize_orders(&orders, &NormalizationConfig::default(), &reporter).unwrap();
    assert_eq!(failed, 1);
    assert_eq!(normalized.len(), 1);
}

#[test]
fn test_trim_applied_before_fit() {
    let orders = vec![constant_spectrum(4000.0, 1.0, 500, 1.0, 1.0)];
    let config = NormalizationConfig {
        blue_trim: 20,
        red_trim: 30,
        ..Default::default()
    };
    let reporter: Arc<dyn ProgressReporter> = Arc::new(Recorder::default());
    let (normalized, _) = normalize_orders(&orders, &config, &reporter).unwrap();
    assert_eq!(normalized[0].len(), 450);
    assert_eq!(normalized[0].dispersion()[0], 4020.0);
}

#[test]
fn test_pipeline_without_normalization_coadds_raw() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("only.txt");
    let output = dir.path().join("out.txt");
    write_spectrum(&input, &constant_spectrum(5000.0, 1.0, 50, 3.0, 1.0), &WriteOptions::default()).unwrap();

    let config = PipelineConfig {
        spectrum_paths: vec![input],
        output,
        normalization: None,
        ..Default::default()
    };
    let summary = run_pipeline(&config).unwrap();
    assert_eq!(summary.output_format, OutputFormat::Text);
    assert_eq!(summary.wavelength_range.map(|r| r.0), Some(5000.0));
}

#[test]
fn test_pipeline_requires_inputs() {
    let config = PipelineConfig::default();
    assert!(matches!(run_pipeline(&config), Err(EchelleError::EmptySequence)));
}
