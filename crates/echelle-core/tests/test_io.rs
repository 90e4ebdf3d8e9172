mod common;

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use echelle_core::error::EchelleError;
use echelle_core::io::multispec::BANDS_UNIDENTIFIED_KEY;
use echelle_core::io::reader::{ORDER_NUMBER_KEY, READ_PATH_KEY};
use echelle_core::io::{
    read_spectrum, write_linear_flux, write_order_cube, write_spectrum, OutputFormat, ReadStrategy,
    ReaderOptions, WriteOptions,
};
use echelle_core::spectrum::{MetaValue, Spectrum};

use common::{constant_spectrum, linear_dispersion, multispec_header, sample_metadata, write_multispec};

fn wavy_spectrum(dispersion: Vec<f64>) -> Spectrum {
    let n = dispersion.len();
    let flux = (0..n).map(|i| 1.0 + 0.3 * (i as f64 * 0.05).sin()).collect();
    let ivar = (0..n).map(|i| 100.0 + i as f64).collect();
    Spectrum::from_vecs(dispersion, flux, ivar).unwrap()
}

// --- Writers round trip ---

#[test]
fn test_linear_fits_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("linear.fits");
    let s = wavy_spectrum(linear_dispersion(4000.0, 0.5, 1000));

    let format = write_spectrum(&path, &s, &WriteOptions::default()).unwrap();
    assert_eq!(format, OutputFormat::LinearFits);

    let outcome = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(outcome.strategy, ReadStrategy::Fits1d);
    let back = outcome.single().unwrap();
    for (a, b) in back.dispersion().iter().zip(s.dispersion()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
    assert_eq!(back.flux(), s.flux());
    assert_eq!(back.ivar(), s.ivar());
}

#[test]
fn test_nonlinear_fits_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("table.fits");
    let dispersion: Vec<f64> = (0..500).map(|i| 4000.0 + 0.5 * i as f64 + 1e-4 * (i * i) as f64).collect();
    let s = wavy_spectrum(dispersion);

    let format = write_spectrum(&path, &s, &WriteOptions::default()).unwrap();
    assert_eq!(format, OutputFormat::TableFits);

    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Fits1d);
    let back = back.single().unwrap();
    assert_eq!(back.dispersion(), s.dispersion());
    assert_eq!(back.flux(), s.flux());
    for (a, b) in back.ivar().iter().zip(s.ivar()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_text_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("spectrum.txt");
    let s = constant_spectrum(5000.0, 0.25, 40, 1.5, 2.0);

    assert_eq!(write_spectrum(&path, &s, &WriteOptions::default()).unwrap(), OutputFormat::Text);
    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Ascii3);
    let back = back.single().unwrap();
    assert_eq!(back.dispersion(), s.dispersion());
    assert_eq!(back.flux(), s.flux());
    assert_eq!(back.ivar(), s.ivar());
}

#[test]
fn test_text_precision_for_small_ivar() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("faint.txt");
    let s = constant_spectrum(5000.0, 1.0, 3, 1.0, 1e-6);
    write_spectrum(&path, &s, &WriteOptions::default()).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.lines().next().unwrap().ends_with("0.000001000000"));
}

#[test]
fn test_overwrite_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("exists.fits");
    let s = constant_spectrum(4000.0, 1.0, 10, 1.0, 1.0);
    write_spectrum(&path, &s, &WriteOptions::default()).unwrap();

    let options = WriteOptions {
        overwrite: false,
        ..Default::default()
    };
    assert!(matches!(write_spectrum(&path, &s, &options), Err(EchelleError::Write(_))));
}

#[test]
fn test_metadata_written_as_header_cards() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meta.fits");
    let mut s = constant_spectrum(4000.0, 1.0, 10, 1.0, 1.0);
    s.metadata = sample_metadata();
    s.metadata.insert("not a keyword", "dropped");

    let options = WriteOptions {
        include_metadata: true,
        ..Default::default()
    };
    write_spectrum(&path, &s, &options).unwrap();
    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    let meta = &back.orders[0].metadata;
    assert_eq!(meta.get_str("OBJECT"), Some("HD 122563"));
    assert_eq!(meta.get_f64("EXPTIME"), Some(1200.0));
    assert_eq!(meta.get("FLIPPED"), Some(&MetaValue::Bool(false)));
    assert!(!meta.contains_key("not a keyword"));
    let source = path.display().to_string();
    assert_eq!(meta.get_str(READ_PATH_KEY), Some(source.as_str()));
}

#[test]
fn test_bare_linear_flux_gets_placeholder_ivar() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bare.fits");
    write_linear_flux(&path, 6000.0, 0.1, &[1.0, 2.0, 3.0]).unwrap();
    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    let s = back.single().unwrap();
    assert_abs_diff_eq!(s.dispersion()[2], 6000.2, epsilon = 1e-9);
    assert!(s.ivar().iter().all(|&w| w == 1e5));
}

// --- Multi-order containers ---

#[test]
fn test_order_cube_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cube.fits");
    let orders = vec![
        constant_spectrum(4000.0, 0.5, 20, 1.0, 2.0),
        constant_spectrum(4010.0, 0.5, 12, 3.0, 4.0),
    ];
    write_order_cube(&path, &orders).unwrap();

    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::WaveFluxIvarCube);
    assert_eq!(back.orders.len(), 2);
    assert_eq!(back.orders[1].len(), 12);
    assert_eq!(back.orders[1].dispersion(), orders[1].dispersion());
    assert_eq!(back.orders[1].flux(), orders[1].flux());
}

#[test]
fn test_ceres_orders_are_reversed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ceres.fits");
    let mut header = echelle_core::spectrum::Metadata::new();
    header.insert("PIPELINE", "CERES");
    let red = linear_dispersion(6000.0, 1.0, 5);
    let blue = linear_dispersion(5000.0, 1.0, 5);
    write_multispec(
        &path,
        header,
        &[
            vec![red.clone(), blue.clone()],
            vec![vec![2.0; 5], vec![1.0; 5]],
            vec![vec![1.0; 5], vec![1.0; 5]],
        ],
    );

    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Ceres);
    assert_eq!(back.orders[0].dispersion().to_vec(), blue);
    assert_eq!(back.orders[1].flux()[0], 2.0);
}

#[test]
fn test_single_band_multispec_without_fingerprint() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ms.fits");
    let header = multispec_header(&["1 1 0 4000 0.5 10 0 0 0", "2 2 0 4005 0.5 10 0 0 0"]);
    write_multispec(&path, header, &[vec![vec![2.0; 10], vec![4.0; 10]]]);

    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::LegacyMultispec);
    let tried: Vec<ReadStrategy> = back.attempts.iter().map(|a| a.strategy).collect();
    assert!(tried.contains(&ReadStrategy::Multispec));
    assert_eq!(back.orders.len(), 2);
    assert_eq!(back.orders[1].dispersion()[0], 4005.0);
    assert_abs_diff_eq!(back.orders[0].ivar()[0], 0.5, epsilon = 1e-12);

    let options = ReaderOptions {
        allow_unidentified: true,
        ..Default::default()
    };
    let flagged = read_spectrum(&path, &options).unwrap();
    assert_eq!(flagged.strategy, ReadStrategy::Multispec);
    assert_eq!(
        flagged.orders[0].metadata.get(BANDS_UNIDENTIFIED_KEY),
        Some(&MetaValue::Bool(true))
    );
}

#[test]
fn test_observatory_band_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mcd.fits");
    let mut header = multispec_header(&["1 1 0 4000 0.5 10 0 0 0", "2 2 0 4005 0.5 10 0 0 0"]);
    header.insert("OBSERVAT", "MCDONALD");
    write_multispec(
        &path,
        header,
        &[
            vec![vec![5.0; 10], vec![6.0; 10]],
            vec![vec![50.0; 10], vec![60.0; 10]],
            vec![vec![0.5; 10], vec![2.0; 10]],
        ],
    );

    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Multispec);
    assert_eq!(back.orders[0].flux()[0], 5.0);
    assert_abs_diff_eq!(back.orders[0].ivar()[0], 4.0, epsilon = 1e-12);
    assert_abs_diff_eq!(back.orders[1].ivar()[0], 0.25, epsilon = 1e-12);

    let options = ReaderOptions {
        flux_band: Some(1),
        ..Default::default()
    };
    let other = read_spectrum(&path, &options).unwrap();
    assert_eq!(other.orders[1].flux()[0], 60.0);
}

#[test]
fn test_mike_orders_carry_numbers_and_noise() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mike.fits");
    let mut header = multispec_header(&["1 1 0 4000 0.5 10 0 0 0", "2 2 0 4005 0.5 10 0 0 0"]);
    header.insert("ECORD0", 71i64);
    header.insert("ECORD1", 70i64);
    let band = |a: f64, b: f64| vec![vec![a; 10], vec![b; 10]];
    write_multispec(
        &path,
        header,
        &[
            band(1.0, 1.0),   // sky
            band(10.0, 20.0), // object
            band(0.5, 2.0),   // noise
            band(20.0, 10.0), // snr
            band(1.0, 1.0),   // lamp
            band(1.0, 1.0),   // flat
            band(2.0, 4.0),   // object / flat
        ],
    );

    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Mike);
    assert_eq!(back.orders.len(), 2);
    assert_eq!(back.orders[0].flux()[0], 10.0);
    assert_eq!(back.orders[1].dispersion()[0], 4005.0);
    assert_abs_diff_eq!(back.orders[0].ivar()[0], 4.0, epsilon = 1e-12);
    assert_abs_diff_eq!(back.orders[1].ivar()[0], 0.25, epsilon = 1e-12);
    let numbers: Vec<Option<i64>> = back
        .orders
        .iter()
        .map(|o| o.metadata.get(ORDER_NUMBER_KEY).and_then(MetaValue::as_i64))
        .collect();
    assert_eq!(numbers, vec![Some(71), Some(70)]);

    // Flat-divided flux folds the flat back into the noise.
    let options = ReaderOptions {
        flux_band: Some(6),
        ..Default::default()
    };
    let flat = read_spectrum(&path, &options).unwrap();
    assert_eq!(flat.orders[0].flux()[0], 2.0);
    assert_abs_diff_eq!(flat.orders[0].ivar()[0], 100.0, epsilon = 1e-9);
    assert_abs_diff_eq!(flat.orders[1].ivar()[0], 6.25, epsilon = 1e-9);
}

#[test]
fn test_mike_needs_order_numbers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.fits");
    let mut header = multispec_header(&["1 1 0 4000 0.5 10 0 0 0"]);
    header.insert("OBSERVAT", "MCDONALD");
    let bands: Vec<Vec<Vec<f64>>> = (0..7).map(|_| vec![vec![1.0; 10]]).collect();
    write_multispec(&path, header, &bands);

    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Multispec);
    assert_eq!(back.attempts[0].strategy, ReadStrategy::Mike);
    assert!(back.orders[0].metadata.get(ORDER_NUMBER_KEY).is_none());
}

#[test]
fn test_nonpositive_flux_gets_tiny_ivar() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("neg.fits");
    let mut header = multispec_header(&["1 1 0 4000 0.5 4 0 0 0"]);
    header.insert("OBSERVAT", "APO");
    write_multispec(
        &path,
        header,
        &[
            vec![vec![1.0, -1.0, 0.0, 1.0]],
            vec![vec![1.0; 4]],
        ],
    );
    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    let ivar = back.orders[0].ivar();
    assert_eq!(ivar[0], 1.0);
    assert_eq!(ivar[1], 1e-12);
    assert_eq!(ivar[2], 1e-12);
}

// --- Text inputs and failures ---

#[test]
fn test_two_column_text_gets_placeholder_ivar() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("two.txt");
    std::fs::write(&path, "# wave flux\n5000.0 1.0\n5000.5 1.1\n5001.0 0.9\n").unwrap();
    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Ascii2);
    assert!(back.orders[0].ivar().iter().all(|&w| w == 1e5));
}

#[test]
fn test_text_with_header_row() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("header.txt");
    std::fs::write(&path, "wave flux ivar\n5000.0 1.0 4\n5000.5 1.1 4\n").unwrap();
    let back = read_spectrum(&path, &ReaderOptions::default()).unwrap();
    assert_eq!(back.strategy, ReadStrategy::Ascii3);
    assert_eq!(back.orders[0].len(), 2);
}

#[test]
fn test_unreadable_file_lists_every_strategy() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("junk.dat");
    std::fs::write(&path, "this is not\na spectrum\n").unwrap();
    match read_spectrum(&path, &ReaderOptions::default()) {
        Err(EchelleError::UnreadableSpectrum { attempts, .. }) => {
            let tried: Vec<ReadStrategy> = attempts.iter().map(|a| a.strategy).collect();
            assert_eq!(tried, ReadStrategy::ALL.to_vec());
        }
        other => panic!("expected UnreadableSpectrum, got {other:?}"),
    }
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let err = read_spectrum(&dir.path().join("nope.fits"), &ReaderOptions::default()).unwrap_err();
    assert!(matches!(err, EchelleError::Io(_)));
}
