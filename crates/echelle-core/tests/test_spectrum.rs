mod common;

use approx::assert_abs_diff_eq;
use ndarray::array;

use echelle_core::error::EchelleError;
use echelle_core::spectrum::{MetaValue, Metadata, Redshift, Spectrum};

use common::{constant_spectrum, linear_dispersion, sample_metadata};

// --- Construction ---

#[test]
fn test_decreasing_dispersion_is_reversed() {
    let s = Spectrum::from_vecs(vec![5.0, 4.0, 3.0], vec![1.0, 2.0, 3.0], vec![0.1, 0.2, 0.3]).unwrap();
    assert_eq!(s.dispersion(), &array![3.0, 4.0, 5.0]);
    assert_eq!(s.flux(), &array![3.0, 2.0, 1.0]);
    assert_eq!(s.ivar(), &array![0.3, 0.2, 0.1]);
}

#[test]
fn test_dimension_mismatch() {
    let err = Spectrum::from_vecs(vec![1.0, 2.0], vec![1.0], vec![1.0, 1.0]).unwrap_err();
    assert!(matches!(err, EchelleError::DimensionMismatch { flux: 1, .. }));
}

#[test]
fn test_unsorted_dispersion_rejected() {
    let err = Spectrum::from_vecs(vec![1.0, 3.0, 2.0], vec![1.0; 3], vec![1.0; 3]).unwrap_err();
    assert!(matches!(err, EchelleError::UnsortedDispersion { index: 2 }));
}

#[test]
fn test_nonfinite_ivar_replaced_from_mean_flux() {
    let s = Spectrum::from_vecs(vec![1.0, 2.0, 3.0], vec![2.0, 4.0, 6.0], vec![f64::NAN; 3]).unwrap();
    assert!(s.ivar().iter().all(|&w| (w - 0.25).abs() < 1e-12));

    let zero = Spectrum::from_vecs(vec![1.0, 2.0], vec![1.0, 1.0], vec![0.0, 0.0]).unwrap();
    assert_eq!(zero.ivar(), &array![1.0, 1.0]);
}

#[test]
fn test_partial_ivar_kept() {
    let s = Spectrum::from_vecs(vec![1.0, 2.0], vec![1.0, 1.0], vec![f64::NAN, 4.0]).unwrap();
    assert!(s.ivar()[0].is_nan());
    assert_eq!(s.ivar()[1], 4.0);
}

// --- Copy and cut ---

#[test]
fn test_clone_is_identical() {
    let mut s = constant_spectrum(4000.0, 0.5, 20, 3.0, 2.0);
    s.metadata = sample_metadata();
    let copy = s.clone();
    assert_eq!(copy.dispersion(), s.dispersion());
    assert_eq!(copy.flux(), s.flux());
    assert_eq!(copy.ivar(), s.ivar());
    assert_eq!(copy.metadata, s.metadata);
}

#[test]
fn test_cut_uses_strict_bounds() {
    let s = constant_spectrum(4000.0, 1.0, 11, 1.0, 1.0);
    let cut = s.cut_wavelength(4002.0, 4005.0).unwrap();
    assert_eq!(cut.dispersion(), &array![4003.0, 4004.0]);
}

#[test]
fn test_cut_is_idempotent() {
    let s = constant_spectrum(4000.0, 0.25, 400, 1.0, 1.0);
    let once = s.cut_wavelength(4010.1, 4050.3).unwrap();
    let twice = once.cut_wavelength(4010.1, 4050.3).unwrap();
    assert_eq!(once.dispersion(), twice.dispersion());
    assert_eq!(once.flux(), twice.flux());
    assert_eq!(once.ivar(), twice.ivar());
}

#[test]
fn test_trim_pixels() {
    let s = constant_spectrum(4000.0, 1.0, 10, 1.0, 1.0);
    let t = s.trim_pixels(2, 3).unwrap();
    assert_eq!(t.len(), 5);
    assert_eq!(t.wavelength_range(), Some((4002.0, 4006.0)));
}

// --- Redshift ---

#[test]
fn test_redshift_requires_exactly_one() {
    assert!(matches!(Redshift::from_parts(None, None), Err(EchelleError::InvalidRedshift)));
    assert!(matches!(
        Redshift::from_parts(Some(10.0), Some(0.1)),
        Err(EchelleError::InvalidRedshift)
    ));
    assert_eq!(Redshift::from_parts(None, Some(0.1)).unwrap(), Redshift::Z(0.1));
}

#[test]
fn test_redshift_scales_dispersion() {
    let s = constant_spectrum(5000.0, 1.0, 5, 1.0, 1.0);
    let shifted = s.redshift(Redshift::Z(0.01), false);
    assert_abs_diff_eq!(shifted.dispersion()[0], 5050.0, epsilon = 1e-9);
    assert_eq!(shifted.flux(), s.flux());

    let by_velocity = s.redshift(Redshift::Velocity(299_792.458 * 0.01), false);
    assert_abs_diff_eq!(by_velocity.dispersion()[4], 5004.0 * 1.01, epsilon = 1e-9);
}

#[test]
fn test_redshift_reinterpolate_keeps_grid() {
    let dispersion = linear_dispersion(5000.0, 1.0, 100);
    let flux: Vec<f64> = dispersion.iter().map(|d| d - 5000.0).collect();
    let s = Spectrum::from_vecs(dispersion, flux, vec![1.0; 100]).unwrap();

    let shifted = s.redshift(Redshift::Z(0.001), true);
    assert_eq!(shifted.dispersion(), s.dispersion());
    // Flux at 5020 comes from the shifted sample at 5020 / 1.001.
    let expected = 5020.0 / 1.001 - 5000.0;
    assert_abs_diff_eq!(shifted.flux()[20], expected, epsilon = 1e-9);
}

// --- Resampling and smoothing ---

#[test]
fn test_linterpolate_fills_outside() {
    let s = Spectrum::from_vecs(vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0], vec![1.0; 3]).unwrap();
    let r = s.linterpolate(&array![0.5, 1.5, 2.5, 3.5], 0.0).unwrap();
    assert_eq!(r.flux(), &array![0.0, 15.0, 25.0, 0.0]);
}

#[test]
fn test_gaussian_smooth_preserves_constant() {
    let s = constant_spectrum(4000.0, 0.1, 200, 7.0, 1.0);
    let smoothed = s.gaussian_smooth(1.0);
    for &f in smoothed.flux() {
        assert_abs_diff_eq!(f, 7.0, epsilon = 1e-9);
    }
    assert_eq!(smoothed.ivar(), s.ivar());
}

#[test]
fn test_gaussian_smooth_spreads_spike() {
    let mut flux = vec![0.0; 101];
    flux[50] = 1.0;
    let s = Spectrum::from_vecs(linear_dispersion(0.0, 1.0, 101), flux, vec![1.0; 101]).unwrap();
    let smoothed = s.gaussian_smooth(5.0);
    let total: f64 = smoothed.flux().sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    assert!(smoothed.flux()[50] < 1.0);
    assert!(smoothed.flux()[52] > 0.0);
}

// --- Noise ---

#[test]
fn test_seeded_noise_is_reproducible() {
    let mut ivar = vec![1e4; 50];
    ivar[10] = 0.0;
    let s = Spectrum::from_vecs(linear_dispersion(5000.0, 0.1, 50), vec![1.0; 50], ivar).unwrap();
    let a = s.add_noise(Some(42));
    let b = s.add_noise(Some(42));
    assert_eq!(a.flux(), b.flux());
    assert_ne!(a.flux(), s.flux());
    assert_eq!(a.flux()[10], 1.0);
    assert_eq!(a.ivar(), s.ivar());
}

#[test]
fn test_snr_of_noisy_flat_spectrum() {
    let noisy = constant_spectrum(5000.0, 0.05, 2000, 1.0, 1e4).add_noise(Some(7));
    let snr = noisy.estimate_snr();
    assert!((snr - 100.0).abs() < 20.0, "snr {snr}");
}

#[test]
fn test_snr_of_noiseless_spectrum_is_infinite() {
    let s = constant_spectrum(5000.0, 0.05, 200, 1.0, 1e4);
    assert!(s.estimate_snr().is_infinite());
}

// --- Metadata ---

#[test]
fn test_metadata_preserves_insertion_order() {
    let m = sample_metadata();
    let keys: Vec<&str> = m.keys().collect();
    assert_eq!(keys, ["OBJECT", "EXPTIME", "NCOMBINE", "FLIPPED"]);
    assert_eq!(m.get_f64("NCOMBINE"), Some(3.0));
}

#[test]
fn test_metadata_append_concatenates_strings() {
    let mut m = Metadata::new();
    m.append("WAT2_001", "spec1 = \"1 2");
    m.append("WAT2_001", " 3\"");
    m.append("EXPTIME", 1.0);
    m.append("EXPTIME", 2.0);
    assert_eq!(m.get_str("WAT2_001"), Some("spec1 = \"1 2 3\""));
    assert_eq!(m.get("EXPTIME"), Some(&MetaValue::Float(2.0)));
    assert_eq!(m.len(), 2);
}

#[test]
fn test_metadata_json_roundtrip() {
    let m = sample_metadata();
    let json = serde_json::to_string(&m).unwrap();
    let back: Metadata = serde_json::from_str(&json).unwrap();
    assert_eq!(back, m);
}
