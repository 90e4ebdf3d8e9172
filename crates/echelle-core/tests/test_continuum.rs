mod common;

use approx::assert_abs_diff_eq;

use echelle_core::continuum::{
    fit_continuum, fit_knot_rejection, place_knots, AdditionalPoint, BasisFunction, ContinuumConfig,
    KnotRejectionConfig,
};
use echelle_core::error::EchelleError;
use echelle_core::spectrum::Spectrum;

use common::{constant_spectrum, linear_dispersion, shaped_spectrum};

fn spline_config() -> ContinuumConfig {
    ContinuumConfig {
        knot_spacing: Some(200.0),
        order: 3,
        function: BasisFunction::Spline,
        ..Default::default()
    }
}

fn index_of(s: &Spectrum, wavelength: f64) -> usize {
    s.dispersion().iter().position(|&d| d >= wavelength).unwrap()
}

// --- Flat and smooth continua ---

#[test]
fn test_flat_spectrum_converges() {
    let s = constant_spectrum(4000.0, 1.0, 1001, 1.0, 1e4);
    let fit = fit_continuum(&s, &spline_config()).unwrap();

    assert!(!fit.is_failure());
    assert!(fit.iterations <= 2);
    assert_eq!((fit.left, fit.right), (0, 1000));
    for &c in fit.continuum.iter() {
        assert_abs_diff_eq!(c, 1.0, epsilon = 1e-3);
    }
    for &f in fit.normalized.flux().iter() {
        assert_abs_diff_eq!(f, 1.0, epsilon = 1e-3);
    }
    assert_eq!(fit.knots, vec![4100.0, 4300.0, 4500.0, 4700.0, 4900.0]);
}

#[test]
fn test_normalized_ivar_scales_with_continuum() {
    let s = constant_spectrum(4000.0, 1.0, 501, 2.0, 9.0);
    let fit = fit_continuum(&s, &spline_config()).unwrap();
    // ivar * continuum^2
    assert_abs_diff_eq!(fit.normalized.ivar()[100], 36.0, epsilon = 1e-6);
    assert_abs_diff_eq!(fit.normalized.flux()[100], 1.0, epsilon = 1e-9);
}

#[test]
fn test_polynomial_families_recover_quadratic() {
    let truth = |d: f64| 2.0 + 1e-3 * (d - 4500.0) + 1e-6 * (d - 4500.0).powi(2);
    let s = shaped_spectrum(4000.0, 1.0, 1001, 1.0, truth);

    for function in [BasisFunction::Polynomial, BasisFunction::Legendre, BasisFunction::Chebyshev] {
        let config = ContinuumConfig {
            function,
            order: 2,
            ..Default::default()
        };
        let fit = fit_continuum(&s, &config).unwrap();
        for (c, d) in fit.continuum.iter().zip(s.dispersion()) {
            assert_abs_diff_eq!(*c, truth(*d), epsilon = 1e-6);
        }
    }
}

#[test]
fn test_polysinc_follows_envelope() {
    let truth = |d: f64| {
        let t = std::f64::consts::PI * (d - 4500.0) / 800.0;
        if t == 0.0 { 5.0 } else { 5.0 * (t.sin() / t).powi(2) }
    };
    let s = shaped_spectrum(4000.0, 2.0, 501, 1.0, truth);
    let config = ContinuumConfig {
        function: BasisFunction::Polysinc,
        order: 1,
        max_iterations: 1,
        ..Default::default()
    };
    let fit = fit_continuum(&s, &config).unwrap();
    assert!(!fit.is_failure());
    for (c, d) in fit.continuum.iter().zip(s.dispersion()) {
        assert_abs_diff_eq!(*c, truth(*d), epsilon = 1e-2);
    }
}

// --- Masks ---

#[test]
fn test_excluded_absorption_does_not_bias_fit() {
    let slope = |d: f64| 1.0 + 1e-4 * (d - 4000.0);
    let clean = shaped_spectrum(4000.0, 1.0, 1001, 1e4, slope);
    let absorbed = shaped_spectrum(4000.0, 1.0, 1001, 1e4, |d| {
        if (4520.0..4580.0).contains(&d) {
            slope(d) * 0.2
        } else {
            slope(d)
        }
    });
    let config = ContinuumConfig {
        exclude: vec![(4500.0, 4600.0)],
        ..spline_config()
    };

    let reference = fit_continuum(&clean, &config).unwrap();
    let fit = fit_continuum(&absorbed, &config).unwrap();
    let at = index_of(&clean, 4550.0);
    assert_abs_diff_eq!(fit.continuum[at], reference.continuum[at], epsilon = 1e-3);
    assert!(!fit.mask[at]);
}

#[test]
fn test_include_overrides_clipping() {
    let s = shaped_spectrum(4000.0, 1.0, 1001, 1.0, |d| {
        if (4490.0..4510.0).contains(&d) { 0.3 } else { 1.0 }
    });
    let at = index_of(&s, 4500.0);

    let clipped = fit_continuum(&s, &spline_config()).unwrap();
    assert!(!clipped.mask[at]);

    let config = ContinuumConfig {
        include: vec![(4490.0, 4510.0)],
        ..spline_config()
    };
    let kept = fit_continuum(&s, &config).unwrap();
    assert!(kept.mask[at]);
}

#[test]
fn test_exclusion_at_edge_narrows_bounds() {
    let s = constant_spectrum(4000.0, 1.0, 1001, 1.0, 1.0);
    let config = ContinuumConfig {
        exclude: vec![(3900.0, 4100.0)],
        ..spline_config()
    };
    let fit = fit_continuum(&s, &config).unwrap();
    assert_eq!(fit.left, 100);
    assert_eq!(fit.normalized.len(), 901);
    assert!(fit.continuum[50].is_nan());
}

// --- Failure sentinel ---

#[test]
fn test_too_few_points_returns_nan_sentinel() {
    let mut flux = vec![-1.0; 20];
    flux[5] = 1.0;
    flux[6] = 1.0;
    flux[7] = 1.0;
    let s = Spectrum::from_vecs(linear_dispersion(4000.0, 1.0, 20), flux, vec![1.0; 20]).unwrap();

    let fit = fit_continuum(&s, &spline_config()).unwrap();
    assert!(fit.is_failure());
    assert!(fit.normalized.ivar().iter().all(|v| v.is_nan()));
    assert_eq!((fit.left, fit.right), (5, 7));
}

#[test]
fn test_failure_after_edge_exclusion_keeps_usable_bounds() {
    let s = constant_spectrum(4000.0, 1.0, 10, 1.0, 1.0);
    let config = ContinuumConfig {
        exclude: vec![(3990.0, 4007.0)],
        ..spline_config()
    };
    let fit = fit_continuum(&s, &config).unwrap();
    assert!(fit.is_failure());
    assert_eq!((fit.left, fit.right), (0, 9));
}

#[test]
fn test_no_positive_flux_fails() {
    let s = constant_spectrum(4000.0, 1.0, 50, -2.0, 1.0);
    assert!(fit_continuum(&s, &spline_config()).unwrap().is_failure());
}

#[test]
fn test_unknown_basis_name() {
    let err = "bezier".parse::<BasisFunction>().unwrap_err();
    assert!(matches!(err, EchelleError::UnknownBasisFunction(name) if name == "bezier"));
    assert_eq!("cheb".parse::<BasisFunction>().unwrap(), BasisFunction::Chebyshev);
    assert_eq!("poly".parse::<BasisFunction>().unwrap(), BasisFunction::Polynomial);
}

// --- Extras ---

#[test]
fn test_additional_points_pull_fit() {
    let s = constant_spectrum(4000.0, 1.0, 100, 1.0, 1.0);
    let config = ContinuumConfig {
        function: BasisFunction::Polynomial,
        order: 0,
        max_iterations: 1,
        additional_points: vec![AdditionalPoint {
            wavelength: 4050.5,
            flux: 2.0,
            weight: 100.0,
        }],
        ..Default::default()
    };
    let fit = fit_continuum(&s, &config).unwrap();
    // Residuals are weighted by w, so the solution is the w^2-weighted mean.
    let expected = (100.0 * 1.0 + 100.0f64.powi(2) * 2.0) / (100.0 + 100.0f64.powi(2));
    assert_abs_diff_eq!(fit.continuum[0], expected, epsilon = 1e-9);
}

#[test]
fn test_scale_multiplies_continuum() {
    let s = constant_spectrum(4000.0, 1.0, 501, 1.0, 1.0);
    let config = ContinuumConfig {
        scale: 2.0,
        ..spline_config()
    };
    let fit = fit_continuum(&s, &config).unwrap();
    assert_abs_diff_eq!(fit.continuum[250], 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(fit.normalized.flux()[250], 0.5, epsilon = 1e-6);
}

#[test]
fn test_knots_follow_exclusions() {
    let s = constant_spectrum(4000.0, 1.0, 1001, 1.0, 1.0);
    assert_eq!(s.knots(200.0, &[]), vec![4100.0, 4300.0, 4500.0, 4700.0, 4900.0]);
    let trimmed = s.knots(200.0, &[(4800.0, 5100.0)]);
    assert!(trimmed.iter().all(|&k| k <= 4799.0));
    assert!(place_knots(s.dispersion().as_slice().unwrap(), None, None).is_empty());
}

// --- Alternative estimators ---

#[test]
fn test_robust_polynomial_ignores_spikes() {
    let truth = |d: f64| 1.0 + 1e-4 * (d - 4050.0).powi(2);
    let clean = shaped_spectrum(4000.0, 0.5, 201, 1e4, truth).add_noise(Some(3));
    let mut flux = clean.flux().to_vec();
    for i in [20, 90, 91, 150] {
        flux[i] += 5.0;
    }
    let s = Spectrum::from_vecs(clean.dispersion().to_vec(), flux, clean.ivar().to_vec()).unwrap();

    let fit = s.fit_robust_polynomial(2).unwrap();
    assert!(!fit.is_failure());
    for i in [20, 90, 150] {
        let d = s.dispersion()[i];
        assert_abs_diff_eq!(fit.continuum[i], truth(d), epsilon = 0.01);
    }
    assert!(fit.rms < 0.02);
    let snr = fit.snr();
    assert!(snr > 50.0 && snr < 200.0, "snr {snr}");
    assert_eq!(fit.normalized.len(), s.len());
}

#[test]
fn test_robust_polynomial_with_too_few_points() {
    let s = Spectrum::from_vecs(vec![1.0, 2.0, 3.0], vec![1.0, f64::NAN, 1.0], vec![1.0; 3]).unwrap();
    let fit = s.fit_robust_polynomial(3).unwrap();
    assert!(fit.is_failure());
    assert!(fit.rms.is_nan());
}

#[test]
fn test_knot_rejection_skips_absorption_line() {
    let s = shaped_spectrum(4950.0, 0.05, 2001, 1e4, |d| {
        1.0 - 0.5 * (-(d - 5000.0).powi(2) / 0.5).exp()
    });
    let fit = fit_knot_rejection(&s, &KnotRejectionConfig::default());
    assert!(!fit.is_failure());
    assert!(fit.knots.iter().all(|k| (k - 5000.0).abs() > 1.0));
    let core = index_of(&s, 5000.0);
    assert!(!fit.good[core]);
    assert_abs_diff_eq!(fit.continuum[core], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(fit.continuum[100], 1.0, epsilon = 1e-6);
}
