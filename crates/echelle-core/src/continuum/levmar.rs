use nalgebra::{DMatrix, DVector};

/// Weighted Levenberg-Marquardt minimisation of `sum (w (y - f(x, p)))^2`
/// with a forward-difference Jacobian. Returns the final parameters, or
/// `None` if the model never produced a finite cost.
pub(crate) fn levenberg_marquardt<F>(
    model: F,
    x: &[f64],
    y: &[f64],
    w: &[f64],
    initial: Vec<f64>,
    max_iterations: usize,
) -> Option<Vec<f64>>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let m = x.len();
    let n = initial.len();
    let residuals = |p: &[f64]| -> DVector<f64> {
        DVector::from_fn(m, |i, _| w[i] * (y[i] - model(x[i], p)))
    };

    let mut params = initial;
    let mut r = residuals(&params);
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return None;
    }
    let mut lambda = 1e-3;

    for _ in 0..max_iterations {
        let jac = DMatrix::from_fn(m, n, |i, j| {
            let h = 1e-8 * params[j].abs().max(1.0);
            let mut shifted = params.clone();
            shifted[j] += h;
            // d(residual)/dp = -w df/dp
            -w[i] * (model(x[i], &shifted) - model(x[i], &params)) / h
        });
        let jtj = jac.transpose() * &jac;
        let rhs = -(jac.transpose() * &r);

        let mut improved = false;
        while lambda < 1e12 {
            let mut damped = jtj.clone();
            for d in 0..n {
                damped[(d, d)] += lambda * jtj[(d, d)].max(1e-12);
            }
            let Some(step) = damped.lu().solve(&rhs) else {
                lambda *= 10.0;
                continue;
            };
            let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();
            let trial_r = residuals(&trial);
            let trial_cost = trial_r.norm_squared();
            if trial_cost.is_finite() && trial_cost < cost {
                let relative = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                params = trial;
                r = trial_r;
                cost = trial_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = relative > 1e-12;
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            break;
        }
    }
    Some(params)
}

/// Normalised sinc, `sin(pi t) / (pi t)`.
pub(crate) fn sinc(t: f64) -> f64 {
    if t == 0.0 {
        1.0
    } else {
        let a = std::f64::consts::PI * t;
        a.sin() / a
    }
}
