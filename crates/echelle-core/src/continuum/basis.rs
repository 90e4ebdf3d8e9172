//! Linear bases for the continuum fit and their weighted least-squares solve.

use nalgebra::{DMatrix, DVector};

use crate::consts::LSTSQ_SINGULAR_EPS;

/// Affine map of `[lo, hi]` onto `[-1, 1]`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Domain {
    mid: f64,
    half: f64,
}

impl Domain {
    pub fn spanning(x: &[f64]) -> Self {
        let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let half = (hi - lo) / 2.0;
        Self {
            mid: (hi + lo) / 2.0,
            half: if half > 0.0 { half } else { 1.0 },
        }
    }

    pub fn map(&self, x: f64) -> f64 {
        (x - self.mid) / self.half
    }
}

/// Polynomial family evaluated on the mapped domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Family {
    Power,
    Legendre,
    Chebyshev,
}

/// The first `n` terms of a family at `u`.
pub(crate) fn family_terms(family: Family, u: f64, n: usize) -> Vec<f64> {
    let mut terms = Vec::with_capacity(n);
    for k in 0..n {
        let v = match k {
            0 => 1.0,
            1 => u,
            _ => {
                let (p1, p2) = (terms[k - 1], terms[k - 2]);
                match family {
                    Family::Power => p1 * u,
                    Family::Chebyshev => 2.0 * u * p1 - p2,
                    Family::Legendre => {
                        let kf = k as f64;
                        ((2.0 * kf - 1.0) * u * p1 - (kf - 1.0) * p2) / kf
                    }
                }
            }
        };
        terms.push(v);
    }
    terms
}

/// A clamped B-spline basis of a given degree.
#[derive(Clone, Debug)]
pub(crate) struct BSpline {
    degree: usize,
    knots: Vec<f64>,
}

impl BSpline {
    /// Full knot vector `[lo; k+1] ++ interior ++ [hi; k+1]`. Interior knots
    /// outside the open interval `(lo, hi)` are dropped.
    pub fn new(degree: usize, lo: f64, hi: f64, interior: &[f64]) -> Self {
        let mut knots = vec![lo; degree + 1];
        knots.extend(interior.iter().copied().filter(|&t| t > lo && t < hi));
        knots.extend(std::iter::repeat(hi).take(degree + 1));
        Self { degree, knots }
    }

    pub fn num_basis(&self) -> usize {
        self.knots.len() - self.degree - 1
    }

    /// Index of the first non-zero basis function at `x` and the
    /// `degree + 1` values from there. Points outside the knot range use the
    /// boundary polynomial piece.
    fn local_values(&self, x: f64) -> (usize, Vec<f64>) {
        let p = self.degree;
        let t = &self.knots;
        let nb = self.num_basis();

        let mu = if x >= t[nb] {
            nb - 1
        } else if x < t[p] {
            p
        } else {
            let mut span = p;
            while span < nb && x >= t[span + 1] {
                span += 1;
            }
            span
        };

        let mut n = vec![0.0; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        n[0] = 1.0;
        for d in 1..=p {
            left[d] = x - t[mu + 1 - d];
            right[d] = t[mu + d] - x;
            let mut saved = 0.0;
            for r in 0..d {
                let den = right[r + 1] + left[d - r];
                let temp = if den.abs() > 1e-12 { n[r] / den } else { 0.0 };
                n[r] = saved + right[r + 1] * temp;
                saved = left[d - r] * temp;
            }
            n[d] = saved;
        }
        (mu - p, n)
    }

    pub fn row(&self, x: f64) -> Vec<f64> {
        let mut row = vec![0.0; self.num_basis()];
        let (first, values) = self.local_values(x);
        for (j, v) in values.into_iter().enumerate() {
            row[first + j] = v;
        }
        row
    }
}

/// Solve `min || diag(w) (A c - y) ||` by SVD.
pub(crate) fn weighted_lstsq(rows: &[Vec<f64>], y: &[f64], w: &[f64]) -> Option<Vec<f64>> {
    let m = rows.len();
    let n = rows.first()?.len();
    let a = DMatrix::from_fn(m, n, |i, j| rows[i][j] * w[i]);
    let b = DVector::from_fn(m, |i, _| y[i] * w[i]);

    let svd = a.svd(true, true);
    let max_sv = svd.singular_values.iter().copied().fold(0.0, f64::max);
    let solution = svd.solve(&b, LSTSQ_SINGULAR_EPS * max_sv).ok()?;
    solution
        .iter()
        .all(|c| c.is_finite())
        .then(|| solution.iter().copied().collect())
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
