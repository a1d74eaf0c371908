//! Non-negative least squares: `min ‖A·x − b‖₂` subject to `x ≥ 0`.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NnlsError {
    #[error("coefficient matrix has {rows} rows but the observation vector has {len} entries")]
    DimensionMismatch { rows: usize, len: usize },
    #[error("non-finite value in least-squares input")]
    NonFinite,
    #[error("least-squares subproblem failed: {0}")]
    Subproblem(String),
    #[error("active-set iteration did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NnlsSolution {
    pub x: DVector<f64>,
    /// `‖A·x − b‖₂` at the solution.
    pub residual_norm: f64,
    pub iterations: usize,
}

pub trait NnlsSolver: Send + Sync {
    fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<NnlsSolution, NnlsError>;
}

/// Lawson–Hanson active-set method.
///
/// Defaults: at most `3·n` inner iterations and a dual tolerance of
/// `10·ε·max(m, n)·‖A‖₁`.
#[derive(Debug, Clone, Default)]
pub struct LawsonHanson {
    max_iter: Option<usize>,
    tolerance: Option<f64>,
}

impl LawsonHanson {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }
}

impl NnlsSolver for LawsonHanson {
    fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<NnlsSolution, NnlsError> {
        let (m, n) = a.shape();
        if b.len() != m {
            return Err(NnlsError::DimensionMismatch { rows: m, len: b.len() });
        }
        if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(NnlsError::NonFinite);
        }

        let max_iter = self.max_iter.unwrap_or(3 * n.max(1));
        let tol = self
            .tolerance
            .unwrap_or_else(|| 10.0 * f64::EPSILON * m.max(n) as f64 * one_norm(a));

        let mut x = DVector::zeros(n);
        let mut passive = vec![false; n];
        // Columns that failed to enter at the current x.
        let mut rejected = vec![false; n];
        let mut iterations = 0;

        'outer: loop {
            let dual = a.transpose() * (b - a * &x);
            let entering = (0..n)
                .filter(|&j| !passive[j] && !rejected[j] && dual[j] > tol)
                .max_by(|&i, &j| dual[i].total_cmp(&dual[j]));
            let Some(j) = entering else {
                break;
            };
            passive[j] = true;
            let mut just_entered = true;

            loop {
                if iterations >= max_iter {
                    return Err(NnlsError::NotConverged { iterations });
                }
                iterations += 1;

                let z = solve_passive(a, b, &passive)?;
                // The SVD cutoff can pin the entering coordinate at zero; x is
                // unchanged, so try the next candidate.
                if just_entered && z[j] <= 0.0 {
                    passive[j] = false;
                    rejected[j] = true;
                    continue 'outer;
                }
                just_entered = false;
                let blocking: Vec<usize> =
                    (0..n).filter(|&i| passive[i] && z[i] <= 0.0).collect();
                if blocking.is_empty() {
                    x = z;
                    break;
                }

                // Step from x toward z until the first passive coordinate reaches zero.
                let alpha = blocking
                    .iter()
                    .map(|&i| {
                        let denom = x[i] - z[i];
                        if denom > 0.0 {
                            x[i] / denom
                        } else {
                            0.0
                        }
                    })
                    .fold(f64::INFINITY, f64::min);
                let step = alpha * (z - &x);
                x += step;
                for i in 0..n {
                    if passive[i] && x[i] <= tol {
                        passive[i] = false;
                        x[i] = 0.0;
                    }
                }
                if !passive.contains(&true) {
                    break;
                }
            }
            rejected.fill(false);
        }

        let residual_norm = (b - a * &x).norm();
        Ok(NnlsSolution {
            x,
            residual_norm,
            iterations,
        })
    }
}

/// Unconstrained least squares over the passive columns; active coordinates are zero.
fn solve_passive(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    passive: &[bool],
) -> Result<DVector<f64>, NnlsError> {
    let cols: Vec<usize> = (0..passive.len()).filter(|&i| passive[i]).collect();
    if cols.is_empty() {
        return Ok(DVector::zeros(passive.len()));
    }
    let sub = a.select_columns(cols.iter());
    let solved = sub
        .svd(true, true)
        .solve(b, f64::EPSILON)
        .map_err(|e| NnlsError::Subproblem(e.to_string()))?;

    let mut z = DVector::zeros(passive.len());
    for (k, &c) in cols.iter().enumerate() {
        z[c] = solved[k];
    }
    Ok(z)
}

/// Maximum absolute column sum.
fn one_norm(a: &DMatrix<f64>) -> f64 {
    a.column_iter()
        .map(|c| c.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}
