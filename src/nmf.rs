//! Non-negative matrix factorization and rank estimation.
//!
//! `V ≈ W·H` with `V` readings × witnesses, `W` (basis) readings × rank and
//! `H` (mixture) rank × witnesses. Column `k` of the basis is the reading
//! profile of group `k`; column `j` of the mixture is witness `j`'s group
//! membership.
//!
//! The default factorizer runs Lee–Seung multiplicative updates on the
//! Frobenius objective. Updates preserve non-negativity so no projection is
//! needed; entries seeded at exactly zero stay zero, which is why NNDSVD
//! seeding fills its zeros with the matrix mean.

use std::time::Instant;

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Guard added to update denominators.
const EPS: f64 = 1e-12;

/// Floor applied to random seeds so every factor entry can move.
const SEED_FLOOR: f64 = 1e-6;

// =============================================================================
// Configuration and results
// =============================================================================

/// How the factors are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    /// Deterministic SVD-based seeding (NNDSVD with mean fill).
    #[default]
    Nndsvd,
    /// Averages of randomly chosen columns / rows of the input.
    RandomVcol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmfConfig {
    pub init: Init,
    pub max_iter: usize,
    /// Stop when the relative change of the residual drops to this value.
    pub tolerance: f64,
    /// Random restarts per rank during rank estimation.
    pub n_run: usize,
    /// Iteration cap for each estimation restart.
    pub estimation_max_iter: usize,
    pub seed: u64,
}

impl Default for NmfConfig {
    fn default() -> Self {
        Self {
            init: Init::Nndsvd,
            max_iter: 100,
            tolerance: 1e-6,
            n_run: 10,
            estimation_max_iter: 10,
            seed: 1337,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactorizationParams {
    pub rank: usize,
    pub init: Init,
    pub max_iter: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl FactorizationParams {
    pub fn from_config(config: &NmfConfig, rank: usize) -> Self {
        Self {
            rank,
            init: config.init,
            max_iter: config.max_iter,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }
}

/// Quality measures of one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub rank: usize,
    pub n_iter: usize,
    /// Residual sum of squares `‖V − W·H‖²`.
    pub rss: f64,
    /// Explained variance `1 − rss / ‖V‖²`.
    pub evar: f64,
    /// Mean Hoyer sparseness of the basis columns.
    pub basis_sparseness: f64,
    /// Mean Hoyer sparseness of the mixture columns.
    pub mixture_sparseness: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone)]
pub struct Factorization {
    /// Readings × rank.
    pub basis: DMatrix<f64>,
    /// Rank × witnesses.
    pub mixture: DMatrix<f64>,
    pub summary: FitSummary,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NmfError {
    #[error("cannot factor an empty {rows}x{cols} matrix")]
    EmptyMatrix { rows: usize, cols: usize },
    #[error("rank {rank} is outside 1..={max}")]
    InvalidRank { rank: usize, max: usize },
    #[error("rank range {min}..={max} is empty or starts at zero")]
    InvalidRankRange { min: usize, max: usize },
    #[error("negative or non-finite entry at row {row}, column {col}")]
    InvalidEntry { row: usize, col: usize },
    #[error("residual became non-finite after {iterations} iterations")]
    Diverged { iterations: usize },
}

pub trait Factorizer: Send + Sync {
    fn factorize(
        &self,
        matrix: &DMatrix<f64>,
        params: &FactorizationParams,
    ) -> Result<Factorization, NmfError>;
}

// =============================================================================
// Multiplicative updates
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct MultiplicativeNmf;

impl Factorizer for MultiplicativeNmf {
    fn factorize(
        &self,
        matrix: &DMatrix<f64>,
        params: &FactorizationParams,
    ) -> Result<Factorization, NmfError> {
        validate(matrix, params.rank)?;
        let started = Instant::now();

        let (mut basis, mut mixture) = match params.init {
            Init::Nndsvd => nndsvd(matrix, params.rank),
            Init::RandomVcol => {
                let mut rng = StdRng::seed_from_u64(params.seed);
                random_vcol(matrix, params.rank, &mut rng)
            }
        };

        let mut previous = residual_sum_of_squares(matrix, &basis, &mixture);
        let mut n_iter = 0;
        for iteration in 1..=params.max_iter {
            update_mixture(matrix, &basis, &mut mixture);
            update_basis(matrix, &mut basis, &mixture);

            let rss = residual_sum_of_squares(matrix, &basis, &mixture);
            if !rss.is_finite() {
                return Err(NmfError::Diverged { iterations: iteration });
            }
            n_iter = iteration;
            let converged = (previous - rss).abs() <= params.tolerance * previous.max(EPS);
            previous = rss;
            if converged {
                break;
            }
        }

        let summary = summarize(matrix, &basis, &mixture, n_iter, started);
        Ok(Factorization {
            basis,
            mixture,
            summary,
        })
    }
}

fn validate(matrix: &DMatrix<f64>, rank: usize) -> Result<(), NmfError> {
    let (rows, cols) = matrix.shape();
    if rows == 0 || cols == 0 {
        return Err(NmfError::EmptyMatrix { rows, cols });
    }
    let max = rows.min(cols);
    if rank == 0 || rank > max {
        return Err(NmfError::InvalidRank { rank, max });
    }
    for col in 0..cols {
        for row in 0..rows {
            let value = matrix[(row, col)];
            if !value.is_finite() || value < 0.0 {
                return Err(NmfError::InvalidEntry { row, col });
            }
        }
    }
    Ok(())
}

fn update_mixture(v: &DMatrix<f64>, w: &DMatrix<f64>, h: &mut DMatrix<f64>) {
    let wt = w.transpose();
    let numer = &wt * v;
    let denom = (&wt * w) * &*h;
    for (value, (n, d)) in h.iter_mut().zip(numer.iter().zip(denom.iter())) {
        *value *= n / (d + EPS);
    }
}

fn update_basis(v: &DMatrix<f64>, w: &mut DMatrix<f64>, h: &DMatrix<f64>) {
    let ht = h.transpose();
    let numer = v * &ht;
    let denom = &*w * (h * &ht);
    for (value, (n, d)) in w.iter_mut().zip(numer.iter().zip(denom.iter())) {
        *value *= n / (d + EPS);
    }
}

pub fn residual_sum_of_squares(v: &DMatrix<f64>, w: &DMatrix<f64>, h: &DMatrix<f64>) -> f64 {
    (v - w * h).norm_squared()
}

fn summarize(
    v: &DMatrix<f64>,
    w: &DMatrix<f64>,
    h: &DMatrix<f64>,
    n_iter: usize,
    started: Instant,
) -> FitSummary {
    let rss = residual_sum_of_squares(v, w, h);
    let total = v.norm_squared();
    FitSummary {
        rank: w.ncols(),
        n_iter,
        rss,
        evar: if total > 0.0 { 1.0 - rss / total } else { 0.0 },
        basis_sparseness: mean_column_sparseness(w),
        mixture_sparseness: mean_column_sparseness(h),
        elapsed_secs: started.elapsed().as_secs_f64(),
    }
}

// =============================================================================
// Seeding
// =============================================================================

/// NNDSVD (Boutsidis & Gallopoulos) with zeros replaced by `mean(V)`.
fn nndsvd(v: &DMatrix<f64>, rank: usize) -> (DMatrix<f64>, DMatrix<f64>) {
    let (rows, cols) = v.shape();
    let mut w = DMatrix::zeros(rows, rank);
    let mut h = DMatrix::zeros(rank, cols);

    let svd = v.clone().svd(true, true);
    if let (Some(u), Some(v_t)) = (svd.u.as_ref(), svd.v_t.as_ref()) {
        let values = &svd.singular_values;
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        for (k, &idx) in order.iter().take(rank).enumerate() {
            let sigma = values[idx];
            let x: Vec<f64> = u.column(idx).iter().copied().collect();
            let y: Vec<f64> = v_t.row(idx).iter().copied().collect();

            if k == 0 {
                // Leading singular vectors of a non-negative matrix share a sign.
                let scale = sigma.sqrt();
                for (i, xi) in x.iter().enumerate() {
                    w[(i, 0)] = scale * xi.abs();
                }
                for (j, yj) in y.iter().enumerate() {
                    h[(0, j)] = scale * yj.abs();
                }
                continue;
            }

            let (xp, xn) = split_signs(&x);
            let (yp, yn) = split_signs(&y);
            let (xp_norm, xn_norm) = (l2(&xp), l2(&xn));
            let (yp_norm, yn_norm) = (l2(&yp), l2(&yn));
            let positive = xp_norm * yp_norm;
            let negative = xn_norm * yn_norm;

            let (uu, vv, uu_norm, vv_norm, mass) = if positive >= negative {
                (xp, yp, xp_norm, yp_norm, positive)
            } else {
                (xn, yn, xn_norm, yn_norm, negative)
            };
            if mass <= 0.0 {
                continue;
            }
            let scale = (sigma * mass).sqrt();
            for (i, ui) in uu.iter().enumerate() {
                w[(i, k)] = scale * ui / uu_norm;
            }
            for (j, vj) in vv.iter().enumerate() {
                h[(k, j)] = scale * vj / vv_norm;
            }
        }
    }

    let mean = v.mean();
    let fill = if mean > 0.0 { mean } else { SEED_FLOOR };
    for value in w.iter_mut().chain(h.iter_mut()) {
        if *value <= EPS {
            *value = fill;
        }
    }
    (w, h)
}

fn split_signs(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let positive = values.iter().map(|v| v.max(0.0)).collect();
    let negative = values.iter().map(|v| (-v).max(0.0)).collect();
    (positive, negative)
}

fn l2(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Each basis column averages `ceil(cols / 5)` random columns of `V`; each
/// mixture row averages `ceil(rows / 5)` random rows.
fn random_vcol(v: &DMatrix<f64>, rank: usize, rng: &mut StdRng) -> (DMatrix<f64>, DMatrix<f64>) {
    let (rows, cols) = v.shape();
    let p_col = cols.div_ceil(5).max(1);
    let p_row = rows.div_ceil(5).max(1);
    let mut w = DMatrix::zeros(rows, rank);
    let mut h = DMatrix::zeros(rank, cols);

    for k in 0..rank {
        for _ in 0..p_col {
            let src = rng.gen_range(0..cols);
            for i in 0..rows {
                w[(i, k)] += v[(i, src)] / p_col as f64;
            }
        }
        for _ in 0..p_row {
            let src = rng.gen_range(0..rows);
            for j in 0..cols {
                h[(k, j)] += v[(src, j)] / p_row as f64;
            }
        }
    }

    for value in w.iter_mut().chain(h.iter_mut()) {
        *value += SEED_FLOOR * (1.0 + rng.gen::<f64>());
    }
    (w, h)
}

// =============================================================================
// Sparseness
// =============================================================================

/// Hoyer sparseness: 0 for a flat vector, 1 for a single non-zero entry.
pub fn hoyer_sparseness(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 1 {
        return 0.0;
    }
    let l1: f64 = values.iter().map(|v| v.abs()).sum();
    let l2 = l2(values);
    if l2 <= EPS {
        return 0.0;
    }
    let root = (n as f64).sqrt();
    ((root - l1 / l2) / (root - 1.0)).clamp(0.0, 1.0)
}

fn mean_column_sparseness(m: &DMatrix<f64>) -> f64 {
    if m.ncols() == 0 {
        return 0.0;
    }
    let total: f64 = m
        .column_iter()
        .map(|c| hoyer_sparseness(&c.iter().copied().collect::<Vec<_>>()))
        .sum();
    total / m.ncols() as f64
}

// =============================================================================
// Rank estimation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    pub rank: usize,
    /// Cophenetic correlation of the consensus matrix over all restarts.
    pub cophenetic: f64,
    /// Remaining fields come from the restart with the lowest residual.
    pub rss: f64,
    pub evar: f64,
    pub basis_sparseness: f64,
    pub mixture_sparseness: f64,
}

/// Fit every rank in `min_rank..=max_rank` with `config.n_run` random restarts.
pub fn estimate_rank(
    factorizer: &dyn Factorizer,
    matrix: &DMatrix<f64>,
    min_rank: usize,
    max_rank: usize,
    config: &NmfConfig,
) -> Result<Vec<RankMetrics>, NmfError> {
    if min_rank == 0 || min_rank > max_rank {
        return Err(NmfError::InvalidRankRange {
            min: min_rank,
            max: max_rank,
        });
    }
    let limit = matrix.nrows().min(matrix.ncols());
    if max_rank > limit {
        return Err(NmfError::InvalidRank {
            rank: max_rank,
            max: limit,
        });
    }

    let runs = config.n_run.max(1);
    let witnesses = matrix.ncols();
    let mut metrics = Vec::with_capacity(max_rank - min_rank + 1);

    for rank in min_rank..=max_rank {
        let mut consensus = DMatrix::zeros(witnesses, witnesses);
        let mut best: Option<FitSummary> = None;

        for run in 0..runs {
            let params = FactorizationParams {
                rank,
                init: Init::RandomVcol,
                max_iter: config.estimation_max_iter,
                tolerance: config.tolerance,
                seed: config.seed.wrapping_add(run as u64),
            };
            let fit = factorizer.factorize(matrix, &params)?;
            add_connectivity(&mut consensus, &fit.mixture);
            if best.as_ref().map_or(true, |b| fit.summary.rss < b.rss) {
                best = Some(fit.summary);
            }
        }
        consensus /= runs as f64;

        if let Some(best) = best {
            metrics.push(RankMetrics {
                rank,
                cophenetic: cophenetic_correlation(&consensus),
                rss: best.rss,
                evar: best.evar,
                basis_sparseness: best.basis_sparseness,
                mixture_sparseness: best.mixture_sparseness,
            });
        }
    }
    Ok(metrics)
}

/// Index of the largest mixture coefficient of each witness. Ties go to the lower group.
pub fn dominant_groups(mixture: &DMatrix<f64>) -> Vec<usize> {
    mixture
        .column_iter()
        .map(|col| {
            let mut best = 0;
            for (k, &value) in col.iter().enumerate() {
                if value > col[best] {
                    best = k;
                }
            }
            best
        })
        .collect()
}

fn add_connectivity(consensus: &mut DMatrix<f64>, mixture: &DMatrix<f64>) {
    let labels = dominant_groups(mixture);
    for i in 0..labels.len() {
        for j in 0..labels.len() {
            if labels[i] == labels[j] {
                consensus[(i, j)] += 1.0;
            }
        }
    }
}

/// Pearson correlation between `1 − consensus` and its average-linkage
/// cophenetic distances. Degenerate inputs (fewer than three witnesses or no
/// variance) count as perfectly stable.
pub fn cophenetic_correlation(consensus: &DMatrix<f64>) -> f64 {
    let n = consensus.nrows();
    if n < 3 {
        return 1.0;
    }
    let distance = consensus.map(|c| 1.0 - c);
    let cophenetic = average_linkage_cophenetic(&distance);

    let mut xs = Vec::with_capacity(n * (n - 1) / 2);
    let mut ys = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            xs.push(distance[(i, j)]);
            ys.push(cophenetic[(i, j)]);
        }
    }
    pearson(&xs, &ys).unwrap_or(1.0)
}

/// UPGMA merge heights between every pair of leaves.
fn average_linkage_cophenetic(distance: &DMatrix<f64>) -> DMatrix<f64> {
    let n = distance.nrows();
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut active = vec![true; n];
    let mut d = distance.clone();
    let mut cophenetic = DMatrix::zeros(n, n);

    for _ in 1..n {
        let mut closest: Option<(usize, usize, f64)> = None;
        for a in 0..n {
            if !active[a] {
                continue;
            }
            for b in (a + 1)..n {
                if active[b] && closest.map_or(true, |(_, _, best)| d[(a, b)] < best) {
                    closest = Some((a, b, d[(a, b)]));
                }
            }
        }
        let Some((a, b, height)) = closest else {
            break;
        };

        for &i in &members[a] {
            for &j in &members[b] {
                cophenetic[(i, j)] = height;
                cophenetic[(j, i)] = height;
            }
        }

        let na = members[a].len() as f64;
        let nb = members[b].len() as f64;
        for k in 0..n {
            if active[k] && k != a && k != b {
                let merged = (na * d[(a, k)] + nb * d[(b, k)]) / (na + nb);
                d[(a, k)] = merged;
                d[(k, a)] = merged;
            }
        }
        let absorbed = std::mem::take(&mut members[b]);
        members[a].extend(absorbed);
        active[b] = false;
    }
    cophenetic
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    if xs.is_empty() {
        return None;
    }
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx) * (x - mx);
        vy += (y - my) * (y - my);
    }
    if vx <= EPS || vy <= EPS {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}
