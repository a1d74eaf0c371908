//! Group assignment for complete and fragmentary witnesses.
//!
//! Complete witnesses read their memberships straight off the mixture matrix.
//! Each fragmentary witness is fitted on its own: the basis is restricted to
//! the rows the witness could attest and NNLS finds non-negative group
//! coefficients. Witnesses never share a solve, so one witness's result cannot
//! depend on which other fragmentary witnesses are present.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::FragmentaryWitness;
use crate::nnls::{NnlsError, NnlsSolver};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassificationError {
    #[error("witness attests none of the readings kept for factorization")]
    NoAttestedReadings,
    #[error("row {row} is outside the basis ({rows} rows)")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("row and value counts differ ({rows} rows, {values} values)")]
    LengthMismatch { rows: usize, values: usize },
    #[error("nnls failed: {0}")]
    Solver(#[from] NnlsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    Mixture,
    Nnls,
}

/// Group memberships of one witness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub witness: String,
    pub source: AssignmentSource,
    /// One non-negative coefficient per group.
    pub groups: Vec<f64>,
    pub residual_norm: f64,
    /// Reading rows that entered the fit.
    pub readings_used: usize,
}

impl GroupAssignment {
    /// Group with the largest coefficient; `None` when every coefficient is zero.
    pub fn dominant_group(&self) -> Option<usize> {
        let (idx, value) = self
            .groups
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (k, &v)| if v > best.1 { (k, v) } else { best });
        (value > 0.0).then_some(idx)
    }

    /// Rescale so coefficients sum to one. All-zero assignments are left as is.
    pub fn normalized(mut self) -> Self {
        let total: f64 = self.groups.iter().sum();
        if total > 0.0 {
            for g in &mut self.groups {
                *g /= total;
            }
        }
        self
    }
}

/// Assignments for complete witnesses, one per mixture column.
pub fn mixture_assignments(
    witnesses: &[String],
    matrix: &DMatrix<f64>,
    basis: &DMatrix<f64>,
    mixture: &DMatrix<f64>,
) -> Vec<GroupAssignment> {
    let reconstruction = basis * mixture;
    witnesses
        .iter()
        .enumerate()
        .map(|(j, witness)| GroupAssignment {
            witness: witness.clone(),
            source: AssignmentSource::Mixture,
            groups: mixture.column(j).iter().copied().collect(),
            residual_norm: (matrix.column(j) - reconstruction.column(j)).norm(),
            readings_used: matrix.nrows(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentaryOutcome {
    pub witness: String,
    pub result: Result<GroupAssignment, ClassificationError>,
}

pub struct FragmentaryClassifier<'a> {
    basis: &'a DMatrix<f64>,
    solver: &'a dyn NnlsSolver,
    normalize: bool,
}

impl<'a> FragmentaryClassifier<'a> {
    pub fn new(basis: &'a DMatrix<f64>, solver: &'a dyn NnlsSolver) -> Self {
        Self {
            basis,
            solver,
            normalize: false,
        }
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn classify(&self, witness: &FragmentaryWitness) -> Result<GroupAssignment, ClassificationError> {
        if witness.rows.len() != witness.values.len() {
            return Err(ClassificationError::LengthMismatch {
                rows: witness.rows.len(),
                values: witness.values.len(),
            });
        }
        if witness.rows.is_empty() {
            return Err(ClassificationError::NoAttestedReadings);
        }
        let rows = self.basis.nrows();
        if let Some(&row) = witness.rows.iter().find(|&&r| r >= rows) {
            return Err(ClassificationError::RowOutOfRange { row, rows });
        }

        let a = self.basis.select_rows(witness.rows.iter());
        let b = DVector::from_column_slice(&witness.values);
        let solution = self.solver.solve(&a, &b)?;

        let assignment = GroupAssignment {
            witness: witness.witness.clone(),
            source: AssignmentSource::Nnls,
            groups: solution.x.iter().copied().collect(),
            residual_norm: solution.residual_norm,
            readings_used: witness.rows.len(),
        };
        Ok(if self.normalize {
            assignment.normalized()
        } else {
            assignment
        })
    }

    /// Classify each witness independently; failures stay per witness.
    pub fn classify_all(&self, witnesses: &[FragmentaryWitness]) -> Vec<FragmentaryOutcome> {
        witnesses
            .iter()
            .map(|w| FragmentaryOutcome {
                witness: w.witness.clone(),
                result: self.classify(w),
            })
            .collect()
    }
}
