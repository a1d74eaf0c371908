//! Serializable run reports and matrix exports.

use std::io::{self, Write};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::classify::GroupAssignment;
use crate::matrix::{CollationMatrix, WitnessCompleteness};
use crate::nmf::FitSummary;
use crate::pipeline::{PipelineOutput, PreparedCollation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub threshold: f64,
    pub unit_count: usize,
    pub complete: Vec<WitnessCompleteness>,
    pub fragmentary: Vec<WitnessCompleteness>,
}

/// Basis row: a reading's weight in each group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub reading: String,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFailure {
    pub witness: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorizationReport {
    pub summary: FitSummary,
    pub partition: PartitionSummary,
    pub group_profiles: Vec<GroupProfile>,
    pub witness_groupings: Vec<GroupAssignment>,
    pub fragmentary_witness_groups: Vec<GroupAssignment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragmentary_failures: Vec<ClassificationFailure>,
}

impl FactorizationReport {
    pub fn new(prepared: &PreparedCollation, output: &PipelineOutput) -> Self {
        let basis = &output.factorization.basis;
        let group_profiles = output
            .readings
            .iter()
            .enumerate()
            .map(|(row, reading)| GroupProfile {
                reading: reading.label(),
                weights: basis.row(row).iter().copied().collect(),
            })
            .collect();

        let mut fragmentary_witness_groups = Vec::new();
        let mut fragmentary_failures = Vec::new();
        for outcome in &output.fragmentary {
            match &outcome.result {
                Ok(assignment) => fragmentary_witness_groups.push(assignment.clone()),
                Err(err) => fragmentary_failures.push(ClassificationFailure {
                    witness: outcome.witness.clone(),
                    error: err.to_string(),
                }),
            }
        }

        let partition = &prepared.partition;
        Self {
            summary: output.factorization.summary.clone(),
            partition: PartitionSummary {
                threshold: partition.threshold(),
                unit_count: partition.unit_count(),
                complete: partition.complete().cloned().collect(),
                fragmentary: partition.fragmentary().cloned().collect(),
            },
            group_profiles,
            witness_groupings: output.witness_groups.clone(),
            fragmentary_witness_groups,
            fragmentary_failures,
        }
    }
}

/// Dense labelled matrix, readings as rows and witnesses as columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixTable {
    pub readings: Vec<String>,
    pub witnesses: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl MatrixTable {
    pub fn from_dense(readings: Vec<String>, witnesses: Vec<String>, matrix: &DMatrix<f64>) -> Self {
        let values = matrix
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        Self {
            readings,
            witnesses,
            values,
        }
    }

    /// Every witness, complete or not, over every reading column.
    pub fn full(matrix: &CollationMatrix) -> Self {
        Self::from_dense(
            matrix.columns().iter().map(|c| c.label()).collect(),
            matrix.witnesses().to_vec(),
            &matrix.to_dense(),
        )
    }

    /// The (possibly weighted) complete-witness matrix handed to the factorizer.
    pub fn training(prepared: &PreparedCollation) -> Self {
        let training = &prepared.training;
        Self::from_dense(
            training.reading_labels(),
            training.witnesses.clone(),
            &training.matrix,
        )
    }

    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        let mut header = vec![csv_field("reading")];
        header.extend(self.witnesses.iter().map(|w| csv_field(w)));
        writeln!(out, "{}", header.join(","))?;
        for (reading, row) in self.readings.iter().zip(&self.values) {
            let mut fields = vec![csv_field(reading)];
            fields.extend(row.iter().map(|v| v.to_string()));
            writeln!(out, "{}", fields.join(","))?;
        }
        Ok(())
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
