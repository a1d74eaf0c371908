//! Collation matrix assembly, witness partitioning, and factorization input.
//!
//! The full matrix is sparse: rows are substantive readings (one column of the
//! conceptual witness × reading table each), columns are canonical witnesses.
//! After assembly, witnesses are split by completeness into a complete set,
//! which trains the factorization, and a fragmentary set, classified later.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::collation::VariationUnit;
use crate::error::{CollationError, MalformedUnitReason};
use crate::rules::ClassificationRules;
use crate::siglum::{SiglumNormalizer, SiglumTable};
use crate::unit::{ReadingColumn, UnitBuilder, UnitContributions};
use crate::weighting::{Reweighter, WeightingError};

// =============================================================================
// Collation matrix
// =============================================================================

/// Sparse (reading, witness) → weight table built from every variation unit.
#[derive(Debug, Clone, Default)]
pub struct CollationMatrix {
    unit_ids: Vec<String>,
    witnesses: Vec<String>,
    witness_index: HashMap<String, usize>,
    columns: Vec<ReadingColumn>,
    /// Unit index of each column.
    column_unit: Vec<usize>,
    /// (column, witness) → accumulated weight.
    entries: BTreeMap<(usize, usize), f64>,
    /// Per witness, the units where it has a non-zero entry.
    extant_units: Vec<BTreeSet<usize>>,
    sigla: SiglumTable,
}

impl CollationMatrix {
    /// Build every unit, then aggregate. The first malformed unit aborts assembly.
    pub fn assemble(
        units: &[VariationUnit],
        rules: &ClassificationRules,
        normalizer: &SiglumNormalizer,
    ) -> Result<Self, CollationError> {
        let builder = UnitBuilder::new(rules, normalizer);
        let per_unit = units
            .iter()
            .map(|unit| builder.build(unit))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_contributions(per_unit)
    }

    /// Aggregate already-built unit contributions. Weights accumulate additively.
    pub fn from_contributions(units: Vec<UnitContributions>) -> Result<Self, CollationError> {
        let mut matrix = Self::default();
        let mut seen_units: HashSet<String> = HashSet::new();

        for (unit_idx, unit) in units.into_iter().enumerate() {
            if !seen_units.insert(unit.unit_id.clone()) {
                return Err(CollationError::malformed(
                    unit.unit_id,
                    MalformedUnitReason::DuplicateUnitId,
                ));
            }

            let offset = matrix.columns.len();
            for column in unit.columns {
                matrix.columns.push(column);
                matrix.column_unit.push(unit_idx);
            }

            for c in unit.contributions {
                let witness = matrix.witness_slot(&c.witness);
                *matrix.entries.entry((offset + c.column, witness)).or_insert(0.0) += c.weight;
                if c.weight > 0.0 {
                    matrix.extant_units[witness].insert(unit_idx);
                }
                matrix.sigla.record(c.raw_siglum, c.witness);
            }

            matrix.unit_ids.push(unit.unit_id);
        }

        Ok(matrix)
    }

    fn witness_slot(&mut self, witness: &str) -> usize {
        if let Some(&idx) = self.witness_index.get(witness) {
            return idx;
        }
        let idx = self.witnesses.len();
        self.witnesses.push(witness.to_string());
        self.witness_index.insert(witness.to_string(), idx);
        self.extant_units.push(BTreeSet::new());
        idx
    }

    pub fn unit_count(&self) -> usize {
        self.unit_ids.len()
    }

    pub fn unit_ids(&self) -> &[String] {
        &self.unit_ids
    }

    /// Canonical witnesses in order of first appearance.
    pub fn witnesses(&self) -> &[String] {
        &self.witnesses
    }

    pub fn columns(&self) -> &[ReadingColumn] {
        &self.columns
    }

    pub fn sigla(&self) -> &SiglumTable {
        &self.sigla
    }

    pub fn witness_position(&self, witness: &str) -> Option<usize> {
        self.witness_index.get(witness).copied()
    }

    /// Weight of `witness` for reading `reading_id` of unit `unit_id`; zero if absent.
    pub fn weight(&self, witness: &str, unit_id: &str, reading_id: &str) -> f64 {
        let Some(w) = self.witness_position(witness) else {
            return 0.0;
        };
        self.columns
            .iter()
            .position(|c| c.key.unit_id == unit_id && c.key.reading_id == reading_id)
            .and_then(|col| self.entries.get(&(col, w)).copied())
            .unwrap_or(0.0)
    }

    /// Number of units where the witness has at least one non-zero entry.
    pub fn extant_unit_count(&self, witness: usize) -> usize {
        self.extant_units.get(witness).map_or(0, BTreeSet::len)
    }

    pub fn completeness(&self, witness: usize) -> f64 {
        let total = self.unit_count();
        if total == 0 {
            return 0.0;
        }
        self.extant_unit_count(witness) as f64 / total as f64
    }

    /// Dense readings × witnesses copy of the whole matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.columns.len(), self.witnesses.len());
        for (&(col, w), &value) in &self.entries {
            dense[(col, w)] = value;
        }
        dense
    }

    /// Split witnesses by completeness ratio against `min_extant_proportion`.
    pub fn partition(&self, min_extant_proportion: f64) -> Result<WitnessPartition, CollationError> {
        if !(0.0..=1.0).contains(&min_extant_proportion) {
            return Err(CollationError::InvalidConfig(format!(
                "min extant proportion must lie in [0, 1], got {min_extant_proportion}"
            )));
        }

        let mut complete = Vec::new();
        let mut fragmentary = Vec::new();
        let mut completeness = Vec::with_capacity(self.witnesses.len());
        for (idx, witness) in self.witnesses.iter().enumerate() {
            let ratio = self.completeness(idx);
            if ratio >= min_extant_proportion {
                complete.push(idx);
            } else {
                fragmentary.push(idx);
            }
            completeness.push(WitnessCompleteness {
                witness: witness.clone(),
                extant_units: self.extant_unit_count(idx),
                ratio,
            });
        }

        Ok(WitnessPartition {
            threshold: min_extant_proportion,
            unit_count: self.unit_count(),
            complete,
            fragmentary,
            completeness,
        })
    }

    /// Factorization input: complete witnesses only, readings with no complete
    /// support dropped. Fragmentary rows are restricted to units the witness is
    /// extant in.
    pub fn training_set(&self, partition: &WitnessPartition) -> Result<TrainingSet, CollationError> {
        if partition.complete.is_empty() {
            return Err(CollationError::empty_matrix(format!(
                "no witness reaches the completeness threshold {}",
                partition.threshold
            )));
        }

        let mut complete_pos: HashMap<usize, usize> = HashMap::new();
        for (pos, &w) in partition.complete.iter().enumerate() {
            complete_pos.insert(w, pos);
        }

        let mut totals = vec![0.0; self.columns.len()];
        for (&(col, w), &value) in &self.entries {
            if complete_pos.contains_key(&w) {
                totals[col] += value;
            }
        }

        let kept: Vec<usize> = (0..self.columns.len()).filter(|&c| totals[c] > 0.0).collect();
        if kept.is_empty() {
            return Err(CollationError::empty_matrix(
                "no substantive reading is attested by a complete witness",
            ));
        }
        let mut row_of = vec![None; self.columns.len()];
        for (row, &col) in kept.iter().enumerate() {
            row_of[col] = Some(row);
        }

        let mut matrix = DMatrix::zeros(kept.len(), partition.complete.len());
        for (&(col, w), &value) in &self.entries {
            if let (Some(row), Some(&pos)) = (row_of[col], complete_pos.get(&w)) {
                matrix[(row, pos)] = value;
            }
        }

        let fragmentary = partition
            .fragmentary
            .iter()
            .map(|&w| {
                let extant = &self.extant_units[w];
                let mut rows = Vec::new();
                let mut values = Vec::new();
                for (row, &col) in kept.iter().enumerate() {
                    if extant.contains(&self.column_unit[col]) {
                        rows.push(row);
                        values.push(self.entries.get(&(col, w)).copied().unwrap_or(0.0));
                    }
                }
                FragmentaryWitness {
                    witness: self.witnesses[w].clone(),
                    rows,
                    values,
                }
            })
            .collect();

        Ok(TrainingSet {
            readings: kept.iter().map(|&c| self.columns[c].clone()).collect(),
            witnesses: partition
                .complete
                .iter()
                .map(|&w| self.witnesses[w].clone())
                .collect(),
            matrix,
            fragmentary,
        })
    }
}

// =============================================================================
// Partition
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessCompleteness {
    pub witness: String,
    pub extant_units: usize,
    pub ratio: f64,
}

/// Complete / fragmentary split of the matrix witnesses. Fixed once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct WitnessPartition {
    threshold: f64,
    unit_count: usize,
    complete: Vec<usize>,
    fragmentary: Vec<usize>,
    /// Indexed like the matrix witnesses.
    completeness: Vec<WitnessCompleteness>,
}

impl WitnessPartition {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn unit_count(&self) -> usize {
        self.unit_count
    }

    pub fn complete(&self) -> impl Iterator<Item = &WitnessCompleteness> + '_ {
        self.complete.iter().map(|&w| &self.completeness[w])
    }

    pub fn fragmentary(&self) -> impl Iterator<Item = &WitnessCompleteness> + '_ {
        self.fragmentary.iter().map(|&w| &self.completeness[w])
    }

    pub fn complete_count(&self) -> usize {
        self.complete.len()
    }

    pub fn fragmentary_count(&self) -> usize {
        self.fragmentary.len()
    }

    pub fn is_complete(&self, witness: &str) -> bool {
        self.complete().any(|c| c.witness == witness)
    }
}

// =============================================================================
// Factorization input
// =============================================================================

/// One fragmentary witness, restricted to the training rows it could attest.
///
/// `rows` index [`TrainingSet::readings`]; rows of units where the witness is
/// lacunose are absent, not zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentaryWitness {
    pub witness: String,
    pub rows: Vec<usize>,
    pub values: Vec<f64>,
}

/// Complete-witness matrix handed to the factorizer, plus fragmentary rows.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub readings: Vec<ReadingColumn>,
    pub witnesses: Vec<String>,
    /// Readings × complete witnesses.
    pub matrix: DMatrix<f64>,
    pub fragmentary: Vec<FragmentaryWitness>,
}

impl TrainingSet {
    pub fn reading_labels(&self) -> Vec<String> {
        self.readings.iter().map(ReadingColumn::label).collect()
    }

    /// Scale every reading row by weights fitted on the complete witnesses, then
    /// drop rows left without complete support. Returns the number of rows dropped.
    pub fn reweight(&mut self, reweighter: &dyn Reweighter) -> Result<usize, CollationError> {
        let weights = reweighter.fit(&self.matrix)?;
        if weights.len() != self.readings.len() {
            return Err(WeightingError::LengthMismatch {
                expected: self.readings.len(),
                got: weights.len(),
            }
            .into());
        }
        if let Some(row) = weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(WeightingError::InvalidWeight {
                row,
                weight: weights[row],
            }
            .into());
        }

        for (row, &scale) in weights.iter().enumerate() {
            self.matrix.row_mut(row).scale_mut(scale);
        }
        for witness in &mut self.fragmentary {
            for (value, &row) in witness.values.iter_mut().zip(&witness.rows) {
                *value *= weights[row];
            }
        }

        let dropped = self.prune_empty_readings();
        if self.readings.is_empty() {
            return Err(CollationError::empty_matrix(
                "every reading was weighted to zero",
            ));
        }
        Ok(dropped)
    }

    /// Remove reading rows whose complete-witness total is zero.
    pub fn prune_empty_readings(&mut self) -> usize {
        let keep: Vec<bool> = (0..self.matrix.nrows())
            .map(|row| self.matrix.row(row).sum() > 0.0)
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            self.retain_rows(&keep);
        }
        dropped
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        let mut new_row = vec![None; keep.len()];
        let mut next = 0;
        for (row, &k) in keep.iter().enumerate() {
            if k {
                new_row[row] = Some(next);
                next += 1;
            }
        }

        let kept_rows: Vec<usize> = (0..keep.len()).filter(|&r| keep[r]).collect();
        self.matrix = self.matrix.select_rows(kept_rows.iter());
        self.readings = kept_rows.iter().map(|&r| self.readings[r].clone()).collect();

        for witness in &mut self.fragmentary {
            let mut rows = Vec::with_capacity(witness.rows.len());
            let mut values = Vec::with_capacity(witness.values.len());
            for (&row, &value) in witness.rows.iter().zip(&witness.values) {
                if let Some(mapped) = new_row[row] {
                    rows.push(mapped);
                    values.push(value);
                }
            }
            witness.rows = rows;
            witness.values = values;
        }
    }
}
