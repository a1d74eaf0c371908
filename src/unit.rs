//! Per-unit matrix contributions.
//!
//! A unit is folded left to right with one cursor, the most recent substantive
//! reading. Substantive readings open a column and move the cursor; trivial
//! readings credit the cursor; ambiguous readings split one unit of support over
//! the earlier substantive readings they name.
//!
//! Collapsing assumes trivial categories are totally ordered by their listing.
//! When two trivial categories are parallel, whichever substantive reading was
//! listed last absorbs both. This is a known modeling limit of the ordering
//! contract and is kept as is.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collation::{Reading, VariationUnit};
use crate::error::{CollationError, MalformedUnitReason};
use crate::rules::{ClassificationRules, ReadingRole};
use crate::siglum::SiglumNormalizer;

/// Globally unique identity of a substantive reading.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReadingKey {
    pub unit_id: String,
    pub reading_id: String,
}

impl ReadingKey {
    pub fn new(unit_id: impl Into<String>, reading_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            reading_id: reading_id.into(),
        }
    }
}

impl fmt::Display for ReadingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.unit_id, self.reading_id)
    }
}

/// A matrix column: one substantive reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingColumn {
    pub key: ReadingKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ReadingColumn {
    /// `"<unit> <reading>"`, followed by the reading text when known.
    pub fn label(&self) -> String {
        match &self.text {
            Some(text) if !text.is_empty() => format!("{} {}", self.key, text),
            _ => self.key.to_string(),
        }
    }
}

/// One weighted (witness, column) emission.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution {
    pub witness: String,
    /// Siglum as written in the apparatus, before suffix stripping.
    pub raw_siglum: String,
    /// Index into [`UnitContributions::columns`].
    pub column: usize,
    pub weight: f64,
}

/// Everything one variation unit adds to the collation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitContributions {
    pub unit_id: String,
    pub columns: Vec<ReadingColumn>,
    pub contributions: Vec<Contribution>,
}

impl UnitContributions {
    /// Accumulated weight per (witness, column).
    pub fn weights(&self) -> BTreeMap<(&str, usize), f64> {
        let mut out = BTreeMap::new();
        for c in &self.contributions {
            *out.entry((c.witness.as_str(), c.column)).or_insert(0.0) += c.weight;
        }
        out
    }

    /// Accumulated weight of `witness` for the reading `reading_id`; zero if absent.
    pub fn weight(&self, witness: &str, reading_id: &str) -> f64 {
        let Some(column) = self
            .columns
            .iter()
            .position(|c| c.key.reading_id == reading_id)
        else {
            return 0.0;
        };
        self.contributions
            .iter()
            .filter(|c| c.witness == witness && c.column == column)
            .map(|c| c.weight)
            .sum()
    }

    pub fn column_ids(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.key.reading_id.as_str())
            .collect()
    }
}

/// Candidate reading identifiers named by an ambiguous reading.
///
/// The convention is `<prefix><id>/<id>/...`, e.g. `zw-a/b`. Duplicates are
/// dropped in order of first appearance.
pub fn parse_ambiguous_candidates<'a>(reading_id: &'a str, prefix: &str) -> Vec<&'a str> {
    let body = if prefix.is_empty() {
        reading_id
    } else {
        reading_id.strip_prefix(prefix).unwrap_or(reading_id)
    };
    let mut out: Vec<&str> = Vec::new();
    for candidate in body.split('/').map(str::trim) {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// Turns one variation unit into weighted matrix contributions.
pub struct UnitBuilder<'a> {
    rules: &'a ClassificationRules,
    normalizer: &'a SiglumNormalizer,
}

impl<'a> UnitBuilder<'a> {
    pub fn new(rules: &'a ClassificationRules, normalizer: &'a SiglumNormalizer) -> Self {
        Self { rules, normalizer }
    }

    pub fn build(&self, unit: &VariationUnit) -> Result<UnitContributions, CollationError> {
        let mut columns: Vec<ReadingColumn> = Vec::new();
        let mut column_of: HashMap<&str, usize> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current: Option<usize> = None;
        let mut contributions = Vec::new();

        for reading in &unit.readings {
            if !seen.insert(reading.id.as_str()) {
                return Err(CollationError::malformed(
                    &unit.id,
                    MalformedUnitReason::DuplicateReadingId {
                        reading_id: reading.id.clone(),
                    },
                ));
            }

            let targets: Vec<(usize, f64)> = match self.rules.classify(&reading.kind, &reading.id)
            {
                ReadingRole::Ignore => continue,
                ReadingRole::Substantive => {
                    let column = columns.len();
                    columns.push(ReadingColumn {
                        key: ReadingKey::new(&unit.id, &reading.id),
                        text: reading.text.clone(),
                    });
                    column_of.insert(reading.id.as_str(), column);
                    current = Some(column);
                    vec![(column, 1.0)]
                }
                ReadingRole::Trivial => {
                    let column = current.ok_or_else(|| {
                        CollationError::malformed(
                            &unit.id,
                            MalformedUnitReason::TrivialBeforeSubstantive {
                                reading_id: reading.id.clone(),
                            },
                        )
                    })?;
                    vec![(column, 1.0)]
                }
                ReadingRole::Ambiguous => self.split_ambiguous(unit, reading, &column_of)?,
            };

            for raw in &reading.witnesses {
                let witness = self.normalizer.canonical(raw);
                for &(column, weight) in &targets {
                    contributions.push(Contribution {
                        witness: witness.clone(),
                        raw_siglum: raw.clone(),
                        column,
                        weight,
                    });
                }
            }
        }

        Ok(UnitContributions {
            unit_id: unit.id.clone(),
            columns,
            contributions,
        })
    }

    fn split_ambiguous(
        &self,
        unit: &VariationUnit,
        reading: &Reading,
        column_of: &HashMap<&str, usize>,
    ) -> Result<Vec<(usize, f64)>, CollationError> {
        let candidates = parse_ambiguous_candidates(&reading.id, &self.rules.ambiguous_prefix);
        if candidates.is_empty() {
            return Err(CollationError::malformed(
                &unit.id,
                MalformedUnitReason::AmbiguousWithoutCandidates {
                    reading_id: reading.id.clone(),
                },
            ));
        }
        let share = 1.0 / candidates.len() as f64;
        candidates
            .into_iter()
            .map(|candidate| {
                column_of
                    .get(candidate)
                    .map(|&column| (column, share))
                    .ok_or_else(|| {
                        CollationError::malformed(
                            &unit.id,
                            MalformedUnitReason::UnknownAmbiguousCandidate {
                                reading_id: reading.id.clone(),
                                candidate: candidate.to_string(),
                            },
                        )
                    })
            })
            .collect()
    }
}
