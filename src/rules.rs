//! Reading classification rules.
//!
//! Every reading in a variation unit plays exactly one role in the matrix.
//! Precedence is fixed: ignore, then ambiguous, then trivial, then substantive.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Role a reading plays when its unit is turned into matrix entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingRole {
    /// Contributes nothing (lacunae, overlaps, ...).
    Ignore,
    /// Support is split evenly across the candidate substantive readings it names.
    Ambiguous,
    /// Support folds into the most recent substantive reading of the unit.
    Trivial,
    /// Becomes its own matrix column.
    Substantive,
}

/// Type-tag sets and identifier conventions used to classify readings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationRules {
    pub ignore_types: BTreeSet<String>,
    pub trivial_types: BTreeSet<String>,
    /// Type tags that mark a reading ambiguous regardless of its identifier.
    pub ambiguous_types: BTreeSet<String>,
    /// Identifier prefix of ambiguous readings (e.g. `zw-`). Empty disables prefix detection.
    pub ambiguous_prefix: String,
}

fn tag_set<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}

impl ClassificationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_types<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_types = tag_set(tags);
        self
    }

    pub fn with_trivial_types<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trivial_types = tag_set(tags);
        self
    }

    pub fn with_ambiguous_types<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ambiguous_types = tag_set(tags);
        self
    }

    pub fn with_ambiguous_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ambiguous_prefix = prefix.into();
        self
    }

    /// Tags listed as both ignored and trivial. Ignore wins; callers should warn.
    pub fn conflicts(&self) -> Vec<String> {
        self.ignore_types
            .intersection(&self.trivial_types)
            .cloned()
            .collect()
    }

    pub fn has_ambiguous_prefix(&self, reading_id: &str) -> bool {
        !self.ambiguous_prefix.is_empty() && reading_id.starts_with(&self.ambiguous_prefix)
    }

    /// Classify one reading from its declared type tag and identifier.
    pub fn classify(&self, type_tag: &str, reading_id: &str) -> ReadingRole {
        if self.ignore_types.contains(type_tag) {
            ReadingRole::Ignore
        } else if self.ambiguous_types.contains(type_tag) || self.has_ambiguous_prefix(reading_id)
        {
            ReadingRole::Ambiguous
        } else if self.trivial_types.contains(type_tag) {
            ReadingRole::Trivial
        } else {
            ReadingRole::Substantive
        }
    }
}
