//! Error types for collation parsing, matrix assembly, and factorization.

use thiserror::Error;

use crate::nmf::NmfError;
use crate::weighting::WeightingError;

/// Why a variation unit could not be turned into matrix contributions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedUnitReason {
    /// A trivial reading was listed before any substantive reading in its unit.
    #[error("trivial reading {reading_id} appears before any substantive reading")]
    TrivialBeforeSubstantive { reading_id: String },
    /// An ambiguous reading whose identifier yields no candidate readings.
    #[error("ambiguous reading {reading_id} names no candidate readings")]
    AmbiguousWithoutCandidates { reading_id: String },
    /// An ambiguous reading names a candidate that is not an earlier substantive reading.
    #[error("ambiguous reading {reading_id} names {candidate}, which is not an earlier substantive reading")]
    UnknownAmbiguousCandidate {
        reading_id: String,
        candidate: String,
    },
    #[error("reading id {reading_id} occurs more than once")]
    DuplicateReadingId { reading_id: String },
    #[error("unit id occurs more than once in the collation")]
    DuplicateUnitId,
}

#[derive(Debug, Error)]
pub enum CollationError {
    /// Fatal for the unit; carries the offending unit identifier.
    #[error("malformed variation unit {unit_id}: {reason}")]
    MalformedUnit {
        unit_id: String,
        reason: MalformedUnitReason,
    },

    /// Nothing left to factor (no complete witnesses or no surviving readings).
    #[error("empty matrix: {reason}")]
    EmptyMatrix { reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("weighting failed: {0}")]
    Weighting(#[from] WeightingError),

    #[error("factorization failed: {0}")]
    Factorization(#[from] NmfError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CollationError {
    pub fn malformed(unit_id: impl Into<String>, reason: MalformedUnitReason) -> Self {
        Self::MalformedUnit {
            unit_id: unit_id.into(),
            reason,
        }
    }

    pub fn empty_matrix(reason: impl Into<String>) -> Self {
        Self::EmptyMatrix {
            reason: reason.into(),
        }
    }
}
