#![forbid(unsafe_code)]

//! # collation-nmf
//!
//! Textual-flow grouping of manuscript witnesses.
//!
//! A collation lists, for each variation unit, the readings found in the
//! tradition and the witnesses that attest them. This crate turns that into a
//! non-negative reading × witness matrix, factors the complete witnesses with
//! NMF into group reading profiles and per-witness memberships, and places
//! each fragmentary witness into those groups with non-negative least squares
//! over only the readings it preserves.
//!
//! ```no_run
//! use collation_nmf::{Collation, CollationConfig, Pipeline};
//!
//! # fn main() -> Result<(), collation_nmf::CollationError> {
//! let collation = Collation::from_path("collation.json")?;
//! let pipeline = Pipeline::new(CollationConfig::default())?;
//! let output = pipeline.run(&collation, 4)?;
//! for assignment in output.assignments() {
//!     println!("{} -> {:?}", assignment.witness, assignment.dominant_group());
//! }
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod collation;
pub mod config;
pub mod error;
pub mod matrix;
pub mod nmf;
pub mod nnls;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod siglum;
pub mod unit;
pub mod weighting;

pub use classify::{
    AssignmentSource, ClassificationError, FragmentaryClassifier, FragmentaryOutcome,
    GroupAssignment,
};
pub use collation::{Collation, Reading, VariationUnit};
pub use config::CollationConfig;
pub use error::{CollationError, MalformedUnitReason};
pub use matrix::{CollationMatrix, FragmentaryWitness, TrainingSet, WitnessPartition};
pub use nmf::{
    estimate_rank, Factorization, FactorizationParams, Factorizer, FitSummary, Init,
    MultiplicativeNmf, NmfConfig, NmfError, RankMetrics,
};
pub use nnls::{LawsonHanson, NnlsError, NnlsSolution, NnlsSolver};
pub use pipeline::{Pipeline, PipelineOutput, PreparedCollation};
pub use report::{FactorizationReport, MatrixTable};
pub use rules::{ClassificationRules, ReadingRole};
pub use siglum::{SiglumNormalizer, SiglumTable};
pub use unit::{ReadingColumn, ReadingKey, UnitBuilder, UnitContributions};
pub use weighting::{Reweighter, TfIdf, WeightingError};
