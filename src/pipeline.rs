//! Collation → matrix → factorization → classification.
//!
//! Stages:
//! 1. **Prepare**: classify readings, assemble the witness matrix, partition
//!    witnesses by completeness, build the complete-witness training matrix
//!    (optionally TF-IDF weighted).
//! 2. **Factorize**: NMF on the training matrix at a chosen rank, or a sweep
//!    over a rank range for model selection.
//! 3. **Classify**: complete witnesses from the mixture, fragmentary
//!    witnesses by NNLS against the basis.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::classify::{
    mixture_assignments, ClassificationError, FragmentaryClassifier, FragmentaryOutcome,
    GroupAssignment,
};
use crate::collation::Collation;
use crate::config::CollationConfig;
use crate::error::CollationError;
use crate::matrix::{CollationMatrix, TrainingSet, WitnessPartition};
use crate::nmf::{
    estimate_rank, Factorization, FactorizationParams, Factorizer, MultiplicativeNmf, RankMetrics,
};
use crate::nnls::{LawsonHanson, NnlsSolver};
use crate::unit::ReadingColumn;
use crate::weighting::{Reweighter, TfIdf};

// =============================================================================
// Types
// =============================================================================

/// Everything derived from a collation before factorization.
#[derive(Debug, Clone)]
pub struct PreparedCollation {
    pub matrix: CollationMatrix,
    pub partition: WitnessPartition,
    pub training: TrainingSet,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Row labels of the basis.
    pub readings: Vec<ReadingColumn>,
    pub factorization: Factorization,
    /// One per complete witness, in training order.
    pub witness_groups: Vec<GroupAssignment>,
    /// One per fragmentary witness, success or failure.
    pub fragmentary: Vec<FragmentaryOutcome>,
}

impl PipelineOutput {
    pub fn rank(&self) -> usize {
        self.factorization.basis.ncols()
    }

    /// Every successful assignment, complete witnesses first.
    pub fn assignments(&self) -> impl Iterator<Item = &GroupAssignment> + '_ {
        self.witness_groups
            .iter()
            .chain(self.fragmentary.iter().filter_map(|o| o.result.as_ref().ok()))
    }

    pub fn assignment(&self, witness: &str) -> Option<&GroupAssignment> {
        self.assignments().find(|a| a.witness == witness)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ClassificationError)> + '_ {
        self.fragmentary
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.witness.as_str(), e)))
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct Pipeline {
    config: CollationConfig,
    factorizer: Box<dyn Factorizer>,
    solver: Box<dyn NnlsSolver>,
    reweighter: Box<dyn Reweighter>,
}

impl Pipeline {
    /// Validates `config`; defaults to multiplicative NMF, Lawson–Hanson NNLS and TF-IDF.
    pub fn new(config: CollationConfig) -> Result<Self, CollationError> {
        config.validate()?;
        Ok(Self {
            config,
            factorizer: Box::new(MultiplicativeNmf),
            solver: Box::new(LawsonHanson::new()),
            reweighter: Box::new(TfIdf),
        })
    }

    pub fn with_factorizer(mut self, factorizer: Box<dyn Factorizer>) -> Self {
        self.factorizer = factorizer;
        self
    }

    pub fn with_solver(mut self, solver: Box<dyn NnlsSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Used only when `use_tfidf` is set.
    pub fn with_reweighter(mut self, reweighter: Box<dyn Reweighter>) -> Self {
        self.reweighter = reweighter;
        self
    }

    pub fn config(&self) -> &CollationConfig {
        &self.config
    }

    /// Assemble the witness matrix without partitioning it.
    ///
    /// Succeeds even when no witness is complete enough to train on.
    pub fn assemble(&self, collation: &Collation) -> Result<CollationMatrix, CollationError> {
        let rules = self.config.rules();
        for tag in rules.conflicts() {
            warn!(tag = %tag, "type tag is both ignored and trivial; treating it as ignored");
        }

        let normalizer = self.config.normalizer();
        let matrix = CollationMatrix::assemble(&collation.units, &rules, &normalizer)?;
        info!(
            units = matrix.unit_count(),
            witnesses = matrix.witnesses().len(),
            readings = matrix.columns().len(),
            "assembled collation matrix"
        );
        Ok(matrix)
    }

    pub fn prepare(&self, collation: &Collation) -> Result<PreparedCollation, CollationError> {
        let started = Instant::now();
        let matrix = self.assemble(collation)?;

        let partition = matrix.partition(self.config.min_extant_proportion)?;
        info!(
            threshold = partition.threshold(),
            complete = partition.complete_count(),
            fragmentary = partition.fragmentary_count(),
            "partitioned witnesses"
        );

        let mut training = matrix.training_set(&partition)?;
        if self.config.use_tfidf {
            let dropped = training.reweight(self.reweighter.as_ref())?;
            debug!(dropped, "applied tf-idf weighting");
        }
        info!(
            readings = training.matrix.nrows(),
            witnesses = training.matrix.ncols(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "training matrix ready"
        );

        Ok(PreparedCollation {
            matrix,
            partition,
            training,
        })
    }

    pub fn factorize(
        &self,
        prepared: &PreparedCollation,
        rank: usize,
    ) -> Result<PipelineOutput, CollationError> {
        let training = &prepared.training;
        let params = FactorizationParams::from_config(&self.config.nmf, rank);
        let factorization = self.factorizer.factorize(&training.matrix, &params)?;
        info!(
            rank,
            n_iter = factorization.summary.n_iter,
            rss = factorization.summary.rss,
            evar = factorization.summary.evar,
            "factorized training matrix"
        );

        let witness_groups = mixture_assignments(
            &training.witnesses,
            &training.matrix,
            &factorization.basis,
            &factorization.mixture,
        );

        let classifier = FragmentaryClassifier::new(&factorization.basis, self.solver.as_ref())
            .normalize(self.config.normalize_fragmentary);
        let fragmentary = classifier.classify_all(&training.fragmentary);
        for outcome in &fragmentary {
            if let Err(err) = &outcome.result {
                warn!(witness = %outcome.witness, error = %err, "could not classify fragmentary witness");
            }
        }

        Ok(PipelineOutput {
            readings: training.readings.clone(),
            factorization,
            witness_groups,
            fragmentary,
        })
    }

    pub fn estimate_rank(
        &self,
        prepared: &PreparedCollation,
        min_rank: usize,
        max_rank: usize,
    ) -> Result<Vec<RankMetrics>, CollationError> {
        let started = Instant::now();
        let metrics = estimate_rank(
            self.factorizer.as_ref(),
            &prepared.training.matrix,
            min_rank,
            max_rank,
            &self.config.nmf,
        )?;
        info!(
            min_rank,
            max_rank,
            n_run = self.config.nmf.n_run,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rank estimation finished"
        );
        Ok(metrics)
    }

    pub fn run(&self, collation: &Collation, rank: usize) -> Result<PipelineOutput, CollationError> {
        let prepared = self.prepare(collation)?;
        self.factorize(&prepared, rank)
    }
}
