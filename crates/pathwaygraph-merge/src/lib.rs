//! Pathway graph merge engine
//!
//! Folds independently curated source graphs into one target store so that
//! every physical entity reference (protein, small molecule, ...) is
//! represented by exactly one canonical entity.
//!
//! ```text
//!  source graph ──► resolver ──► substitution ──► feature migration
//!                      │                                  │
//!          mapping table + warehouse                      ▼
//!                                      prune ──► normalize ──► commit (target store)
//! ```
//!
//! # Key Features
//!
//! - **Deterministic resolution**: canonical key, key mapping, unification
//!   xrefs and relationship xrefs are tried in a fixed order
//! - **Idempotent staging**: each canonical entity is copied from the
//!   warehouse and cleaned at most once per source
//! - **Ownership-checked feature migration**: a feature only moves when it
//!   agrees about who owns it
//! - **Fail-whole commits**: a source either lands in the target store in
//!   one transaction or not at all
//!
//! Data-quality problems are never fatal; they are logged with `tracing` and
//! returned as [`DataQualityWarning`]s in the per-source report.

pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod normalize;
pub mod prune;
pub mod resolver;
pub mod run;
pub mod substitute;
pub mod warnings;

pub use config::{CleanupConfig, DatasetFilter, MergeConfig, ResolverConfig};
pub use coordinator::{
    BatchFailure, BatchReport, CancellationToken, MergeCoordinator, MergeState, MergeStats,
    SkipReason, SourceGraph, SourceOutcome, SourceReport, Validity,
};
pub use prune::prune_dangling;
pub use resolver::{Resolver, ResolutionPlan, ResolutionStep};
pub use run::{MergeRun, Origin, ReplacementMap};
pub use warnings::DataQualityWarning;

use pathwaygraph_storage::StoreError;

/// Fatal merge errors. Each one aborts the current source graph.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("mapping table lookup failed: {0:#}")]
    Mapping(anyhow::Error),

    #[error("warehouse access failed: {0:#}")]
    Warehouse(anyhow::Error),

    #[error("commit failed: {0}")]
    Commit(#[from] StoreError),

    #[error("invalid merge state transition: {from} -> {to}")]
    InvalidTransition { from: MergeState, to: MergeState },
}

impl MergeError {
    /// Whether the error came from an external collaborator rather than the
    /// engine itself.
    pub fn is_external(&self) -> bool {
        !matches!(self, MergeError::InvalidTransition { .. })
    }
}
