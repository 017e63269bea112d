//! Merge coordinator: the per-source state machine and batch driver.
//!
//! ```text
//!   Idle ─► ResolvingIdentities ─► SubstitutingReferences ─► MigratingFeatures
//!    ▲                                                              │
//!    │                                                              ▼
//!    └──────── Committing ◄──────── Normalizing ◄──────────────── Pruning
//! ```
//!
//! Skipped sources never leave `Idle`. A fatal error in any state aborts the
//! source back to `Idle` without touching the target store.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pathwaygraph_idmap::MappingTable;
use pathwaygraph_model::{Graph, ReferrerIndex};
use pathwaygraph_storage::{CommitRecord, TargetStore, Warehouse};

use crate::config::MergeConfig;
use crate::normalize::detached_snapshot;
use crate::prune::prune_dangling;
use crate::resolver::{shared_unification_xrefs, Resolver};
use crate::run::{MergeRun, Origin};
use crate::substitute::{migrate_features, substitute_references};
use crate::warnings::DataQualityWarning;
use crate::MergeError;

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeState {
    Idle,
    ResolvingIdentities,
    SubstitutingReferences,
    MigratingFeatures,
    Pruning,
    Normalizing,
    Committing,
}

impl MergeState {
    /// The state that follows this one in a successful pass.
    pub fn next(self) -> MergeState {
        match self {
            MergeState::Idle => MergeState::ResolvingIdentities,
            MergeState::ResolvingIdentities => MergeState::SubstitutingReferences,
            MergeState::SubstitutingReferences => MergeState::MigratingFeatures,
            MergeState::MigratingFeatures => MergeState::Pruning,
            MergeState::Pruning => MergeState::Normalizing,
            MergeState::Normalizing => MergeState::Committing,
            MergeState::Committing => MergeState::Idle,
        }
    }

    pub fn can_advance_to(self, to: MergeState) -> bool {
        self.next() == to
    }
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug)]
pub struct StateMachine {
    state: MergeState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: MergeState::Idle,
        }
    }
}

impl StateMachine {
    pub fn state(&self) -> MergeState {
        self.state
    }

    pub fn advance(&mut self, to: MergeState) -> Result<(), MergeError> {
        if !self.state.can_advance_to(to) {
            return Err(MergeError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, %to, "merge state");
        self.state = to;
        Ok(())
    }

    /// Abandon the current pass.
    pub fn abort(&mut self) {
        if self.state != MergeState::Idle {
            tracing::debug!(from = %self.state, "merge aborted");
            self.state = MergeState::Idle;
        }
    }
}

// ============================================================================
// Sources and reports
// ============================================================================

/// Outcome of upstream validation of a source graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
    /// Never went through premerge; cannot be merged at all.
    NotPremerged,
}

#[derive(Debug, Clone)]
pub struct SourceGraph {
    pub identifier: String,
    pub version: String,
    pub validity: Validity,
    pub graph: Graph,
}

impl SourceGraph {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>, graph: Graph) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
            validity: Validity::Valid,
            graph,
        }
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    fn dataset(&self) -> String {
        format!("{}:{}", self.identifier, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotPremerged,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeStats {
    pub references: usize,
    pub replaced: usize,
    pub from_warehouse: usize,
    pub from_store: usize,
    pub links_rewritten: usize,
    pub features_migrated: usize,
    pub pruned: usize,
    pub commit: CommitRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Merged(MergeStats),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub identifier: String,
    pub version: String,
    pub outcome: SourceOutcome,
    pub warnings: Vec<DataQualityWarning>,
}

impl SourceReport {
    pub fn is_merged(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Merged(_))
    }
}

#[derive(Debug)]
pub struct BatchFailure {
    pub identifier: String,
    pub version: String,
    pub error: MergeError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub sources: Vec<SourceReport>,
    pub cancelled: bool,
    pub failure: Option<BatchFailure>,
}

impl BatchReport {
    pub fn merged(&self) -> usize {
        self.sources.iter().filter(|s| s.is_merged()).count()
    }

    pub fn skipped(&self) -> usize {
        self.sources.len() - self.merged()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DataQualityWarning> {
        self.sources.iter().flat_map(|s| s.warnings.iter())
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failure.is_none()
    }
}

/// Stops a batch before its next source graph.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct MergeCoordinator<'a> {
    mapping: &'a dyn MappingTable,
    warehouse: &'a dyn Warehouse,
    store: &'a dyn TargetStore,
    config: MergeConfig,
    machine: StateMachine,
}

impl<'a> MergeCoordinator<'a> {
    pub fn new(
        mapping: &'a dyn MappingTable,
        warehouse: &'a dyn Warehouse,
        store: &'a dyn TargetStore,
        config: MergeConfig,
    ) -> Self {
        Self {
            mapping,
            warehouse,
            store,
            config,
            machine: StateMachine::default(),
        }
    }

    pub fn state(&self) -> MergeState {
        self.machine.state()
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge the selected sources in order, with one [`MergeRun`] for the
    /// whole batch. Stops before the next source once `cancel` is set, and
    /// after the first fatal error; sources committed before either stay
    /// committed.
    pub fn merge_batch<I>(&mut self, sources: I, cancel: &CancellationToken) -> BatchReport
    where
        I: IntoIterator<Item = SourceGraph>,
    {
        let mut run = MergeRun::new();
        let mut report = BatchReport::default();

        for source in sources {
            if cancel.is_cancelled() {
                tracing::info!(merged = report.merged(), "batch cancelled");
                report.cancelled = true;
                break;
            }
            if !self.config.dataset.matches(&source) {
                tracing::debug!(dataset = %source.dataset(), "not selected");
                continue;
            }

            let (identifier, version) = (source.identifier.clone(), source.version.clone());
            match self.merge_source(&mut run, source) {
                Ok(source_report) => report.sources.push(source_report),
                Err(error) => {
                    tracing::error!(%identifier, %version, %error, "merge failed; batch stopped");
                    report.failure = Some(BatchFailure {
                        identifier,
                        version,
                        error,
                    });
                    break;
                }
            }
        }

        tracing::info!(
            merged = report.merged(),
            skipped = report.skipped(),
            complete = report.is_complete(),
            "batch finished"
        );
        report
    }

    /// One pass of the state machine for one source graph.
    pub fn merge_source(
        &mut self,
        run: &mut MergeRun,
        source: SourceGraph,
    ) -> Result<SourceReport, MergeError> {
        let span = tracing::info_span!(
            "merge_source",
            dataset = %source.identifier,
            version = %source.version
        );
        let _guard = span.enter();

        let SourceGraph {
            identifier,
            version,
            validity,
            graph,
        } = source;

        let skip = match validity {
            Validity::Valid => None,
            Validity::NotPremerged => {
                tracing::warn!("not premerged; skipped");
                Some(SkipReason::NotPremerged)
            }
            Validity::Invalid if self.config.force => {
                tracing::warn!("failed validation; merging anyway (force)");
                None
            }
            Validity::Invalid => {
                tracing::warn!("failed validation; skipped");
                Some(SkipReason::Invalid)
            }
        };
        if let Some(reason) = skip {
            return Ok(SourceReport {
                identifier,
                version,
                outcome: SourceOutcome::Skipped(reason),
                warnings: Vec::new(),
            });
        }

        let dataset = format!("{identifier}:{version}");
        match self.run_pipeline(run, graph, &dataset) {
            Ok(stats) => Ok(SourceReport {
                identifier,
                version,
                outcome: SourceOutcome::Merged(stats),
                warnings: run.take_warnings(),
            }),
            Err(err) => {
                self.machine.abort();
                run.take_staging();
                run.take_warnings();
                Err(err)
            }
        }
    }

    fn run_pipeline(
        &mut self,
        run: &mut MergeRun,
        mut graph: Graph,
        dataset: &str,
    ) -> Result<MergeStats, MergeError> {
        let resolver = Resolver::new(
            self.mapping,
            self.warehouse,
            self.store,
            &self.config.resolver,
            &self.config.cleanup,
        );

        // Resolving identities
        self.machine.advance(MergeState::ResolvingIdentities)?;
        run.begin_source();
        let mut index = ReferrerIndex::build(&graph);
        for warning in shared_unification_xrefs(&graph, &index) {
            run.record_warning(warning);
        }
        let plans = resolver.plan_all(&graph, self.config.parallel_resolution)?;
        let references = plans.len();
        for plan in plans {
            for warning in plan.warnings.iter().cloned() {
                run.record_warning(warning);
            }
            if let Some(canonical) = resolver.materialize(run, &plan)? {
                run.record_replacement(plan.entity, canonical);
            }
        }
        let replaced = run.replacements().len();
        let staged_keys: Vec<_> = run.staging().keys().cloned().collect();
        let from_warehouse = staged_keys
            .iter()
            .filter(|k| run.origin(k) == Some(Origin::Warehouse))
            .count();
        let from_store = staged_keys
            .iter()
            .filter(|k| run.origin(k) == Some(Origin::TargetStore))
            .count();
        tracing::info!(references, replaced, from_warehouse, from_store, "identities resolved");

        // Substituting references
        self.machine.advance(MergeState::SubstitutingReferences)?;
        let links_rewritten = substitute_references(&mut graph, &mut index, run.replacements());

        // Migrating features
        self.machine.advance(MergeState::MigratingFeatures)?;
        let migration = {
            let (staging, replacements) = run.staging_and_replacements();
            migrate_features(&mut graph, staging, replacements)
        };
        for warning in migration.warnings {
            run.record_warning(warning);
        }

        // Pruning
        self.machine.advance(MergeState::Pruning)?;
        let mut merged = run.take_staging();
        merged.absorb(graph);
        let pruned = prune_dangling(&mut merged).len();

        // Normalizing
        self.machine.advance(MergeState::Normalizing)?;
        let (snapshot, dangling) = detached_snapshot(&merged, self.store);
        drop(merged);
        for warning in dangling {
            run.record_warning(warning);
        }

        // Committing
        self.machine.advance(MergeState::Committing)?;
        let commit = self.store.merge_graph(&snapshot, dataset)?;
        self.machine.advance(MergeState::Idle)?;

        tracing::info!(
            links_rewritten,
            features_migrated = migration.migrated,
            pruned,
            inserted = commit.inserted,
            updated = commit.updated,
            "source merged"
        );

        Ok(MergeStats {
            references,
            replaced,
            from_warehouse,
            from_store,
            links_rewritten,
            features_migrated: migration.migrated,
            pruned,
            commit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_pipeline_order() {
        let mut machine = StateMachine::default();
        let mut state = MergeState::Idle;
        for _ in 0..7 {
            state = state.next();
            machine.advance(state).unwrap();
        }
        assert_eq!(machine.state(), MergeState::Idle);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut machine = StateMachine::default();
        machine.advance(MergeState::ResolvingIdentities).unwrap();
        let err = machine.advance(MergeState::Pruning).unwrap_err();
        assert!(matches!(
            err,
            MergeError::InvalidTransition {
                from: MergeState::ResolvingIdentities,
                to: MergeState::Pruning,
            }
        ));
        machine.abort();
        assert_eq!(machine.state(), MergeState::Idle);
        assert!(machine.advance(MergeState::Committing).is_err());
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
