//! Per-batch merge context.
//!
//! A [`MergeRun`] is created for a batch and handed by `&mut` to every stage.
//! It owns the staging graph (canonical entities materialized for the source
//! graph being merged), the replacement map, and the warnings collected so
//! far. Staging and replacements are reset at the start of each source
//! graph; a canonical entity committed by an earlier source graph is found
//! again through the target store.

use std::collections::BTreeMap;

use pathwaygraph_model::{Entity, EntityKey, EntityKind, Graph};

use crate::warnings::DataQualityWarning;

/// Where a staged canonical entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A cleaned copy of the warehouse entity and its closure.
    Warehouse,
    /// A copy of the entity already in the target store.
    TargetStore,
}

/// Old (source-local) key -> canonical key. Many-to-one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementMap {
    entries: BTreeMap<EntityKey, EntityKey>,
}

impl ReplacementMap {
    pub fn insert(&mut self, old: EntityKey, canonical: EntityKey) {
        self.entries.insert(old, canonical);
    }

    pub fn get(&self, old: &EntityKey) -> Option<&EntityKey> {
        self.entries.get(old)
    }

    pub fn contains(&self, old: &EntityKey) -> bool {
        self.entries.contains_key(old)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(old, canonical)` pairs in old-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &EntityKey)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Default)]
pub struct MergeRun {
    staging: Graph,
    origins: BTreeMap<EntityKey, Origin>,
    replacements: ReplacementMap,
    warnings: Vec<DataQualityWarning>,
    sources_started: usize,
}

impl MergeRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staging(&self) -> &Graph {
        &self.staging
    }

    pub fn replacements(&self) -> &ReplacementMap {
        &self.replacements
    }

    /// Origin of a staged canonical entity.
    pub fn origin(&self, key: &EntityKey) -> Option<Origin> {
        self.origins.get(key).copied()
    }

    pub fn sources_started(&self) -> usize {
        self.sources_started
    }

    pub fn warnings(&self) -> &[DataQualityWarning] {
        &self.warnings
    }

    // ========================================================================
    // Source lifecycle
    // ========================================================================

    pub(crate) fn begin_source(&mut self) {
        self.staging = Graph::new();
        self.origins.clear();
        self.replacements.clear();
        self.sources_started += 1;
    }

    /// Hand the staging graph to the pruner; staging is empty afterwards.
    pub(crate) fn take_staging(&mut self) -> Graph {
        self.origins.clear();
        std::mem::take(&mut self.staging)
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<DataQualityWarning> {
        std::mem::take(&mut self.warnings)
    }

    // ========================================================================
    // Staging
    // ========================================================================

    /// Whether a canonical entity of this kind is already staged.
    pub fn is_staged(&self, key: &EntityKey, kind: EntityKind) -> bool {
        self.staging.get_of_kind(key, kind).is_some()
    }

    /// Stage a (cleaned) warehouse copy. Entities already staged win, so
    /// shared xrefs and vocabularies are reused. Returns how many entities
    /// were added.
    pub(crate) fn stage_warehouse_copy(&mut self, key: &EntityKey, copy: Graph) -> usize {
        self.origins.insert(key.clone(), Origin::Warehouse);
        self.staging.absorb(copy)
    }

    pub(crate) fn stage_stored(&mut self, entity: Entity) {
        self.origins.insert(entity.key().clone(), Origin::TargetStore);
        self.staging.insert_if_absent(entity);
    }

    pub(crate) fn record_replacement(&mut self, old: EntityKey, canonical: EntityKey) {
        self.replacements.insert(old, canonical);
    }

    pub(crate) fn staging_and_replacements(&mut self) -> (&mut Graph, &ReplacementMap) {
        (&mut self.staging, &self.replacements)
    }

    pub(crate) fn record_warning(&mut self, warning: DataQualityWarning) {
        warning.log();
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathwaygraph_model::props;

    #[test]
    fn begin_source_resets_staging_but_keeps_warnings() {
        let mut run = MergeRun::new();
        run.begin_source();
        run.stage_stored(Entity::new("chebi:20", EntityKind::SmallMoleculeReference));
        run.record_replacement("local".into(), "chebi:20".into());
        run.record_warning(DataQualityWarning::SharedUnificationXref {
            xref: "ux".into(),
            owners: vec!["a".into(), "b".into()],
        });
        assert!(run.is_staged(&"chebi:20".into(), EntityKind::SmallMoleculeReference));
        assert_eq!(run.origin(&"chebi:20".into()), Some(Origin::TargetStore));

        run.begin_source();
        assert!(run.staging().is_empty());
        assert!(run.replacements().is_empty());
        assert_eq!(run.warnings().len(), 1);
        assert_eq!(run.sources_started(), 2);
    }

    #[test]
    fn staged_entities_win_over_later_copies() {
        let mut run = MergeRun::new();
        run.begin_source();
        run.stage_stored(
            Entity::new("vocab", EntityKind::Vocabulary).with_attr(props::TERM, "staged"),
        );
        let copy = Graph::from_entities([
            Entity::new("uniprot:P1", EntityKind::ProteinReference),
            Entity::new("vocab", EntityKind::Vocabulary).with_attr(props::TERM, "copy"),
        ])
        .unwrap();
        assert_eq!(run.stage_warehouse_copy(&"uniprot:P1".into(), copy), 1);
        assert_eq!(
            run.staging().get(&"vocab".into()).unwrap().attr(props::TERM),
            Some("staged")
        );
    }
}
