//! Identity resolution.
//!
//! Resolution is split in two:
//!
//! 1. **Planning** ([`Resolver::plan`]) reads only the source graph and the
//!    mapping table and lists candidate canonical keys in priority order:
//!
//!    | step | candidate |
//!    |------|-----------|
//!    | 1 | the entity's own key, if already canonical |
//!    | 2 | mapping of the `(namespace, id)` encoded in the key |
//!    | 3 | mapping of the first unification xref that hits the table |
//!    | 4 | mapping of the first relationship xref that hits the table |
//!
//!    Plans are independent of each other, so they can be computed on the
//!    rayon pool.
//! 2. **Materialization** ([`Resolver::materialize`]) walks the candidates and
//!    takes the first one that exists in the staging graph, the target store
//!    or the warehouse, staging it if needed. This is serial: it is the only
//!    place canonical entities are created.

use rayon::prelude::*;

use pathwaygraph_idmap::{ExternalId, MappingTable};
use pathwaygraph_model::{
    props, Entity, EntityKey, EntityKind, Graph, MappingDomain, ReferrerIndex,
};
use pathwaygraph_storage::{TargetStore, Warehouse};

use crate::cleanup;
use crate::config::{CleanupConfig, ResolverConfig};
use crate::run::MergeRun;
use crate::warnings::DataQualityWarning;
use crate::MergeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStep {
    CanonicalKey,
    KeyMapping,
    UnificationXref(EntityKey),
    RelationshipXref(EntityKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: EntityKey,
    pub step: ResolutionStep,
}

/// Candidate canonical keys for one reference entity, best first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    pub entity: EntityKey,
    pub kind: EntityKind,
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<DataQualityWarning>,
}

impl ResolutionPlan {
    fn new(entity: &Entity) -> Self {
        Self {
            entity: entity.key().clone(),
            kind: entity.kind(),
            candidates: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn push(&mut self, key: EntityKey, step: ResolutionStep) {
        if self.candidates.iter().all(|c| c.key != key) {
            self.candidates.push(Candidate { key, step });
        }
    }
}

pub struct Resolver<'a> {
    mapping: &'a dyn MappingTable,
    warehouse: &'a dyn Warehouse,
    store: &'a dyn TargetStore,
    config: &'a ResolverConfig,
    cleanup: &'a CleanupConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(
        mapping: &'a dyn MappingTable,
        warehouse: &'a dyn Warehouse,
        store: &'a dyn TargetStore,
        config: &'a ResolverConfig,
        cleanup: &'a CleanupConfig,
    ) -> Self {
        Self {
            mapping,
            warehouse,
            store,
            config,
            cleanup,
        }
    }

    // ========================================================================
    // Planning
    // ========================================================================

    /// Plans for every resolvable reference entity of `source`, in key order.
    pub fn plan_all(&self, source: &Graph, parallel: bool) -> Result<Vec<ResolutionPlan>, MergeError> {
        let references: Vec<&Entity> = source
            .iter()
            .filter(|e| e.kind().mapping_domain().is_some())
            .collect();
        if parallel {
            references.par_iter().map(|e| self.plan(source, e)).collect()
        } else {
            references.iter().map(|e| self.plan(source, e)).collect()
        }
    }

    pub fn plan(&self, source: &Graph, entity: &Entity) -> Result<ResolutionPlan, MergeError> {
        let mut plan = ResolutionPlan::new(entity);
        let Some(domain) = entity.kind().mapping_domain() else {
            return Ok(plan);
        };

        if domain.is_canonical_key(entity.key()) {
            plan.push(entity.key().clone(), ResolutionStep::CanonicalKey);
        }

        if let Some(external) = ExternalId::from_key(entity.key().as_str()) {
            if let Some(key) = self.lookup(&external.namespace, &external.id, domain)? {
                plan.push(key, ResolutionStep::KeyMapping);
            }
        }

        let mut unification = Vec::new();
        let mut relationship = Vec::new();
        for xref_key in entity.targets(props::XREF) {
            let Some(xref) = source.get(xref_key).and_then(Entity::as_xref) else {
                continue;
            };
            if xref.is_unification() {
                unification.push((xref_key, xref.db, xref.id));
            } else if xref.is_relationship() {
                relationship.push((xref_key, xref.db, xref.id));
            }
        }

        let mut chosen: Option<EntityKey> = None;
        let mut others: Vec<EntityKey> = Vec::new();
        for (xref_key, db, id) in unification {
            let Some(key) = self.lookup(db, id, domain)? else {
                continue;
            };
            match &chosen {
                None => {
                    plan.push(key.clone(), ResolutionStep::UnificationXref(xref_key.clone()));
                    chosen = Some(key);
                    if !self.config.report_ambiguous_unification {
                        break;
                    }
                }
                Some(first) => {
                    if *first != key && !others.contains(&key) {
                        others.push(key);
                    }
                }
            }
        }
        if let (Some(chosen), false) = (chosen, others.is_empty()) {
            plan.warnings.push(DataQualityWarning::AmbiguousUnification {
                entity: entity.key().clone(),
                chosen,
                others,
            });
        }

        if self.config.use_relationship_xrefs {
            for (xref_key, db, id) in relationship {
                if let Some(key) = self.lookup(db, id, domain)? {
                    plan.push(key, ResolutionStep::RelationshipXref(xref_key.clone()));
                    break;
                }
            }
        }

        Ok(plan)
    }

    fn lookup(
        &self,
        namespace: &str,
        id: &str,
        domain: MappingDomain,
    ) -> Result<Option<EntityKey>, MergeError> {
        let hit = self
            .mapping
            .lookup(namespace, id, domain)
            .map_err(MergeError::Mapping)?;
        Ok(hit.map(|mapped| mapped.canonical_key(domain)))
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// First candidate that exists anywhere, staged in `run`. `None` means
    /// the entity stays as it is.
    pub fn materialize(
        &self,
        run: &mut MergeRun,
        plan: &ResolutionPlan,
    ) -> Result<Option<EntityKey>, MergeError> {
        for candidate in &plan.candidates {
            if self.ensure_staged(run, &candidate.key, plan.kind)? {
                tracing::trace!(
                    entity = %plan.entity,
                    canonical = %candidate.key,
                    step = ?candidate.step,
                    "resolved"
                );
                return Ok(Some(candidate.key.clone()));
            }
        }
        Ok(None)
    }

    /// Make sure the canonical entity `key` is in the staging graph, looking
    /// in staging, then the target store, then the warehouse.
    pub fn ensure_staged(
        &self,
        run: &mut MergeRun,
        key: &EntityKey,
        kind: EntityKind,
    ) -> Result<bool, MergeError> {
        if run.is_staged(key, kind) {
            return Ok(true);
        }
        if run.staging().contains_key(key) {
            tracing::debug!(%key, %kind, "staged entity has another kind");
            return Ok(false);
        }

        if let Some(stored) = self.store.get_by_key(key) {
            if stored.kind() != kind {
                tracing::debug!(%key, %kind, stored = %stored.kind(), "stored entity has another kind");
                return Ok(false);
            }
            run.stage_stored(stored);
            return Ok(true);
        }

        let copy = self
            .warehouse
            .create_canonical_copy(key, kind)
            .map_err(MergeError::Warehouse)?;
        match copy {
            Some(mut copy) => {
                cleanup::clean_canonical_copy(&mut copy, key, self.cleanup);
                let added = run.stage_warehouse_copy(key, copy);
                tracing::debug!(%key, entities = added, "canonical copy staged");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Unification xrefs of `source` attached to more than one entity.
pub fn shared_unification_xrefs(source: &Graph, index: &ReferrerIndex) -> Vec<DataQualityWarning> {
    source
        .entities_of_kind(EntityKind::UnificationXref)
        .filter_map(|xref| {
            let owners = index.owners_via(xref.key(), props::XREF);
            (owners.len() > 1).then(|| DataQualityWarning::SharedUnificationXref {
                xref: xref.key().clone(),
                owners: owners.into_iter().cloned().collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathwaygraph_idmap::IdMappingTable;
    use pathwaygraph_storage::{GraphStore, InMemoryWarehouse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mapping() -> IdMappingTable {
        let mut t = IdMappingTable::new();
        t.add(MappingDomain::Gene, "uniprot", "P12345", "UNIPROT", "P12345").unwrap();
        t.add(MappingDomain::Gene, "refseq", "NP_000001", "UNIPROT", "P12345").unwrap();
        t.add(MappingDomain::Gene, "hgnc", "HGNC:1", "UNIPROT", "Q99999").unwrap();
        t.add(MappingDomain::Gene, "ensembl", "ENSG1", "UNIPROT", "P00000").unwrap();
        t.add(MappingDomain::Chemical, "pubchem-substance", "14438", "CHEBI", "CHEBI:20").unwrap();
        t
    }

    fn warehouse() -> InMemoryWarehouse {
        InMemoryWarehouse::new(
            Graph::from_entities([
                Entity::new("uniprot:P12345", EntityKind::ProteinReference)
                    .with_attr(props::SEQUENCE, "MAAA")
                    .with_member(props::XREF, "uniprot:P12345/ux"),
                Entity::xref("uniprot:P12345/ux", EntityKind::UnificationXref, "uniprot", "P12345", None),
                Entity::new("uniprot:Q99999", EntityKind::ProteinReference),
                Entity::new("chebi:20", EntityKind::SmallMoleculeReference),
            ])
            .unwrap(),
        )
    }

    /// Counts canonical copies handed out.
    struct CountingWarehouse {
        inner: InMemoryWarehouse,
        copies: AtomicUsize,
    }

    impl Warehouse for CountingWarehouse {
        fn get_by_canonical_key(&self, key: &EntityKey, kind: EntityKind) -> anyhow::Result<Option<Entity>> {
            self.inner.get_by_canonical_key(key, kind)
        }

        fn create_canonical_copy(&self, key: &EntityKey, kind: EntityKind) -> anyhow::Result<Option<Graph>> {
            self.copies.fetch_add(1, Ordering::SeqCst);
            self.inner.create_canonical_copy(key, kind)
        }
    }

    fn protein(key: &str, xrefs: &[&str]) -> Entity {
        xrefs
            .iter()
            .fold(Entity::new(key, EntityKind::ProteinReference), |e, x| e.with_member(props::XREF, *x))
    }

    #[test]
    fn isoform_key_resolves_through_the_stripped_form() {
        let (m, w, s) = (mapping(), warehouse(), GraphStore::in_memory());
        let (rc, cc) = (ResolverConfig::default(), CleanupConfig::default());
        let resolver = Resolver::new(&m, &w, &s, &rc, &cc);

        let source = Graph::from_entities([protein("http://id/uniprot/P12345-2", &[])]).unwrap();
        let plan = resolver
            .plan(&source, source.get(&"http://id/uniprot/P12345-2".into()).unwrap())
            .unwrap();
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].key.as_str(), "uniprot:P12345");
        assert_eq!(plan.candidates[0].step, ResolutionStep::KeyMapping);

        let mut run = MergeRun::new();
        run.begin_source();
        let resolved = resolver.materialize(&mut run, &plan).unwrap();
        assert_eq!(resolved.unwrap().as_str(), "uniprot:P12345");

        let staged = run.staging().get(&"uniprot:P12345".into()).unwrap();
        assert!(staged.attr(props::SEQUENCE).is_none(), "sequence stripped from the copy");
        assert!(run.staging().contains_key(&"uniprot:P12345/ux".into()));
    }

    #[test]
    fn later_steps_run_when_an_earlier_candidate_is_missing() {
        let (m, w, s) = (mapping(), warehouse(), GraphStore::in_memory());
        let (rc, cc) = (ResolverConfig::default(), CleanupConfig::default());
        let resolver = Resolver::new(&m, &w, &s, &rc, &cc);

        // ensembl maps to P00000 (not in the warehouse); the relationship
        // xref maps to Q99999, which is.
        let source = Graph::from_entities([
            protein("local", &["ux", "rx"]),
            Entity::xref("ux", EntityKind::UnificationXref, "ensembl", "ENSG1", None),
            Entity::xref("rx", EntityKind::RelationshipXref, "hgnc", "HGNC:1", None),
        ])
        .unwrap();
        let plan = resolver.plan(&source, source.get(&"local".into()).unwrap()).unwrap();
        let keys: Vec<&str> = plan.candidates.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["uniprot:P00000", "uniprot:Q99999"]);

        let mut run = MergeRun::new();
        run.begin_source();
        assert_eq!(
            resolver.materialize(&mut run, &plan).unwrap().unwrap().as_str(),
            "uniprot:Q99999"
        );

        let no_rel = ResolverConfig {
            use_relationship_xrefs: false,
            ..ResolverConfig::default()
        };
        let strict = Resolver::new(&m, &w, &s, &no_rel, &cc);
        let plan = strict.plan(&source, source.get(&"local".into()).unwrap()).unwrap();
        assert_eq!(strict.materialize(&mut run, &plan).unwrap(), None);
    }

    #[test]
    fn first_unification_hit_wins_and_ambiguity_is_reported() {
        let (m, w, s) = (mapping(), warehouse(), GraphStore::in_memory());
        let (rc, cc) = (ResolverConfig::default(), CleanupConfig::default());
        let resolver = Resolver::new(&m, &w, &s, &rc, &cc);

        let source = Graph::from_entities([
            protein("local", &["ux-a", "ux-b", "ux-c"]),
            Entity::xref("ux-a", EntityKind::UnificationXref, "RefSeq", "NP_000001.4", None),
            Entity::xref("ux-b", EntityKind::UnificationXref, "HGNC", "HGNC:1", None),
            Entity::xref("ux-c", EntityKind::UnificationXref, "uniprot", "P12345", None),
        ])
        .unwrap();
        let plan = resolver.plan(&source, source.get(&"local".into()).unwrap()).unwrap();
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].key.as_str(), "uniprot:P12345");
        assert_eq!(
            plan.warnings,
            vec![DataQualityWarning::AmbiguousUnification {
                entity: "local".into(),
                chosen: "uniprot:P12345".into(),
                others: vec!["uniprot:Q99999".into()],
            }]
        );
    }

    #[test]
    fn canonical_materialization_is_idempotent_within_a_run() {
        let (m, s) = (mapping(), GraphStore::in_memory());
        let w = CountingWarehouse {
            inner: warehouse(),
            copies: AtomicUsize::new(0),
        };
        let (rc, cc) = (ResolverConfig::default(), CleanupConfig::default());
        let resolver = Resolver::new(&m, &w, &s, &rc, &cc);

        let source = Graph::from_entities([
            protein("a", &["ux-a"]),
            protein("b", &["ux-b"]),
            Entity::xref("ux-a", EntityKind::UnificationXref, "uniprot", "P12345", None),
            Entity::xref("ux-b", EntityKind::UnificationXref, "refseq", "NP_000001", None),
        ])
        .unwrap();

        let mut run = MergeRun::new();
        run.begin_source();
        let plans = resolver.plan_all(&source, false).unwrap();
        let resolved: Vec<_> = plans
            .iter()
            .map(|p| resolver.materialize(&mut run, p).unwrap().unwrap())
            .collect();
        assert_eq!(resolved[0], resolved[1]);
        assert_eq!(w.copies.load(Ordering::SeqCst), 1);
        assert_eq!(run.staging().len(), 2);
    }

    #[test]
    fn stored_canonical_entities_are_reused() {
        let (m, w, s) = (mapping(), warehouse(), GraphStore::in_memory());
        s.merge_graph(
            &Graph::from_entities([Entity::new("chebi:20", EntityKind::SmallMoleculeReference)
                .with_attr(props::DISPLAY_NAME, "from store")])
            .unwrap(),
            "earlier",
        )
        .unwrap();
        let (rc, cc) = (ResolverConfig::default(), CleanupConfig::default());
        let resolver = Resolver::new(&m, &w, &s, &rc, &cc);

        let mut run = MergeRun::new();
        run.begin_source();
        assert!(resolver
            .ensure_staged(&mut run, &"chebi:20".into(), EntityKind::SmallMoleculeReference)
            .unwrap());
        assert_eq!(run.origin(&"chebi:20".into()), Some(crate::run::Origin::TargetStore));
        assert_eq!(
            run.staging().get(&"chebi:20".into()).unwrap().attr(props::DISPLAY_NAME),
            Some("from store")
        );
        assert!(!resolver
            .ensure_staged(&mut run, &"chebi:20".into(), EntityKind::ProteinReference)
            .unwrap());
    }

    #[test]
    fn parallel_and_serial_plans_agree() {
        let (m, w, s) = (mapping(), warehouse(), GraphStore::in_memory());
        let (rc, cc) = (ResolverConfig::default(), CleanupConfig::default());
        let resolver = Resolver::new(&m, &w, &s, &rc, &cc);

        let mut entities = vec![Entity::xref("ux", EntityKind::UnificationXref, "refseq", "NP_000001", None)];
        for i in 0..50 {
            let xrefs: &[&str] = if i % 2 == 0 { &["ux"] } else { &[] };
            entities.push(protein(&format!("p{i}"), xrefs));
        }
        let source = Graph::from_entities(entities).unwrap();
        assert_eq!(
            resolver.plan_all(&source, true).unwrap(),
            resolver.plan_all(&source, false).unwrap()
        );
    }

    #[test]
    fn shared_unification_xrefs_are_found() {
        let source = Graph::from_entities([
            protein("a", &["ux"]),
            protein("b", &["ux"]),
            Entity::xref("ux", EntityKind::UnificationXref, "uniprot", "P1", None),
        ])
        .unwrap();
        let warnings = shared_unification_xrefs(&source, &ReferrerIndex::build(&source));
        assert_eq!(
            warnings,
            vec![DataQualityWarning::SharedUnificationXref {
                xref: "ux".into(),
                owners: vec!["a".into(), "b".into()],
            }]
        );
    }
}
