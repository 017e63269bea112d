//! In-memory entity graph keyed by identity key.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use crate::entity::{Entity, EntityKey, EntityKind};
use crate::{ModelError, ModelResult};

/// A link whose target is not present in the graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DanglingReference {
    pub referrer: EntityKey,
    pub property: String,
    pub target: EntityKey,
}

/// Serialized form of a graph (source graphs, warehouse dumps, store exports).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub base: Option<String>,
    pub entities: Vec<Entity>,
}

/// Entity graph. Iteration is in key order, so every traversal built on top
/// of it is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    base: Option<String>,
    entities: BTreeMap<EntityKey, Entity>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: Some(base.into()),
            entities: BTreeMap::new(),
        }
    }

    /// Build a graph, rejecting duplicate keys.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> ModelResult<Self> {
        let mut graph = Self::new();
        for entity in entities {
            graph.insert(entity)?;
        }
        Ok(graph)
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    // ========================================================================
    // Basic access
    // ========================================================================

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains_key(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn get_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    /// Fetch an entity, but only if it has the expected kind.
    pub fn get_of_kind(&self, key: &EntityKey, kind: EntityKind) -> Option<&Entity> {
        self.entities.get(key).filter(|e| e.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entities.keys()
    }

    pub fn entities_of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind() == kind)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    pub fn insert(&mut self, entity: Entity) -> ModelResult<()> {
        if self.entities.contains_key(entity.key()) {
            return Err(ModelError::DuplicateKey(entity.key().clone()));
        }
        self.entities.insert(entity.key().clone(), entity);
        Ok(())
    }

    /// Insert unless an entity with the same key is already present.
    /// Returns `true` if inserted.
    pub fn insert_if_absent(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(entity.key()) {
            return false;
        }
        self.entities.insert(entity.key().clone(), entity);
        true
    }

    /// Insert or replace, returning the previous entity.
    pub fn upsert(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.key().clone(), entity)
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<Entity> {
        self.entities.remove(key)
    }

    /// Move every entity of `other` whose key is not yet present into this
    /// graph. Existing entities win. Returns the number moved.
    pub fn absorb(&mut self, other: Graph) -> usize {
        let mut moved = 0;
        for (key, entity) in other.entities {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.entities.entry(key) {
                slot.insert(entity);
                moved += 1;
            }
        }
        moved
    }

    pub fn into_entities(self) -> impl Iterator<Item = Entity> {
        self.entities.into_values()
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Keys reachable from `roots` by following forward links (roots
    /// included when present). Targets missing from the graph are skipped.
    pub fn reachable_from<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a EntityKey>,
    ) -> BTreeSet<EntityKey> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&EntityKey> = VecDeque::new();
        for root in roots {
            if let Some(entity) = self.entities.get(root) {
                if seen.insert(entity.key().clone()) {
                    queue.push_back(entity.key());
                }
            }
        }
        while let Some(key) = queue.pop_front() {
            let Some(entity) = self.entities.get(key) else {
                continue;
            };
            for (_, target) in entity.all_targets() {
                if let Some((target_key, _)) = self.entities.get_key_value(target) {
                    if seen.insert(target_key.clone()) {
                        queue.push_back(target_key);
                    }
                }
            }
        }
        seen
    }

    /// Independent copy of `root` together with everything it references,
    /// transitively.
    pub fn closure(&self, root: &EntityKey) -> Option<Graph> {
        if !self.entities.contains_key(root) {
            return None;
        }
        let keys = self.reachable_from([root]);
        let entities = keys
            .iter()
            .filter_map(|k| self.entities.get(k))
            .map(|e| (e.key().clone(), e.clone()))
            .collect();
        Some(Graph {
            base: self.base.clone(),
            entities,
        })
    }

    /// All links whose target is absent from this graph.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut out = Vec::new();
        for entity in self.entities.values() {
            for (prop, target) in entity.all_targets() {
                if !self.entities.contains_key(target) {
                    out.push(DanglingReference {
                        referrer: entity.key().clone(),
                        property: prop.to_string(),
                        target: target.clone(),
                    });
                }
            }
        }
        out
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            base: self.base.clone(),
            entities: self.entities.values().cloned().collect(),
        }
    }

    pub fn from_document(doc: GraphDocument) -> ModelResult<Self> {
        let mut graph = Self::from_entities(doc.entities)?;
        graph.base = doc.base;
        Ok(graph)
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let doc: GraphDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    pub fn to_json(&self) -> ModelResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn read_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    fn sample() -> Graph {
        Graph::from_entities([
            Entity::new("pe", EntityKind::PhysicalEntity).with_single(props::ENTITY_REFERENCE, "er"),
            Entity::new("er", EntityKind::ProteinReference)
                .with_member(props::XREF, "ux")
                .with_member(props::ENTITY_FEATURE, "f"),
            Entity::xref("ux", EntityKind::UnificationXref, "uniprot", "P1", None),
            Entity::new("f", EntityKind::EntityFeature).with_single(props::ENTITY_FEATURE_OF, "er"),
            Entity::new("orphan", EntityKind::Vocabulary),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut g = sample();
        let err = g.insert(Entity::new("er", EntityKind::ProteinReference));
        assert!(matches!(err, Err(ModelError::DuplicateKey(_))));
        assert!(!g.insert_if_absent(Entity::new("er", EntityKind::ProteinReference)));
    }

    #[test]
    fn closure_follows_back_links_and_skips_unrelated() {
        let g = sample();
        let c = g.closure(&"er".into()).unwrap();
        let keys: Vec<&str> = c.keys().map(EntityKey::as_str).collect();
        assert_eq!(keys, vec!["er", "f", "ux"]);
        assert!(g.closure(&"missing".into()).is_none());
    }

    #[test]
    fn absorb_keeps_existing_versions() {
        let mut staging = Graph::from_entities([Entity::new("er", EntityKind::ProteinReference)
            .with_attr(props::DISPLAY_NAME, "CANONICAL")])
        .unwrap();
        let moved = staging.absorb(sample());
        assert_eq!(moved, 4);
        assert_eq!(
            staging.get(&"er".into()).unwrap().attr(props::DISPLAY_NAME),
            Some("CANONICAL")
        );
    }

    #[test]
    fn dangling_references_are_listed() {
        let mut g = sample();
        g.remove(&"ux".into());
        let dangling = g.dangling_references();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].referrer.as_str(), "er");
        assert_eq!(dangling[0].target.as_str(), "ux");
    }

    #[test]
    fn json_documents_round_trip() {
        let g = sample();
        let json = g.to_json().unwrap();
        assert!(json.contains("\"entityFeatureOf\""));
        assert_eq!(Graph::from_json(&json).unwrap(), g);
    }
}
