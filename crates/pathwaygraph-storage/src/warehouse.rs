//! In-memory warehouse loaded from a graph document.

use std::path::Path;

use pathwaygraph_model::{Entity, EntityKey, EntityKind, Graph};

use crate::Warehouse;

#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouse {
    graph: Graph,
}

impl InMemoryWarehouse {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let graph = Graph::read_json_file(path)?;
        tracing::info!(path = %path.display(), entities = graph.len(), "warehouse loaded");
        Ok(Self::new(graph))
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

impl Warehouse for InMemoryWarehouse {
    fn get_by_canonical_key(
        &self,
        key: &EntityKey,
        kind: EntityKind,
    ) -> anyhow::Result<Option<Entity>> {
        Ok(self.graph.get_of_kind(key, kind).cloned())
    }

    fn create_canonical_copy(
        &self,
        key: &EntityKey,
        kind: EntityKind,
    ) -> anyhow::Result<Option<Graph>> {
        if self.graph.get_of_kind(key, kind).is_none() {
            return Ok(None);
        }
        Ok(self.graph.closure(key))
    }
}
