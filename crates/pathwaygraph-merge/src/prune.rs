//! Dangling-node pruning.
//!
//! Entities, interactions and pathways are roots. Every other node survives
//! only if some chain of forward links from a root reaches it. Computing the
//! reachable set in one traversal gives the fixed point directly: removing
//! one unreachable node never makes a reachable one unreachable, and cycles
//! among dead nodes (a reference and its features, say) go away together.

use pathwaygraph_model::{EntityKey, Graph};

/// Remove unreachable non-root entities. Returns the removed keys in key
/// order.
pub fn prune_dangling(graph: &mut Graph) -> Vec<EntityKey> {
    let roots: Vec<EntityKey> = graph
        .iter()
        .filter(|e| e.kind().is_root())
        .map(|e| e.key().clone())
        .collect();
    let reachable = graph.reachable_from(roots.iter());

    let doomed: Vec<EntityKey> = graph
        .keys()
        .filter(|k| !reachable.contains(*k))
        .cloned()
        .collect();
    for key in &doomed {
        graph.remove(key);
    }

    tracing::debug!(roots = roots.len(), removed = doomed.len(), "dangling nodes pruned");
    doomed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathwaygraph_model::{props, Entity, EntityKind};

    #[test]
    fn removal_cascades_through_vocabularies() {
        let mut g = Graph::from_entities([
            Entity::new("pe", EntityKind::PhysicalEntity).with_single(props::ENTITY_REFERENCE, "er"),
            Entity::new("er", EntityKind::ProteinReference).with_member(props::XREF, "ux"),
            Entity::xref("ux", EntityKind::UnificationXref, "uniprot", "P1", None),
            Entity::xref("rx", EntityKind::RelationshipXref, "cas", "1", Some("entry_name"))
                .with_single(props::RELATIONSHIP_TYPE, "vocab"),
            Entity::new("vocab", EntityKind::Vocabulary),
            Entity::new("lonely-pathway", EntityKind::Pathway),
        ])
        .unwrap();

        let removed = prune_dangling(&mut g);
        let removed: Vec<&str> = removed.iter().map(EntityKey::as_str).collect();
        assert_eq!(removed, vec!["rx", "vocab"]);
        assert!(g.contains_key(&"lonely-pathway".into()));
        assert!(g.dangling_references().is_empty());
    }

    #[test]
    fn dead_reference_feature_cycles_are_removed() {
        let mut g = Graph::from_entities([
            Entity::new("pe", EntityKind::PhysicalEntity).with_single(props::ENTITY_REFERENCE, "new"),
            Entity::new("new", EntityKind::ProteinReference),
            Entity::new("old", EntityKind::ProteinReference).with_member(props::ENTITY_FEATURE, "f"),
            Entity::new("f", EntityKind::EntityFeature).with_single(props::ENTITY_FEATURE_OF, "old"),
        ])
        .unwrap();

        let removed = prune_dangling(&mut g);
        assert_eq!(removed.len(), 2);
        assert_eq!(g.len(), 2);
    }
}
