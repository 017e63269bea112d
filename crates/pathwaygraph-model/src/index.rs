//! Explicit reverse-adjacency index ("what refers to this entity").
//!
//! Built from a graph in one pass and then kept current by the caller with
//! [`ReferrerIndex::record`] / [`ReferrerIndex::forget`] as links change.

use ahash::AHashMap;
use std::collections::BTreeSet;

use crate::entity::EntityKey;
use crate::graph::Graph;

/// One incoming reference: `key.property -> target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Referrer {
    pub key: EntityKey,
    pub property: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReferrerIndex {
    by_target: AHashMap<EntityKey, BTreeSet<Referrer>>,
}

impl ReferrerIndex {
    pub fn build(graph: &Graph) -> Self {
        let mut index = Self::default();
        for entity in graph.iter() {
            for (prop, target) in entity.all_targets() {
                index.record(entity.key(), prop, target);
            }
        }
        index
    }

    pub fn record(&mut self, referrer: &EntityKey, property: &str, target: &EntityKey) {
        self.by_target
            .entry(target.clone())
            .or_default()
            .insert(Referrer {
                key: referrer.clone(),
                property: property.to_string(),
            });
    }

    pub fn forget(&mut self, referrer: &EntityKey, property: &str, target: &EntityKey) {
        if let Some(set) = self.by_target.get_mut(target) {
            set.retain(|r| !(r.key == *referrer && r.property == property));
            if set.is_empty() {
                self.by_target.remove(target);
            }
        }
    }

    /// Referrers of `target`, in `(key, property)` order.
    pub fn referrers_of(&self, target: &EntityKey) -> impl Iterator<Item = &Referrer> {
        self.by_target.get(target).into_iter().flatten()
    }

    /// Distinct entities referring to `target` through `property`.
    pub fn owners_via(&self, target: &EntityKey, property: &str) -> Vec<&EntityKey> {
        self.referrers_of(target)
            .filter(|r| r.property == property)
            .map(|r| &r.key)
            .collect()
    }

    pub fn is_referenced(&self, target: &EntityKey) -> bool {
        self.by_target.contains_key(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityKind};
    use crate::props;

    #[test]
    fn shared_xref_has_two_owners() {
        let g = Graph::from_entities([
            Entity::new("a", EntityKind::ProteinReference).with_member(props::XREF, "ux"),
            Entity::new("b", EntityKind::ProteinReference).with_member(props::XREF, "ux"),
            Entity::xref("ux", EntityKind::UnificationXref, "uniprot", "P1", None),
        ])
        .unwrap();
        let index = ReferrerIndex::build(&g);
        let owners = index.owners_via(&"ux".into(), props::XREF);
        assert_eq!(owners.len(), 2);
        assert!(!index.is_referenced(&"a".into()));
    }

    #[test]
    fn forget_drops_empty_entries() {
        let mut index = ReferrerIndex::default();
        index.record(&"a".into(), props::XREF, &"x".into());
        index.forget(&"a".into(), props::XREF, &"x".into());
        assert!(!index.is_referenced(&"x".into()));
    }
}
