//! Cleanup of a freshly copied canonical entity, applied once when the copy
//! is first staged.
//!
//! - relationship xrefs carrying the converter marker as `idVersion` are
//!   unlinked from the canonical entity and, recursively, from its members;
//! - heavy attributes (raw sequences) are dropped from every reference
//!   entity visited.
//!
//! Unlinked xrefs stay in the copy; the pruner removes them, together with
//! anything only they referenced.

use std::collections::BTreeSet;

use pathwaygraph_model::{props, Entity, EntityKey, Graph};

use crate::config::CleanupConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub xrefs_unlinked: usize,
    pub attributes_stripped: usize,
}

pub fn clean_canonical_copy(copy: &mut Graph, root: &EntityKey, config: &CleanupConfig) -> CleanupStats {
    let mut stats = CleanupStats::default();
    let mut visited = BTreeSet::new();
    let mut stack = vec![root.clone()];

    while let Some(key) = stack.pop() {
        if !visited.insert(key.clone()) {
            continue;
        }
        let Some(entity) = copy.get(&key) else {
            continue;
        };
        if !entity.kind().is_reference() {
            continue;
        }

        let doomed: Vec<EntityKey> = entity
            .targets(props::XREF)
            .into_iter()
            .filter(|x| is_converter_xref(copy.get(x), &config.converter_marker))
            .cloned()
            .collect();
        let members: Vec<EntityKey> = config
            .member_properties
            .iter()
            .flat_map(|p| entity.targets(p))
            .cloned()
            .collect();

        if let Some(entity) = copy.get_mut(&key) {
            for xref in &doomed {
                if entity.remove_from(props::XREF, xref) {
                    stats.xrefs_unlinked += 1;
                }
            }
            for attr in &config.stripped_attributes {
                if entity.remove_attr(attr).is_some() {
                    stats.attributes_stripped += 1;
                }
            }
        }
        stack.extend(members);
    }

    if stats.xrefs_unlinked > 0 || stats.attributes_stripped > 0 {
        tracing::debug!(
            %root,
            xrefs = stats.xrefs_unlinked,
            attributes = stats.attributes_stripped,
            "canonical copy cleaned"
        );
    }
    stats
}

fn is_converter_xref(xref: Option<&Entity>, marker: &str) -> bool {
    xref.and_then(Entity::as_xref).is_some_and(|x| {
        x.is_relationship() && x.version.is_some_and(|v| v.eq_ignore_ascii_case(marker))
    })
}
