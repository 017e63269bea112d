//! Detached, self-contained snapshot handed to the commit step.

use pathwaygraph_model::{EntityKey, Graph};
use pathwaygraph_storage::TargetStore;

use crate::warnings::DataQualityWarning;

/// Independent copy of `graph` in which every link resolves either inside
/// the copy or in the target store. Other links are dropped and reported.
pub fn detached_snapshot(graph: &Graph, store: &dyn TargetStore) -> (Graph, Vec<DataQualityWarning>) {
    let mut snapshot = match graph.base() {
        Some(base) => Graph::with_base(base),
        None => Graph::new(),
    };
    let mut warnings = Vec::new();

    for entity in graph.iter() {
        let mut copy = entity.clone();
        let dangling: Vec<(String, EntityKey)> = entity
            .all_targets()
            .filter(|(_, target)| !graph.contains_key(target) && !store.contains_key(target))
            .map(|(property, target)| (property.to_string(), target.clone()))
            .collect();
        for (property, target) in dangling {
            copy.remove_from(&property, &target);
            if copy.link(&property).is_some_and(|link| link.is_empty()) {
                copy.clear_link(&property);
            }
            warnings.push(DataQualityWarning::DanglingReference {
                referrer: entity.key().clone(),
                property,
                target,
            });
        }
        snapshot.upsert(copy);
    }

    (snapshot, warnings)
}
