//! Graph substitution: link rewriting and feature migration.
//!
//! Rewriting touches only entities the referrer index lists as pointing at a
//! replaced key, and never the `entityFeatureOf` back-link. Back-links are
//! handled by [`migrate_features`], which moves a feature to the canonical
//! entity only when the feature agrees about who owns it.

use std::collections::BTreeSet;

use pathwaygraph_model::{props, EntityKey, Graph, ReferrerIndex};

use crate::run::ReplacementMap;
use crate::warnings::DataQualityWarning;

/// Rewrite every link to a replaced entity so it points at the canonical
/// one, updating `index` to match. Returns the number of link targets
/// changed.
pub fn substitute_references(
    source: &mut Graph,
    index: &mut ReferrerIndex,
    replacements: &ReplacementMap,
) -> usize {
    let referrers: BTreeSet<EntityKey> = replacements
        .iter()
        .filter(|(old, canonical)| old != canonical)
        .flat_map(|(old, _)| index.referrers_of(old))
        .filter(|r| r.property != props::ENTITY_FEATURE_OF)
        .map(|r| r.key.clone())
        .collect();

    let mut rewritten = 0;
    for key in &referrers {
        let Some(entity) = source.get_mut(key) else {
            continue;
        };
        let moves: Vec<(String, EntityKey, EntityKey)> = entity
            .all_targets()
            .filter(|(prop, _)| *prop != props::ENTITY_FEATURE_OF)
            .filter_map(|(prop, target)| {
                let canonical = replacements.get(target).filter(|c| *c != target)?;
                Some((prop.to_string(), target.clone(), canonical.clone()))
            })
            .collect();

        rewritten += entity.rewrite_targets(&[props::ENTITY_FEATURE_OF], |target| {
            replacements.get(target).cloned()
        });
        for (prop, old, canonical) in &moves {
            index.forget(key, prop, old);
            index.record(key, prop, canonical);
        }
    }

    tracing::debug!(referrers = referrers.len(), rewritten, "references substituted");
    rewritten
}

#[derive(Debug, Default)]
pub struct Migration {
    pub migrated: usize,
    pub warnings: Vec<DataQualityWarning>,
}

/// Move features of replaced entities onto their canonical entity.
///
/// A feature listed by `old` whose `entityFeatureOf` is `old` is detached
/// from `old`, attached to the canonical entity in `staging`, and its
/// back-link set to the canonical key. Any other listed feature stays
/// attached to `old` and is reported.
pub fn migrate_features(
    source: &mut Graph,
    staging: &mut Graph,
    replacements: &ReplacementMap,
) -> Migration {
    let mut migration = Migration::default();

    for (old, canonical) in replacements.iter() {
        let features: Vec<EntityKey> = match source.get(old) {
            Some(entity) => entity.targets(props::ENTITY_FEATURE).into_iter().cloned().collect(),
            None => continue,
        };

        for feature in features {
            let declared_owner = source
                .get(&feature)
                .and_then(|f| f.single(props::ENTITY_FEATURE_OF))
                .cloned();
            if declared_owner.as_ref() != Some(old) {
                migration.warnings.push(DataQualityWarning::FeatureOwnerMismatch {
                    feature,
                    holder: old.clone(),
                    declared_owner,
                });
                continue;
            }

            if let Some(holder) = source.get_mut(old) {
                holder.remove_from(props::ENTITY_FEATURE, &feature);
            }
            if let Some(target) = staging.get_mut(canonical) {
                target.add_to(props::ENTITY_FEATURE, feature.clone());
            }
            if let Some(f) = source.get_mut(&feature) {
                f.set_single(props::ENTITY_FEATURE_OF, canonical.clone());
            }
            migration.migrated += 1;
        }
    }

    tracing::debug!(
        migrated = migration.migrated,
        mismatched = migration.warnings.len(),
        "features migrated"
    );
    migration
}
