//! Data-quality findings. These never abort a merge; each one is logged and
//! carried in the source report.

use std::fmt;

use pathwaygraph_model::EntityKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataQualityWarning {
    /// `holder.entityFeature` lists `feature`, but the feature's back-link
    /// names another owner (or none). The feature is left where it is.
    FeatureOwnerMismatch {
        feature: EntityKey,
        holder: EntityKey,
        declared_owner: Option<EntityKey>,
    },
    /// Several unification xrefs of `entity` map to different canonical
    /// keys; `chosen` (the first hit) was used.
    AmbiguousUnification {
        entity: EntityKey,
        chosen: EntityKey,
        others: Vec<EntityKey>,
    },
    /// One unification xref is attached to several entities.
    SharedUnificationXref {
        xref: EntityKey,
        owners: Vec<EntityKey>,
    },
    /// A link to an entity that exists neither in the merged graph nor in
    /// the target store; the link was dropped.
    DanglingReference {
        referrer: EntityKey,
        property: String,
        target: EntityKey,
    },
}

impl DataQualityWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            DataQualityWarning::FeatureOwnerMismatch { .. } => "feature_owner_mismatch",
            DataQualityWarning::AmbiguousUnification { .. } => "ambiguous_unification",
            DataQualityWarning::SharedUnificationXref { .. } => "shared_unification_xref",
            DataQualityWarning::DanglingReference { .. } => "dangling_reference",
        }
    }

    pub(crate) fn log(&self) {
        match self {
            DataQualityWarning::FeatureOwnerMismatch {
                feature,
                holder,
                declared_owner,
            } => tracing::warn!(
                %feature,
                %holder,
                declared_owner = declared_owner.as_ref().map_or("<none>", EntityKey::as_str),
                "feature back-link names another owner; left in place"
            ),
            DataQualityWarning::AmbiguousUnification {
                entity,
                chosen,
                others,
            } => tracing::warn!(
                %entity,
                %chosen,
                others = others.len(),
                "unification xrefs map to different canonical ids; using the first"
            ),
            DataQualityWarning::SharedUnificationXref { xref, owners } => tracing::warn!(
                %xref,
                owners = owners.len(),
                "unification xref shared by several entities"
            ),
            DataQualityWarning::DanglingReference {
                referrer,
                property,
                target,
            } => tracing::warn!(%referrer, %property, %target, "dangling reference dropped"),
        }
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::FeatureOwnerMismatch {
                feature,
                holder,
                declared_owner,
            } => match declared_owner {
                Some(owner) => write!(f, "{holder} lists feature {feature} owned by {owner}"),
                None => write!(f, "{holder} lists feature {feature} without an owner"),
            },
            DataQualityWarning::AmbiguousUnification {
                entity,
                chosen,
                others,
            } => {
                let others: Vec<&str> = others.iter().map(EntityKey::as_str).collect();
                write!(f, "{entity} resolved to {chosen}; also matched {}", others.join(", "))
            }
            DataQualityWarning::SharedUnificationXref { xref, owners } => {
                write!(f, "unification xref {xref} shared by {} entities", owners.len())
            }
            DataQualityWarning::DanglingReference {
                referrer,
                property,
                target,
            } => write!(f, "{referrer}.{property} -> {target} dropped"),
        }
    }
}
