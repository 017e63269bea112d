//! Pathwaygraph entity model
//!
//! A source graph, the warehouse and the persistent target store all speak the
//! same vocabulary:
//!
//! ```text
//!   Interaction ──participant──► PhysicalEntity ──entityReference──► ProteinReference
//!                                     │                                 │   ▲
//!                                  feature                    entityFeature │ entityFeatureOf
//!                                     ▼                                 ▼   │
//!                               EntityFeature ◄───────────────────── EntityFeature
//!
//!   ProteinReference ──xref──► UnificationXref (db, id)
//!                   ──xref──► RelationshipXref ──relationshipType──► Vocabulary
//! ```
//!
//! - Every node is an [`Entity`] with an immutable [`EntityKey`] and a closed
//!   [`EntityKind`] tag.
//! - Edges are *forward* references owned by the referring entity ([`Link`]).
//!   Reverse lookups are never implied by setters; they are computed on
//!   demand by [`ReferrerIndex`].
//! - The only stored back-link is a feature's `entityFeatureOf`, which must
//!   agree with the owner's `entityFeature` set.

pub mod entity;
pub mod graph;
pub mod index;
pub mod props;

pub use entity::{Entity, EntityKey, EntityKind, Link, MappingDomain, XrefView};
pub use graph::{DanglingReference, Graph, GraphDocument};
pub use index::{Referrer, ReferrerIndex};

/// Errors raised while building or (de)serializing graphs.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("duplicate entity key: {0}")]
    DuplicateKey(EntityKey),

    #[error("unknown entity: {0}")]
    UnknownEntity(EntityKey),

    #[error("graph document error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
