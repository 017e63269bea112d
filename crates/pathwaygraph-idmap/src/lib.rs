//! Identifier mapping table
//!
//! Lookup of `(source namespace, source id, mapping domain)` to the canonical
//! `(target namespace, canonical id)` pair, e.g. a RefSeq protein id to a
//! UniProt accession or a PubChem substance id to a ChEBI id.
//!
//! Both sides of the table go through [`normalize`]: records are normalized
//! when stored and queries are normalized before lookup, so namespace
//! spelling and isoform/version suffixes never cause a miss.
//!
//! A miss is not an error; it means "treat the entity as unmapped".

pub mod cache;
pub mod normalize;
pub mod table;

use pathwaygraph_model::{EntityKey, MappingDomain};
use serde::{Deserialize, Serialize};

pub use cache::CachedMappingTable;
pub use normalize::{canonical_namespace, fix_source_id_for_mapping, ExternalId};
pub use table::IdMappingTable;

const MAX_SRC_LEN: usize = 30;
const MAX_DEST_LEN: usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("invalid mapping record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mapping table codec error: {0}")]
    Codec(#[from] bincode::Error),
}

// ============================================================================
// Records and queries
// ============================================================================

/// One stored mapping, already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub domain: MappingDomain,
    pub src: String,
    pub src_id: String,
    pub dest: String,
    pub dest_id: String,
}

impl Mapping {
    pub fn new(
        domain: MappingDomain,
        src: &str,
        src_id: &str,
        dest: &str,
        dest_id: &str,
    ) -> Result<Self, MappingError> {
        let (src, src_id) = normalize::normalize_pair(src, src_id).ok_or_else(|| {
            MappingError::InvalidRecord(format!("blank source in {src}:{src_id}"))
        })?;
        let dest = dest.trim().to_uppercase();
        let dest_id = dest_id.trim().to_string();
        if dest.is_empty() || dest_id.is_empty() {
            return Err(MappingError::InvalidRecord(format!(
                "blank destination for {src}:{src_id}"
            )));
        }
        if src.len() > MAX_SRC_LEN || src_id.len() > MAX_SRC_LEN {
            return Err(MappingError::InvalidRecord(format!(
                "source {src}:{src_id} longer than {MAX_SRC_LEN}"
            )));
        }
        if dest.len() > MAX_DEST_LEN || dest_id.len() > MAX_DEST_LEN {
            return Err(MappingError::InvalidRecord(format!(
                "destination {dest}:{dest_id} longer than {MAX_DEST_LEN}"
            )));
        }
        Ok(Self {
            domain,
            src,
            src_id,
            dest,
            dest_id,
        })
    }

    pub fn query(&self) -> MappingQuery {
        MappingQuery {
            domain: self.domain,
            namespace: self.src.clone(),
            id: self.src_id.clone(),
        }
    }

    pub fn target(&self) -> MappedId {
        MappedId {
            namespace: self.dest.clone(),
            id: self.dest_id.clone(),
        }
    }
}

impl std::fmt::Display for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{},{}:{}", self.src, self.src_id, self.dest, self.dest_id)
    }
}

/// A normalized lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingQuery {
    pub domain: MappingDomain,
    pub namespace: String,
    pub id: String,
}

impl MappingQuery {
    /// Normalize a raw `(namespace, id)`; `None` for blank input.
    pub fn new(namespace: &str, id: &str, domain: MappingDomain) -> Option<Self> {
        let (namespace, id) = normalize::normalize_pair(namespace, id)?;
        Some(Self {
            domain,
            namespace,
            id,
        })
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappedId {
    pub namespace: String,
    pub id: String,
}

impl MappedId {
    /// Canonical entity key of the mapped identifier in `domain`.
    pub fn canonical_key(&self, domain: MappingDomain) -> EntityKey {
        domain.canonical_key(&self.id)
    }
}

// ============================================================================
// Table contract
// ============================================================================

/// Read-only identifier mapping.
///
/// Implementations only see normalized queries; callers use
/// [`MappingTable::lookup`], which normalizes first. Lookups must be
/// referentially transparent for the lifetime of the process.
pub trait MappingTable: Send + Sync {
    fn lookup_normalized(&self, query: &MappingQuery) -> anyhow::Result<Option<MappedId>>;

    fn lookup(
        &self,
        namespace: &str,
        id: &str,
        domain: MappingDomain,
    ) -> anyhow::Result<Option<MappedId>> {
        match MappingQuery::new(namespace, id, domain) {
            Some(query) => self.lookup_normalized(&query),
            None => Ok(None),
        }
    }
}

impl<T: MappingTable + ?Sized> MappingTable for std::sync::Arc<T> {
    fn lookup_normalized(&self, query: &MappingQuery) -> anyhow::Result<Option<MappedId>> {
        (**self).lookup_normalized(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_normalized_on_construction() {
        let m = Mapping::new(MappingDomain::Gene, "SwissProt", "P01116-2", "uniprot", "P01116")
            .unwrap();
        assert_eq!(m.src, "UNIPROT");
        assert_eq!(m.src_id, "P01116");
        assert_eq!(m.dest, "UNIPROT");
        assert_eq!(m.to_string(), "UNIPROT:P01116,UNIPROT:P01116");
    }

    #[test]
    fn oversized_records_are_rejected() {
        let long = "X".repeat(31);
        assert!(matches!(
            Mapping::new(MappingDomain::Chemical, "inchikey", &long, "chebi", "CHEBI:1"),
            Err(MappingError::InvalidRecord(_))
        ));
        assert!(matches!(
            Mapping::new(MappingDomain::Chemical, "cas", "50-00-0", "chebi", "CHEBI:1234567890123"),
            Err(MappingError::InvalidRecord(_))
        ));
        assert!(Mapping::new(MappingDomain::Chemical, "", "1", "chebi", "CHEBI:1").is_err());
    }

    #[test]
    fn mapped_ids_give_canonical_keys() {
        let mapped = MappedId {
            namespace: "CHEBI".to_string(),
            id: "CHEBI:20".to_string(),
        };
        assert_eq!(mapped.canonical_key(MappingDomain::Chemical).as_str(), "chebi:20");
    }
}
