//! In-memory mapping table with a bincode on-disk form.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use pathwaygraph_model::MappingDomain;

use crate::{MappedId, Mapping, MappingError, MappingQuery, MappingTable};

/// `(domain, namespace, id)` -> canonical id.
///
/// Domains are independent partitions: the same literal source id can map
/// differently in the gene and the chemical domain.
#[derive(Debug, Clone, Default)]
pub struct IdMappingTable {
    entries: AHashMap<MappingQuery, MappedId>,
}

#[derive(Serialize, Deserialize)]
struct TableFile {
    version: u32,
    mappings: Vec<Mapping>,
}

const TABLE_FILE_VERSION: u32 = 1;

impl IdMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a normalized record. A later record for the same source
    /// replaces the earlier one; the replaced target is returned.
    pub fn insert(&mut self, mapping: Mapping) -> Option<MappedId> {
        let previous = self.entries.insert(mapping.query(), mapping.target());
        if let Some(prev) = &previous {
            if *prev != mapping.target() {
                tracing::debug!(
                    src = %mapping.src,
                    src_id = %mapping.src_id,
                    old = %prev.id,
                    new = %mapping.dest_id,
                    "mapping replaced"
                );
            }
        }
        previous
    }

    /// Convenience for building tables by hand: normalizes and validates.
    pub fn add(
        &mut self,
        domain: MappingDomain,
        src: &str,
        src_id: &str,
        dest: &str,
        dest_id: &str,
    ) -> Result<(), MappingError> {
        let mapping = Mapping::new(domain, src, src_id, dest, dest_id)?;
        self.insert(mapping);
        Ok(())
    }

    /// All records, sorted for stable output.
    pub fn mappings(&self) -> Vec<Mapping> {
        let mut out: Vec<Mapping> = self
            .entries
            .iter()
            .map(|(q, t)| Mapping {
                domain: q.domain,
                src: q.namespace.clone(),
                src_id: q.id.clone(),
                dest: t.namespace.clone(),
                dest_id: t.id.clone(),
            })
            .collect();
        out.sort_by(|a, b| {
            (a.domain, &a.src, &a.src_id).cmp(&(b.domain, &b.src, &b.src_id))
        });
        out
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn save(&self, path: &Path) -> Result<(), MappingError> {
        let file = TableFile {
            version: TABLE_FILE_VERSION,
            mappings: self.mappings(),
        };
        let bytes = bincode::serialize(&file)?;
        std::fs::write(path, bytes)?;
        tracing::info!(path = %path.display(), mappings = file.mappings.len(), "mapping table saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let bytes = std::fs::read(path)?;
        let file: TableFile = bincode::deserialize(&bytes)?;
        if file.version != TABLE_FILE_VERSION {
            return Err(MappingError::InvalidRecord(format!(
                "unsupported mapping table version {}",
                file.version
            )));
        }
        let mut table = Self::new();
        for mapping in file.mappings {
            table.insert(mapping);
        }
        tracing::info!(path = %path.display(), mappings = table.len(), "mapping table loaded");
        Ok(table)
    }
}

impl FromIterator<Mapping> for IdMappingTable {
    fn from_iter<I: IntoIterator<Item = Mapping>>(iter: I) -> Self {
        let mut table = Self::new();
        for mapping in iter {
            table.insert(mapping);
        }
        table
    }
}

impl MappingTable for IdMappingTable {
    fn lookup_normalized(&self, query: &MappingQuery) -> anyhow::Result<Option<MappedId>> {
        Ok(self.entries.get(query).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> IdMappingTable {
        let mut t = IdMappingTable::new();
        t.add(MappingDomain::Gene, "RefSeq", "NP_000537", "UNIPROT", "P04637")
            .unwrap();
        t.add(MappingDomain::Gene, "uniprot", "P04637", "UNIPROT", "P04637")
            .unwrap();
        t.add(MappingDomain::Chemical, "pubchem-substance", "14438", "CHEBI", "CHEBI:20")
            .unwrap();
        t
    }

    #[test]
    fn lookups_normalize_the_query() {
        let t = table();
        let hit = t
            .lookup("REFSEQ", "NP_000537.3", MappingDomain::Gene)
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, "P04637");

        let isoform = t.lookup("UniProt", "P04637-2", MappingDomain::Gene).unwrap();
        assert_eq!(isoform.unwrap().id, "P04637");

        let sid = t
            .lookup("PubChem-substance", "SID:14438", MappingDomain::Chemical)
            .unwrap();
        assert_eq!(sid.unwrap().id, "CHEBI:20");
    }

    #[test]
    fn domains_do_not_collide() {
        let t = table();
        assert!(t
            .lookup("RefSeq", "NP_000537", MappingDomain::Chemical)
            .unwrap()
            .is_none());
        assert!(t.lookup("", "NP_000537", MappingDomain::Gene).unwrap().is_none());
    }

    #[test]
    fn later_records_replace_earlier_ones() {
        let mut t = table();
        let replaced = t.insert(
            Mapping::new(MappingDomain::Gene, "refseq", "NP_000537", "uniprot", "Q00000").unwrap(),
        );
        assert_eq!(replaced.unwrap().id, "P04637");
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idmap.bin");
        let t = table();
        t.save(&path).unwrap();

        let loaded = IdMappingTable::load(&path).unwrap();
        assert_eq!(loaded.mappings(), t.mappings());
    }
}
