//! Identifier normalization applied before every mapping lookup and before
//! every mapping record is stored.
//!
//! Normalization is idempotent: feeding its output back in yields the same
//! namespace and identifier.

use regex::Regex;
use std::sync::OnceLock;

fn isoform_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\d+$").expect("static regex"))
}

fn version_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.\d+$").expect("static regex"))
}

fn prefixed_numeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]+:(\d+)$").expect("static regex"))
}

fn numeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").expect("static regex"))
}

// ============================================================================
// Namespaces
// ============================================================================

pub const UNIPROT: &str = "UNIPROT";
pub const REFSEQ: &str = "REFSEQ";
pub const PUBCHEM_COMPOUND: &str = "PUBCHEM-COMPOUND";
pub const PUBCHEM_SUBSTANCE: &str = "PUBCHEM-SUBSTANCE";

/// Namespaces (after canonicalization) that identity keys may encode.
const KNOWN_NAMESPACE_PREFIXES: &[&str] = &[
    UNIPROT,
    REFSEQ,
    "KEGG",
    "NCBIGENE",
    "NCBI GENE",
    "ENTREZ GENE",
    "ENSEMBL",
    "HGNC",
    "CHEBI",
    PUBCHEM_COMPOUND,
    PUBCHEM_SUBSTANCE,
    "DRUGBANK",
    "HMDB",
    "CAS",
    "INCHIKEY",
    "CHEMSPIDER",
];

/// Canonical spelling of a namespace: upper-cased, with the UniProt and
/// PubChem synonyms folded into one name each.
pub fn canonical_namespace(db: &str) -> String {
    let db = db.trim().to_uppercase();
    if db.starts_with(UNIPROT) || db.starts_with("SWISSPROT") || db.contains("TREMBL") {
        UNIPROT.to_string()
    } else if db.starts_with("PUBCHEM") && (db.contains("COMPOUND") || db.contains("CID")) {
        PUBCHEM_COMPOUND.to_string()
    } else if db.starts_with("PUBCHEM") && (db.contains("SUBSTANCE") || db.contains("SID")) {
        PUBCHEM_SUBSTANCE.to_string()
    } else {
        db
    }
}

/// Whether an identity key may encode an identifier of this namespace.
pub fn is_known_namespace(db: &str) -> bool {
    let ns = canonical_namespace(db);
    KNOWN_NAMESPACE_PREFIXES.iter().any(|p| ns.starts_with(p))
}

// ============================================================================
// Identifiers
// ============================================================================

/// Fix an identifier of the given namespace so that variants map like their
/// base form (RefSeq versions and UniProt isoforms in particular, which the
/// mapping table does not list).
pub fn fix_source_id_for_mapping(db: &str, id: &str) -> String {
    let db = canonical_namespace(db);
    let id = id.trim();

    if db == UNIPROT {
        strip_repeated(isoform_suffix(), id)
    } else if db == REFSEQ {
        strip_repeated(version_suffix(), id)
    } else if db.starts_with("KEGG") {
        // e.g. hsa:7157 -> 7157 (an NCBI gene id)
        match prefixed_numeric().captures(id) {
            Some(caps) => caps[1].to_string(),
            None => id.to_string(),
        }
    } else if db == PUBCHEM_SUBSTANCE {
        prefix_numeric(id, "SID:")
    } else if db == PUBCHEM_COMPOUND {
        prefix_numeric(id, "CID:")
    } else {
        id.to_string()
    }
}

fn strip_repeated(suffix: &Regex, id: &str) -> String {
    let mut out = id.to_string();
    while let Some(m) = suffix.find(&out) {
        if m.start() == 0 {
            break;
        }
        out.truncate(m.start());
    }
    out
}

fn prefix_numeric(id: &str, prefix: &str) -> String {
    let id = id.to_uppercase();
    if !id.starts_with(prefix) && numeric().is_match(&id) {
        format!("{prefix}{id}")
    } else {
        id
    }
}

/// Normalized `(namespace, id)` pair, or `None` if either part is blank.
pub fn normalize_pair(db: &str, id: &str) -> Option<(String, String)> {
    if db.trim().is_empty() || id.trim().is_empty() {
        return None;
    }
    let ns = canonical_namespace(db);
    let fixed = fix_source_id_for_mapping(&ns, id);
    if fixed.is_empty() {
        return None;
    }
    Some((ns, fixed))
}

// ============================================================================
// Identity keys
// ============================================================================

/// External `(namespace, id)` encoded in an identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalId {
    pub namespace: String,
    pub id: String,
}

impl ExternalId {
    /// Decode keys shaped like `http://identifiers.org/uniprot/P12345`,
    /// `urn:miriam:uniprot:P12345` or `uniprot:P12345`. Only keys whose
    /// namespace part is a known identifier namespace are accepted.
    pub fn from_key(key: &str) -> Option<Self> {
        let (namespace, id) = if let Some((_, rest)) = key.split_once("://") {
            let path: Vec<&str> = rest
                .trim_end_matches('/')
                .split('/')
                .skip(1)
                .filter(|s| !s.is_empty())
                .collect();
            if path.len() < 2 {
                return None;
            }
            (path[path.len() - 2], path[path.len() - 1])
        } else if let Some(rest) = key.strip_prefix("urn:miriam:") {
            rest.split_once(':')?
        } else {
            key.split_once(':')?
        };

        let id = id.replace("%3A", ":").replace("%3a", ":");
        if id.is_empty() || !is_known_namespace(namespace) {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            id,
        })
    }
}

/// Local identifier of a canonical or identifiers-style key: the part after
/// the last `/`, or after the first `:` for `prefix:id` keys.
pub fn id_from_normalized_key(key: &str) -> &str {
    if key.contains("://") {
        key.rsplit('/').next().unwrap_or(key)
    } else {
        key.split_once(':').map(|(_, id)| id).unwrap_or(key)
    }
}
