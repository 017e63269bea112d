//! Entities, kinds and links.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::props;

// ============================================================================
// Identity
// ============================================================================

/// Globally unique identity key of an entity (usually a URI).
///
/// Keys are set at construction and never rewritten; merges track identity
/// changes through a replacement map instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for EntityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Kinds
// ============================================================================

/// Closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    // Reference entities (resolvable against the warehouse)
    ProteinReference,
    SmallMoleculeReference,
    // Cross-references
    UnificationXref,
    RelationshipXref,
    PublicationXref,
    // Other utility kinds
    Vocabulary,
    EntityFeature,
    BioSource,
    ChemicalStructure,
    Provenance,
    // Entities and processes (always roots)
    PhysicalEntity,
    Complex,
    Interaction,
    Pathway,
}

impl EntityKind {
    /// Reference entities describe a molecule or gene product and can be
    /// replaced by a canonical warehouse entity.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            EntityKind::ProteinReference | EntityKind::SmallMoleculeReference
        )
    }

    pub fn is_xref(self) -> bool {
        matches!(
            self,
            EntityKind::UnificationXref | EntityKind::RelationshipXref | EntityKind::PublicationXref
        )
    }

    /// Entities, interactions and pathways are never pruned.
    pub fn is_root(self) -> bool {
        matches!(
            self,
            EntityKind::PhysicalEntity
                | EntityKind::Complex
                | EntityKind::Interaction
                | EntityKind::Pathway
        )
    }

    /// Mapping domain used to resolve this kind, if it is resolvable at all.
    pub fn mapping_domain(self) -> Option<MappingDomain> {
        match self {
            EntityKind::ProteinReference => Some(MappingDomain::Gene),
            EntityKind::SmallMoleculeReference => Some(MappingDomain::Chemical),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Independent partitions of the identifier mapping table.
///
/// A gene identifier never collides with a compound identifier that happens
/// to have the same literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MappingDomain {
    /// Gene / gene-product identifiers, mapped to UniProt accessions.
    Gene,
    /// Small-molecule identifiers, mapped to ChEBI ids.
    Chemical,
}

impl MappingDomain {
    /// Prefix of canonical keys in this domain (`uniprot:P12345`, `chebi:20`).
    pub fn canonical_prefix(self) -> &'static str {
        match self {
            MappingDomain::Gene => "uniprot",
            MappingDomain::Chemical => "chebi",
        }
    }

    /// Destination namespace stored in mapping records.
    pub fn target_namespace(self) -> &'static str {
        match self {
            MappingDomain::Gene => "UNIPROT",
            MappingDomain::Chemical => "CHEBI",
        }
    }

    /// Canonical entity key for a mapped identifier.
    pub fn canonical_key(self, canonical_id: &str) -> EntityKey {
        let id = match self {
            MappingDomain::Chemical => strip_prefix_ignore_case(canonical_id, "CHEBI:"),
            MappingDomain::Gene => canonical_id,
        };
        EntityKey::new(format!("{}:{}", self.canonical_prefix(), id))
    }

    pub fn is_canonical_key(self, key: &EntityKey) -> bool {
        key.as_str()
            .strip_prefix(self.canonical_prefix())
            .and_then(|rest| rest.strip_prefix(':'))
            .is_some_and(|id| !id.is_empty())
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> &'a str {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &s[prefix.len()..],
        _ => s,
    }
}

// ============================================================================
// Links
// ============================================================================

/// A link-valued property: one target or a set of targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    One(EntityKey),
    Many(BTreeSet<EntityKey>),
}

impl Link {
    pub fn targets(&self) -> Box<dyn Iterator<Item = &EntityKey> + '_> {
        match self {
            Link::One(key) => Box::new(std::iter::once(key)),
            Link::Many(keys) => Box::new(keys.iter()),
        }
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        match self {
            Link::One(k) => k == key,
            Link::Many(keys) => keys.contains(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Link::Many(keys) if keys.is_empty())
    }
}

// ============================================================================
// Entity
// ============================================================================

/// A node of an entity graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    key: EntityKey,
    kind: EntityKind,
    #[serde(default)]
    attrs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    links: BTreeMap<String, Link>,
}

impl Entity {
    pub fn new(key: impl Into<EntityKey>, kind: EntityKind) -> Self {
        Self {
            key: key.into(),
            kind,
            attrs: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_attr_value(name, value);
        self
    }

    pub fn with_single(mut self, property: &str, target: impl Into<EntityKey>) -> Self {
        self.set_single(property, target.into());
        self
    }

    pub fn with_member(mut self, property: &str, target: impl Into<EntityKey>) -> Self {
        self.add_to(property, target.into());
        self
    }

    /// Cross-reference builder: sets `db`, `id` and optionally `idVersion`.
    pub fn xref(
        key: impl Into<EntityKey>,
        kind: EntityKind,
        db: &str,
        id: &str,
        version: Option<&str>,
    ) -> Self {
        let mut x = Self::new(key, kind).with_attr(props::DB, db).with_attr(props::ID, id);
        if let Some(v) = version {
            x.set_attr(props::ID_VERSION, v);
        }
        x
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    pub fn attrs(&self) -> &BTreeMap<String, Vec<String>> {
        &self.attrs
    }

    /// First value of an attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.insert(name.to_string(), vec![value.into()]);
    }

    pub fn add_attr_value(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let values = self.attrs.entry(name.to_string()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Vec<String>> {
        self.attrs.remove(name)
    }

    // ------------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------------

    pub fn links(&self) -> &BTreeMap<String, Link> {
        &self.links
    }

    pub fn link(&self, property: &str) -> Option<&Link> {
        self.links.get(property)
    }

    /// Target of a single-valued link.
    pub fn single(&self, property: &str) -> Option<&EntityKey> {
        match self.links.get(property) {
            Some(Link::One(key)) => Some(key),
            _ => None,
        }
    }

    /// Targets of a link property, in key order. Empty when absent.
    pub fn targets(&self, property: &str) -> Vec<&EntityKey> {
        self.links
            .get(property)
            .map(|link| link.targets().collect())
            .unwrap_or_default()
    }

    /// Every `(property, target)` pair of this entity.
    pub fn all_targets(&self) -> impl Iterator<Item = (&str, &EntityKey)> {
        self.links
            .iter()
            .flat_map(|(prop, link)| link.targets().map(move |t| (prop.as_str(), t)))
    }

    pub fn set_single(&mut self, property: &str, target: EntityKey) {
        self.links.insert(property.to_string(), Link::One(target));
    }

    /// Add a target to a set-valued link. A single-valued link is widened to
    /// a set holding both targets. Returns `false` if already present.
    pub fn add_to(&mut self, property: &str, target: EntityKey) -> bool {
        match self.links.get_mut(property) {
            Some(Link::Many(keys)) => keys.insert(target),
            Some(Link::One(existing)) => {
                if *existing == target {
                    return false;
                }
                let keys: BTreeSet<EntityKey> = [existing.clone(), target].into_iter().collect();
                self.links.insert(property.to_string(), Link::Many(keys));
                true
            }
            None => {
                self.links
                    .insert(property.to_string(), Link::Many(BTreeSet::from([target])));
                true
            }
        }
    }

    /// Remove one target from a link. An emptied single-valued link is
    /// dropped entirely. Returns `true` if something was removed.
    pub fn remove_from(&mut self, property: &str, target: &EntityKey) -> bool {
        match self.links.get_mut(property) {
            Some(Link::Many(keys)) => keys.remove(target),
            Some(Link::One(existing)) if existing == target => {
                self.links.remove(property);
                true
            }
            _ => false,
        }
    }

    pub fn clear_link(&mut self, property: &str) -> Option<Link> {
        self.links.remove(property)
    }

    /// Rewrite link targets through `f` (returning `Some(new)` replaces the
    /// target), skipping the listed properties. Returns how many targets
    /// changed.
    pub fn rewrite_targets<F>(&mut self, skip: &[&str], mut f: F) -> usize
    where
        F: FnMut(&EntityKey) -> Option<EntityKey>,
    {
        let mut changed = 0;
        for (prop, link) in self.links.iter_mut() {
            if skip.contains(&prop.as_str()) {
                continue;
            }
            match link {
                Link::One(key) => {
                    if let Some(new_key) = f(key) {
                        if new_key != *key {
                            *key = new_key;
                            changed += 1;
                        }
                    }
                }
                Link::Many(keys) => {
                    let mut next = BTreeSet::new();
                    for key in keys.iter() {
                        match f(key) {
                            Some(new_key) if new_key != *key => {
                                changed += 1;
                                next.insert(new_key);
                            }
                            _ => {
                                next.insert(key.clone());
                            }
                        }
                    }
                    *keys = next;
                }
            }
        }
        changed
    }

    /// Merge another version of the same entity into this one: attributes
    /// and single-valued links take the incoming value, set-valued links are
    /// unioned.
    pub fn absorb(&mut self, incoming: &Entity) {
        debug_assert_eq!(self.key, incoming.key);
        for (name, values) in &incoming.attrs {
            self.attrs.insert(name.clone(), values.clone());
        }
        for (prop, link) in &incoming.links {
            match (self.links.get_mut(prop), link) {
                (Some(Link::Many(existing)), Link::Many(new_keys)) => {
                    existing.extend(new_keys.iter().cloned());
                }
                _ => {
                    self.links.insert(prop.clone(), link.clone());
                }
            }
        }
    }

    /// Cross-reference view, if this entity is a cross-reference.
    pub fn as_xref(&self) -> Option<XrefView<'_>> {
        if !self.kind.is_xref() {
            return None;
        }
        Some(XrefView {
            kind: self.kind,
            db: self.attr(props::DB)?,
            id: self.attr(props::ID)?,
            version: self.attr(props::ID_VERSION),
        })
    }
}

/// Borrowed `(namespace, identifier, version)` triple of a cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefView<'a> {
    pub kind: EntityKind,
    pub db: &'a str,
    pub id: &'a str,
    pub version: Option<&'a str>,
}

impl XrefView<'_> {
    pub fn is_unification(&self) -> bool {
        self.kind == EntityKind::UnificationXref
    }

    pub fn is_relationship(&self) -> bool {
        self.kind == EntityKind::RelationshipXref
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys_per_domain() {
        assert_eq!(
            MappingDomain::Chemical.canonical_key("CHEBI:20").as_str(),
            "chebi:20"
        );
        assert_eq!(MappingDomain::Chemical.canonical_key("20").as_str(), "chebi:20");
        assert_eq!(
            MappingDomain::Gene.canonical_key("P12345").as_str(),
            "uniprot:P12345"
        );

        assert!(MappingDomain::Gene.is_canonical_key(&"uniprot:P12345".into()));
        assert!(!MappingDomain::Gene.is_canonical_key(&"uniprot:".into()));
        assert!(!MappingDomain::Gene.is_canonical_key(&"http://id/uniprot/P12345".into()));
        assert!(!MappingDomain::Chemical.is_canonical_key(&"uniprot:P12345".into()));
    }

    #[test]
    fn add_to_widens_single_link() {
        let mut e = Entity::new("pe", EntityKind::PhysicalEntity).with_single(props::XREF, "x1");
        assert!(e.add_to(props::XREF, "x2".into()));
        assert!(!e.add_to(props::XREF, "x2".into()));
        assert_eq!(e.targets(props::XREF).len(), 2);
    }

    #[test]
    fn remove_from_drops_single_link() {
        let mut f = Entity::new("f", EntityKind::EntityFeature)
            .with_single(props::ENTITY_FEATURE_OF, "er");
        assert!(!f.remove_from(props::ENTITY_FEATURE_OF, &"other".into()));
        assert!(f.remove_from(props::ENTITY_FEATURE_OF, &"er".into()));
        assert!(f.link(props::ENTITY_FEATURE_OF).is_none());
    }

    #[test]
    fn rewrite_targets_respects_skip_list() {
        let mut e = Entity::new("f", EntityKind::EntityFeature)
            .with_single(props::ENTITY_FEATURE_OF, "old")
            .with_member(props::XREF, "old");
        let changed = e.rewrite_targets(&[props::ENTITY_FEATURE_OF], |k| {
            (k.as_str() == "old").then(|| EntityKey::new("new"))
        });
        assert_eq!(changed, 1);
        assert_eq!(e.single(props::ENTITY_FEATURE_OF).unwrap().as_str(), "old");
        assert_eq!(e.targets(props::XREF)[0].as_str(), "new");
    }

    #[test]
    fn absorb_unions_sets_and_overwrites_scalars() {
        let mut stored = Entity::new("uniprot:P1", EntityKind::ProteinReference)
            .with_attr(props::DISPLAY_NAME, "OLD")
            .with_member(props::ENTITY_FEATURE, "f1");
        let incoming = Entity::new("uniprot:P1", EntityKind::ProteinReference)
            .with_attr(props::DISPLAY_NAME, "NEW")
            .with_member(props::ENTITY_FEATURE, "f2");
        stored.absorb(&incoming);
        assert_eq!(stored.attr(props::DISPLAY_NAME), Some("NEW"));
        assert_eq!(stored.targets(props::ENTITY_FEATURE).len(), 2);
    }

    #[test]
    fn xref_view_requires_xref_kind() {
        let x = Entity::xref("x", EntityKind::UnificationXref, "uniprot", "P1", None);
        let view = x.as_xref().unwrap();
        assert!(view.is_unification());
        assert_eq!(view.db, "uniprot");
        assert!(Entity::new("v", EntityKind::Vocabulary).as_xref().is_none());
    }
}
