//! Well-known property names.
//!
//! Link-valued properties point at other entities, attribute properties hold
//! literals. Anything not listed here is still carried through merges
//! verbatim.

// Link-valued
pub const XREF: &str = "xref";
pub const ENTITY_FEATURE: &str = "entityFeature";
pub const ENTITY_FEATURE_OF: &str = "entityFeatureOf";
pub const FEATURE: &str = "feature";
pub const ENTITY_REFERENCE: &str = "entityReference";
pub const MEMBER_ENTITY_REFERENCE: &str = "memberEntityReference";
pub const ORGANISM: &str = "organism";
pub const RELATIONSHIP_TYPE: &str = "relationshipType";
pub const STRUCTURE: &str = "structure";
pub const PARTICIPANT: &str = "participant";
pub const COMPONENT: &str = "component";
pub const PATHWAY_COMPONENT: &str = "pathwayComponent";
pub const DATA_SOURCE: &str = "dataSource";

// Attributes
pub const DB: &str = "db";
pub const ID: &str = "id";
pub const ID_VERSION: &str = "idVersion";
pub const SEQUENCE: &str = "sequence";
pub const NAME: &str = "name";
pub const DISPLAY_NAME: &str = "displayName";
pub const STANDARD_NAME: &str = "standardName";
pub const COMMENT: &str = "comment";
pub const TERM: &str = "term";
