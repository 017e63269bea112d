//! Merge configuration, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::coordinator::SourceGraph;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Merge source graphs that failed upstream validation.
    pub force: bool,
    /// Which source graphs of a batch to merge.
    pub dataset: DatasetFilter,
    pub resolver: ResolverConfig,
    pub cleanup: CleanupConfig,
    /// Compute resolution plans on the rayon pool. Materialization,
    /// substitution and commit stay serial.
    pub parallel_resolution: bool,
}

impl MergeConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&contents)?;
        config.dataset = DatasetFilter::new(
            config.dataset.identifier.as_deref(),
            config.dataset.version.as_deref(),
        );
        Ok(config)
    }
}

/// Selects source graphs by dataset identifier and version. No identifier
/// selects everything; a version without an identifier is meaningless and
/// is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetFilter {
    pub identifier: Option<String>,
    pub version: Option<String>,
}

impl DatasetFilter {
    pub fn new(identifier: Option<&str>, version: Option<&str>) -> Self {
        match identifier.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self {
                identifier: Some(id.to_string()),
                version: version
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string),
            },
            None => Self::default(),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, source: &SourceGraph) -> bool {
        let Some(identifier) = &self.identifier else {
            return true;
        };
        if *identifier != source.identifier {
            return false;
        }
        self.version
            .as_ref()
            .map_or(true, |version| *version == source.version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Fall back to relationship cross-references when nothing else matched.
    pub use_relationship_xrefs: bool,
    /// Keep scanning unification cross-references after the first hit to
    /// report entities whose cross-references map to different ids.
    pub report_ambiguous_unification: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            use_relationship_xrefs: true,
            report_ambiguous_unification: true,
        }
    }
}

/// Cleanup applied to a canonical copy when it is first staged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// `idVersion` marker of relationship xrefs produced in bulk by a
    /// converter (compared case-insensitively).
    pub converter_marker: String,
    /// Link properties the xref cleanup recurses through.
    pub member_properties: Vec<String>,
    /// Attributes dropped from every reference entity of the copy.
    pub stripped_attributes: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            converter_marker: "entry_name".to_string(),
            member_properties: vec![pathwaygraph_model::props::MEMBER_ENTITY_REFERENCE.to_string()],
            stripped_attributes: vec![pathwaygraph_model::props::SEQUENCE.to_string()],
        }
    }
}
