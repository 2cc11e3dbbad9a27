use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use foundation::{FeatureId, LevelId};
use serde::{Deserialize, Serialize};

/// Answers "how much content hangs off this feature" for the render layer and
/// for leaf selections.
pub trait ContentCatalog: Send + Sync {
    fn content_count(&self, level: &LevelId, feature: &FeatureId) -> u32;

    /// Where a leaf selection should lead, if anywhere.
    fn content_link(&self, level: &LevelId, feature: &FeatureId) -> Option<String>;
}

/// Catalog for hierarchies without attached content.
#[derive(Debug, Copy, Clone, Default)]
pub struct NoContent;

impl ContentCatalog for NoContent {
    fn content_count(&self, _level: &LevelId, _feature: &FeatureId) -> u32 {
        0
    }

    fn content_link(&self, _level: &LevelId, _feature: &FeatureId) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    #[serde(default)]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug)]
pub enum ContentError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentError::Io(e) => write!(f, "content index I/O error: {e}"),
            ContentError::Parse(e) => write!(f, "content index parse error: {e}"),
        }
    }
}

impl std::error::Error for ContentError {}

/// Content index loaded from JSON:
/// `{ "levels": { "<level>": { "<feature>": { "count": 3, "slug": "..." } } } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticContentCatalog {
    #[serde(default)]
    levels: BTreeMap<LevelId, BTreeMap<FeatureId, ContentEntry>>,
}

impl StaticContentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(payload: &str) -> Result<Self, ContentError> {
        serde_json::from_str(payload).map_err(ContentError::Parse)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let payload = std::fs::read_to_string(path).map_err(ContentError::Io)?;
        Self::from_json_str(&payload)
    }

    pub fn with_entry(mut self, level: &str, feature: &str, entry: ContentEntry) -> Self {
        self.levels
            .entry(LevelId::new(level))
            .or_default()
            .insert(FeatureId::new(feature), entry);
        self
    }

    pub fn entry(&self, level: &LevelId, feature: &FeatureId) -> Option<&ContentEntry> {
        self.levels.get(level)?.get(feature)
    }
}

impl ContentCatalog for StaticContentCatalog {
    fn content_count(&self, level: &LevelId, feature: &FeatureId) -> u32 {
        self.entry(level, feature).map(|e| e.count).unwrap_or(0)
    }

    fn content_link(&self, level: &LevelId, feature: &FeatureId) -> Option<String> {
        self.entry(level, feature)?.slug.clone()
    }
}
