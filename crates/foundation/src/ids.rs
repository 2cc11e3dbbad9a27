use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one rung of the geographic hierarchy (e.g. `"region"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(String);

/// Identifies a feature within its level.
///
/// Ids coming from numeric GeoJSON properties are stored in their decimal
/// string form, so `17` and `"17"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl LevelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LevelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureId, LevelId};

    #[test]
    fn ids_serialize_as_plain_strings() {
        let level = LevelId::new("region");
        let json = serde_json::to_string(&level).unwrap();
        assert_eq!(json, "\"region\"");

        let feature: FeatureId = serde_json::from_str("\"HR-01\"").unwrap();
        assert_eq!(feature.as_str(), "HR-01");
        assert_eq!(feature.to_string(), "HR-01");
    }
}
