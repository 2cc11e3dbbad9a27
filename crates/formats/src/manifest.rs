use serde::{Deserialize, Serialize};

use foundation::{GeoBounds, LevelId};

pub const MANIFEST_VERSION: &str = "1.0";

/// How features of a level are drawn: filled regions or (clustered) markers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Polygon,
    Point,
}

/// Declarative description of a drill-down hierarchy.
///
/// `levels` is ordered root first; position in the list defines the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HierarchyManifest {
    pub version: String,
    pub name: Option<String>,
    /// Fallback extent `[south, west, north, east]` used before the root level
    /// has been loaded or when it is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<[f64; 4]>,
    pub levels: Vec<LevelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelEntry {
    pub id: LevelId,
    pub label: String,
    pub kind: GeometryKind,
    /// Property holding a feature's own id. Falls back to the GeoJSON `id`.
    pub id_field: String,
    /// Property referencing the parent feature's id. Absent on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
    #[serde(default = "default_name_field")]
    pub name_field: String,
    /// Source location, relative to the package root or the source base URL.
    pub path: String,
    /// Hex BLAKE3 digest of the source bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

fn default_name_field() -> String {
    "name".to_string()
}

impl HierarchyManifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            name: None,
            extent: None,
            levels: Vec::new(),
        }
    }

    pub fn extent_bounds(&self) -> Option<GeoBounds> {
        self.extent
            .map(|[south, west, north, east]| GeoBounds::new(south, west, north, east))
    }
}

impl Default for HierarchyManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelEntry {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: GeometryKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: LevelId::new(id),
            label: label.into(),
            kind,
            id_field: "id".to_string(),
            parent_field: None,
            name_field: default_name_field(),
            path: path.into(),
            content_hash: None,
        }
    }

    pub fn with_parent_field(mut self, field: impl Into<String>) -> Self {
        self.parent_field = Some(field.into());
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{GeometryKind, HierarchyManifest};

    #[test]
    fn parses_minimal_manifest_with_defaults() {
        let payload = r#"{
            "version": "1.0",
            "name": "Demo",
            "extent": [42.0, 13.0, 46.6, 19.5],
            "levels": [
                { "id": "region", "label": "Region", "kind": "polygon",
                  "id_field": "code", "path": "regions.geojson" },
                { "id": "town", "label": "Town", "kind": "point",
                  "id_field": "code", "parent_field": "region", "path": "towns.geojson" }
            ]
        }"#;
        let m: HierarchyManifest = serde_json::from_str(payload).unwrap();
        assert_eq!(m.levels.len(), 2);
        assert_eq!(m.levels[0].kind, GeometryKind::Polygon);
        assert_eq!(m.levels[0].parent_field, None);
        assert_eq!(m.levels[1].name_field, "name");
        assert_eq!(m.levels[1].parent_field.as_deref(), Some("region"));
        let extent = m.extent_bounds().unwrap();
        assert_eq!(extent.south, 42.0);
        assert_eq!(extent.east, 19.5);
    }

    #[test]
    fn rejects_unknown_geometry_kind() {
        let payload = r#"{"version":"1.0","name":null,"levels":[
            {"id":"a","label":"A","kind":"line","id_field":"id","path":"a.json"}
        ]}"#;
        assert!(serde_json::from_str::<HierarchyManifest>(payload).is_err());
    }
}
