use formats::{GeometryKind, geometry_to_value};
use foundation::{FeatureId, GeoBounds, GeoPoint, LevelId};
use hierarchy::Feature;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster::ClusterNode;
use crate::viewport::Viewport;

/// One step of the path from the root to the current view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub level: LevelId,
    pub label: String,
    /// The feature selected at this level to get further down; `None` for the
    /// level currently shown.
    pub feature: Option<FeatureId>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureView {
    pub id: FeatureId,
    pub name: String,
    pub content_count: u32,
    pub anchor: Option<GeoPoint>,
    /// GeoJSON geometry object.
    pub geometry: Value,
}

impl FeatureView {
    pub fn from_feature(feature: &Feature, content_count: u32) -> Self {
        Self {
            id: feature.id.clone(),
            name: feature.name.clone(),
            content_count,
            anchor: feature.geometry.anchor(),
            geometry: geometry_to_value(&feature.geometry.to_geojson()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterView {
    pub centroid: GeoPoint,
    pub count: usize,
    pub bounds: GeoBounds,
    pub features: Vec<FeatureId>,
    /// Filled in for single-member nodes so they can be drawn as the feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureView>,
}

impl From<&ClusterNode> for ClusterView {
    fn from(node: &ClusterNode) -> Self {
        Self {
            centroid: node.centroid(),
            count: node.count(),
            bounds: node.bounds(),
            features: node.members().iter().map(|m| m.feature.clone()).collect(),
            feature: None,
        }
    }
}

/// What the map draws: plain features for area levels, clusters for point levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "items", rename_all = "snake_case")]
pub enum SnapshotItems {
    Features(Vec<FeatureView>),
    Clusters(Vec<ClusterView>),
}

impl SnapshotItems {
    pub fn len(&self) -> usize {
        match self {
            SnapshotItems::Features(v) => v.len(),
            SnapshotItems::Clusters(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the render layer needs after a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSnapshot {
    pub level: LevelId,
    pub level_label: String,
    pub kind: GeometryKind,
    pub parent: Option<FeatureId>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub viewport: Viewport,
    pub items: SnapshotItems,
    /// The level's data could not be loaded; `items` is empty.
    pub unavailable: bool,
    /// Levels whose last load failed. They are retried on the next visit.
    pub failed_levels: Vec<LevelId>,
    pub history_depth: usize,
}

impl ViewSnapshot {
    pub fn feature_ids(&self) -> Vec<&FeatureId> {
        match &self.items {
            SnapshotItems::Features(v) => v.iter().map(|f| &f.id).collect(),
            SnapshotItems::Clusters(v) => v.iter().flat_map(|c| c.features.iter()).collect(),
        }
    }
}
