use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use foundation::math::StableF64;
use foundation::{FeatureId, GeoBounds, GeoPoint};
use hierarchy::Feature;

/// Finest resolution any strategy is asked to build.
pub const MAX_RESOLUTION: u8 = 24;

/// A point-level feature reduced to what clustering needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPoint {
    pub feature: FeatureId,
    pub position: GeoPoint,
}

impl ClusterPoint {
    pub fn new(feature: impl Into<FeatureId>, position: GeoPoint) -> Self {
        Self {
            feature: feature.into(),
            position,
        }
    }

    /// `None` for features without a finite anchor.
    pub fn from_feature(feature: &Feature) -> Option<Self> {
        let position = feature.geometry.anchor().filter(GeoPoint::is_finite)?;
        Some(Self::new(feature.id.clone(), position))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterNode {
    Leaf(ClusterPoint),
    Cluster {
        centroid: GeoPoint,
        count: usize,
        bounds: GeoBounds,
        /// Canonically ordered.
        members: Vec<ClusterPoint>,
    },
}

impl ClusterNode {
    pub fn centroid(&self) -> GeoPoint {
        match self {
            ClusterNode::Leaf(p) => p.position,
            ClusterNode::Cluster { centroid, .. } => *centroid,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            ClusterNode::Leaf(_) => 1,
            ClusterNode::Cluster { count, .. } => *count,
        }
    }

    pub fn bounds(&self) -> GeoBounds {
        match self {
            ClusterNode::Leaf(p) => GeoBounds::from_point(p.position),
            ClusterNode::Cluster { bounds, .. } => *bounds,
        }
    }

    pub fn members(&self) -> &[ClusterPoint] {
        match self {
            ClusterNode::Leaf(p) => std::slice::from_ref(p),
            ClusterNode::Cluster { members, .. } => members,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ClusterNode::Leaf(_))
    }
}

/// Groups points for one resolution (higher is finer).
///
/// Implementations must not depend on input order: the same set of points
/// yields the same nodes in the same order.
pub trait ClusterStrategy: Send + Sync + fmt::Debug {
    fn build(&self, points: &[ClusterPoint], resolution: u8) -> Vec<ClusterNode>;
}

/// Nested grid anchored at (-180, -90); cell edge is `base_cell_deg / 2^r`.
///
/// Every cell at `r + 1` lies inside exactly one cell at `r`, so raising the
/// resolution can only split clusters, never merge them.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GridClusterer {
    pub base_cell_deg: f64,
}

impl GridClusterer {
    pub fn new(base_cell_deg: f64) -> Self {
        Self { base_cell_deg }
    }

    pub fn cell_size(&self, resolution: u8) -> f64 {
        self.base_cell_deg / 2f64.powi(i32::from(resolution.min(MAX_RESOLUTION)))
    }

    fn cell_of(&self, p: GeoPoint, cell: f64) -> (i64, i64) {
        (
            ((p.lon_deg + 180.0) / cell).floor() as i64,
            ((p.lat_deg + 90.0) / cell).floor() as i64,
        )
    }
}

impl Default for GridClusterer {
    fn default() -> Self {
        Self::new(45.0)
    }
}

impl ClusterStrategy for GridClusterer {
    fn build(&self, points: &[ClusterPoint], resolution: u8) -> Vec<ClusterNode> {
        let cell = self.cell_size(resolution);
        if !(cell.is_finite() && cell > 0.0) {
            return finish(canonical(points).into_iter().map(Aggregate::single).collect());
        }

        let mut cells: BTreeMap<(i64, i64), Aggregate> = BTreeMap::new();
        for p in canonical(points) {
            let key = self.cell_of(p.position, cell);
            match cells.get_mut(&key) {
                Some(agg) => agg.push(p),
                None => {
                    cells.insert(key, Aggregate::single(p));
                }
            }
        }
        finish(cells.into_values().collect())
    }
}

/// Greedy clustering: a point joins the first cluster whose running centroid
/// lies within `base_radius_deg / 2^r`.
///
/// Deterministic, but unlike [`GridClusterer`] the cluster count is not
/// guaranteed to be monotonic in the resolution.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RadiusClusterer {
    pub base_radius_deg: f64,
}

impl RadiusClusterer {
    pub fn new(base_radius_deg: f64) -> Self {
        Self { base_radius_deg }
    }

    pub fn radius(&self, resolution: u8) -> f64 {
        self.base_radius_deg / 2f64.powi(i32::from(resolution.min(MAX_RESOLUTION)))
    }
}

impl Default for RadiusClusterer {
    fn default() -> Self {
        Self::new(20.0)
    }
}

impl ClusterStrategy for RadiusClusterer {
    fn build(&self, points: &[ClusterPoint], resolution: u8) -> Vec<ClusterNode> {
        let radius = self.radius(resolution);
        let mut groups: Vec<Aggregate> = Vec::new();
        for p in canonical(points) {
            let near = groups
                .iter_mut()
                .find(|g| g.centroid.planar_distance(&p.position) <= radius);
            match near {
                Some(g) => g.push(p),
                None => groups.push(Aggregate::single(p)),
            }
        }
        finish(groups)
    }
}

struct Aggregate {
    centroid: GeoPoint,
    bounds: GeoBounds,
    members: Vec<ClusterPoint>,
}

impl Aggregate {
    fn single(p: ClusterPoint) -> Self {
        Self {
            centroid: p.position,
            bounds: GeoBounds::from_point(p.position),
            members: vec![p],
        }
    }

    fn push(&mut self, p: ClusterPoint) {
        let n = (self.members.len() + 1) as f64;
        self.centroid.lon_deg += (p.position.lon_deg - self.centroid.lon_deg) / n;
        self.centroid.lat_deg += (p.position.lat_deg - self.centroid.lat_deg) / n;
        self.bounds.expand_to(p.position);
        self.members.push(p);
    }

    fn into_node(mut self) -> ClusterNode {
        if self.members.len() == 1 {
            if let Some(p) = self.members.pop() {
                return ClusterNode::Leaf(p);
            }
        }
        ClusterNode::Cluster {
            centroid: self.centroid,
            count: self.members.len(),
            bounds: self.bounds,
            members: self.members,
        }
    }
}

fn point_order(a: &ClusterPoint, b: &ClusterPoint) -> Ordering {
    StableF64(a.position.lon_deg)
        .cmp(&StableF64(b.position.lon_deg))
        .then_with(|| StableF64(a.position.lat_deg).cmp(&StableF64(b.position.lat_deg)))
        .then_with(|| a.feature.cmp(&b.feature))
}

/// Finite points in canonical order.
fn canonical(points: &[ClusterPoint]) -> Vec<ClusterPoint> {
    let mut out: Vec<ClusterPoint> = points
        .iter()
        .filter(|p| p.position.is_finite())
        .cloned()
        .collect();
    out.sort_by(point_order);
    out
}

fn finish(groups: Vec<Aggregate>) -> Vec<ClusterNode> {
    let mut nodes: Vec<ClusterNode> = groups.into_iter().map(Aggregate::into_node).collect();
    nodes.sort_by(|a, b| {
        let (ca, cb) = (a.centroid(), b.centroid());
        StableF64(ca.lon_deg)
            .cmp(&StableF64(cb.lon_deg))
            .then_with(|| StableF64(ca.lat_deg).cmp(&StableF64(cb.lat_deg)))
            .then_with(|| a.members()[0].feature.cmp(&b.members()[0].feature))
    });
    nodes
}

/// Active point set plus its clustering at the current resolution.
#[derive(Debug)]
pub struct ClusterIndex {
    strategy: Box<dyn ClusterStrategy>,
    points: Vec<ClusterPoint>,
    resolution: u8,
    nodes: Vec<ClusterNode>,
}

impl Default for ClusterIndex {
    fn default() -> Self {
        Self::new(Box::new(GridClusterer::default()))
    }
}

impl ClusterIndex {
    pub fn new(strategy: Box<dyn ClusterStrategy>) -> Self {
        Self {
            strategy,
            points: Vec::new(),
            resolution: 0,
            nodes: Vec::new(),
        }
    }

    pub fn strategy(&self) -> &dyn ClusterStrategy {
        self.strategy.as_ref()
    }

    pub fn resolution(&self) -> u8 {
        self.resolution
    }

    pub fn points(&self) -> &[ClusterPoint] {
        &self.points
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Replaces the active points and re-clusters at the current resolution.
    pub fn rebuild(&mut self, points: Vec<ClusterPoint>) -> &[ClusterNode] {
        self.points = points;
        self.nodes = self.strategy.build(&self.points, self.resolution);
        &self.nodes
    }

    /// Re-clusters only when the resolution actually changes. Returns whether
    /// it did.
    pub fn set_resolution(&mut self, resolution: u8) -> bool {
        let resolution = resolution.min(MAX_RESOLUTION);
        if resolution == self.resolution {
            return false;
        }
        self.resolution = resolution;
        self.nodes = self.strategy.build(&self.points, resolution);
        true
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.nodes.clear();
    }

    /// The members of `node` clustered one resolution finer.
    pub fn expand(&self, node: &ClusterNode) -> Vec<ClusterNode> {
        match node {
            ClusterNode::Leaf(_) => vec![node.clone()],
            ClusterNode::Cluster { members, .. } => {
                let finer = self.resolution.saturating_add(1).min(MAX_RESOLUTION);
                self.strategy.build(members, finer)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClusterIndex, ClusterNode, ClusterPoint, ClusterStrategy, GridClusterer, RadiusClusterer,
    };
    use foundation::GeoPoint;

    /// 40 points in 5 tight groups spread along the equator band.
    fn grouped_points() -> Vec<ClusterPoint> {
        let centers = [-160.0, -100.0, -40.0, 20.0, 80.0];
        let offsets = [
            (-0.5, -0.5),
            (0.5, -0.5),
            (-0.5, 0.5),
            (0.5, 0.5),
            (0.0, 0.0),
            (0.25, -0.25),
            (-0.25, 0.25),
            (0.1, 0.4),
        ];
        let mut out = Vec::new();
        for (g, lon) in centers.iter().enumerate() {
            for (i, (dx, dy)) in offsets.iter().enumerate() {
                out.push(ClusterPoint::new(
                    format!("p{g}-{i}").as_str(),
                    GeoPoint::new(lon + dx, 10.0 + dy),
                ));
            }
        }
        out
    }

    #[test]
    fn forty_points_make_five_clusters() {
        let points = grouped_points();
        assert_eq!(points.len(), 40);
        let nodes = GridClusterer::default().build(&points, 1);
        assert_eq!(nodes.len(), 5);
        assert!(nodes.iter().all(|n| n.count() == 8));
        assert_eq!(nodes.iter().map(ClusterNode::count).sum::<usize>(), 40);

        let finer = GridClusterer::default().build(&points, 3);
        assert!(finer.len() >= 5);
    }

    #[test]
    fn grid_count_is_monotonic_in_resolution() {
        let points = grouped_points();
        let grid = GridClusterer::default();
        let mut last = 0;
        for r in 0..=12 {
            let n = grid.build(&points, r).len();
            assert!(n >= last, "resolution {r}: {n} < {last}");
            last = n;
        }
        assert_eq!(last, 40);
    }

    #[test]
    fn clustering_ignores_input_order() {
        let points = grouped_points();
        let mut shuffled = points.clone();
        shuffled.reverse();
        shuffled.rotate_left(13);

        for r in [0, 1, 4] {
            assert_eq!(
                GridClusterer::default().build(&points, r),
                GridClusterer::default().build(&shuffled, r)
            );
            assert_eq!(
                RadiusClusterer::default().build(&points, r),
                RadiusClusterer::default().build(&shuffled, r)
            );
        }
    }

    #[test]
    fn cluster_geometry_covers_members() {
        let nodes = GridClusterer::default().build(&grouped_points(), 1);
        for node in &nodes {
            let bounds = node.bounds();
            assert!(bounds.contains(node.centroid()));
            for m in node.members() {
                assert!(bounds.contains(m.position));
            }
        }
        let first = &nodes[0];
        assert!((first.centroid().lon_deg - -159.985_f64).abs() < 0.1);
    }

    #[test]
    fn single_members_are_leaves_and_non_finite_points_are_dropped() {
        let points = vec![
            ClusterPoint::new("a", GeoPoint::new(10.0, 10.0)),
            ClusterPoint::new("b", GeoPoint::new(f64::NAN, 10.0)),
        ];
        let nodes = GridClusterer::default().build(&points, 0);
        assert_eq!(nodes, vec![ClusterNode::Leaf(points[0].clone())]);
    }

    #[test]
    fn radius_clusterer_groups_nearby_points() {
        let nodes = RadiusClusterer::default().build(&grouped_points(), 2);
        assert_eq!(nodes.len(), 5);
        let nodes = RadiusClusterer::default().build(&grouped_points(), 12);
        assert!(nodes.len() > 5);
    }

    #[test]
    fn index_reclusters_only_on_change() {
        let mut index = ClusterIndex::default();
        index.rebuild(grouped_points());
        assert_eq!(index.resolution(), 0);
        let coarse = index.nodes().len();

        assert!(index.set_resolution(3));
        assert!(!index.set_resolution(3));
        assert!(index.nodes().len() >= coarse);
        assert_eq!(index.points().len(), 40);

        index.clear();
        assert!(index.is_empty());
        assert!(index.nodes().is_empty());
    }

    #[test]
    fn expand_splits_a_cluster_one_level_finer() {
        let mut index = ClusterIndex::default();
        index.rebuild(grouped_points());
        index.set_resolution(5);
        let node = index
            .nodes()
            .iter()
            .find(|n| !n.is_leaf())
            .cloned()
            .unwrap();

        let children = index.expand(&node);
        assert_eq!(children.iter().map(ClusterNode::count).sum::<usize>(), node.count());
        for child in &children {
            for m in child.members() {
                assert!(node.members().contains(m));
            }
        }

        let leaf = ClusterNode::Leaf(ClusterPoint::new("x", GeoPoint::new(0.0, 0.0)));
        assert_eq!(index.expand(&leaf), vec![leaf]);
    }
}
