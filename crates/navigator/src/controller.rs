use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use foundation::{FeatureId, GeoBounds, LevelId};
use hierarchy::{
    BoundsCalculator, DEFAULT_MIN_PADDING_DEG, DEFAULT_POINT_PADDING, Feature, FeatureCollection,
    GeometryKind, Level, find_orphans, matching_indices,
};
use layers::{
    Breadcrumb, ClusterIndex, ClusterNode, ClusterPoint, ClusterStrategy, ClusterView,
    FeatureView, GridClusterer, SnapshotItems, ViewSnapshot, ViewportConfig,
};
use serde::Serialize;
use streaming::{GeometryStore, StoreError};
use tracing::{debug, info, warn};

use crate::content::ContentCatalog;
use crate::error::NavigationError;
use crate::event_bus::{EventBus, EventKind, NavigationEvent};
use crate::history::NavigationHistory;
use crate::metrics::{
    CLUSTERS_COUNT, DATA_ORPHANS, HISTORY_DEPTH, Metrics, STORE_FETCHES, TRANSITIONS_BACK,
    TRANSITIONS_FAILED, TRANSITIONS_HOME, TRANSITIONS_LEAF, TRANSITIONS_SELECT,
};
use crate::state::NavigationState;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub viewport: ViewportConfig,
    /// Shown while the root is unavailable and for empty filtered sets.
    /// `None` derives it from the full root set once that loads.
    pub extent: Option<GeoBounds>,
    pub point_padding: f64,
    pub min_padding_deg: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            viewport: ViewportConfig::default(),
            extent: None,
            point_padding: DEFAULT_POINT_PADDING,
            min_padding_deg: DEFAULT_MIN_PADDING_DEG,
        }
    }
}

/// Terminal selection at the leaf level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafSelection {
    pub level: LevelId,
    pub feature: FeatureId,
    pub name: String,
    pub content_count: u32,
    pub content_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Navigation state changed; fetch a new snapshot.
    Moved,
    Leaf(LeafSelection),
    Unchanged,
}

/// Features currently shown, as positions into their level's collection.
#[derive(Debug, Default)]
struct ActiveSet {
    collection: Option<Arc<FeatureCollection>>,
    indices: Vec<usize>,
}

impl ActiveSet {
    fn features(&self) -> impl Iterator<Item = &Feature> {
        let collection = self.collection.as_deref();
        self.indices
            .iter()
            .filter_map(move |&idx| collection.and_then(|c| c.features().get(idx)))
    }

    fn get(&self, id: &FeatureId) -> Option<&Feature> {
        let collection = self.collection.as_deref()?;
        let idx = collection.index_of(id)?;
        self.indices.binary_search(&idx).ok()?;
        collection.features().get(idx)
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// Drives select / back / home over the level hierarchy.
///
/// Every transition loads what it needs first and only then commits, so a
/// failed load leaves state and history exactly as they were. Transitions
/// take `&mut self` and run to completion; the store load is the only
/// suspension point.
pub struct DrillDownController {
    store: Arc<GeometryStore>,
    content: Arc<dyn ContentCatalog>,
    viewport_config: ViewportConfig,
    bounds: BoundsCalculator,
    extent_from_root: bool,
    state: NavigationState,
    history: NavigationHistory,
    active: ActiveSet,
    clusters: ClusterIndex,
    unavailable: bool,
    failed: BTreeSet<LevelId>,
    audited: BTreeSet<LevelId>,
    events: EventBus,
    metrics: Metrics,
}

impl fmt::Debug for DrillDownController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrillDownController")
            .field("state", &self.state)
            .field("history_depth", &self.history.len())
            .field("active", &self.active.len())
            .field("unavailable", &self.unavailable)
            .finish_non_exhaustive()
    }
}

impl DrillDownController {
    /// Starts a session at the root level with the default grid clustering.
    pub async fn open(
        store: Arc<GeometryStore>,
        content: Arc<dyn ContentCatalog>,
        config: ControllerConfig,
    ) -> Self {
        Self::open_with_strategy(store, content, config, Box::new(GridClusterer::default())).await
    }

    /// Like [`DrillDownController::open`]. A root that fails to load leaves
    /// the session at an unavailable root framed by the configured extent;
    /// [`DrillDownController::go_home`] retries.
    pub async fn open_with_strategy(
        store: Arc<GeometryStore>,
        content: Arc<dyn ContentCatalog>,
        config: ControllerConfig,
        strategy: Box<dyn ClusterStrategy>,
    ) -> Self {
        let root = store.registry().root().clone();
        let fallback = config
            .extent
            .filter(GeoBounds::is_valid)
            .unwrap_or(GeoBounds::WORLD);
        let bounds = BoundsCalculator::new(fallback)
            .with_point_padding(config.point_padding, config.min_padding_deg);

        let mut ctrl = Self {
            store,
            content,
            viewport_config: config.viewport,
            bounds,
            extent_from_root: config.extent.is_none(),
            state: NavigationState::at_root(root.id.clone(), config.viewport.fit(fallback)),
            history: NavigationHistory::new(),
            active: ActiveSet::default(),
            clusters: ClusterIndex::new(strategy),
            unavailable: true,
            failed: BTreeSet::new(),
            audited: BTreeSet::new(),
            events: EventBus::new(),
            metrics: Metrics::new(),
        };

        match ctrl.store.load(&root.id).await {
            Ok(collection) => {
                let indices = matching_indices(&collection, None);
                ctrl.adopt_root_extent(&collection, &indices);
                ctrl.state.viewport = ctrl.viewport_config.fit(ctrl.bounds_for(&collection, &indices));
                ctrl.install(&root, collection, indices);
                info!(level = %root.id, features = ctrl.active.len(), "navigation session opened");
                ctrl.events.emit(
                    EventKind::Opened,
                    &root.id,
                    None,
                    format!("{} features", ctrl.active.len()),
                );
            }
            Err(err) => {
                warn!(%err, "root level unavailable; showing the configured extent");
                ctrl.mark_failed(&err);
                ctrl.events.emit(EventKind::Failed, &root.id, None, err.to_string());
            }
        }
        ctrl
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    pub fn store(&self) -> &Arc<GeometryStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<NavigationEvent> {
        self.events.drain()
    }

    pub fn clusters(&self) -> &ClusterIndex {
        &self.clusters
    }

    /// Whether the current level's data is missing.
    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    /// The level currently shown.
    pub fn level(&self) -> &Level {
        let registry = self.store.registry();
        registry
            .level(&self.state.level)
            .unwrap_or_else(|| registry.root())
    }

    pub fn active_features(&self) -> Vec<&Feature> {
        self.active.features().collect()
    }

    /// Descends into `id`'s children, or reports a leaf selection.
    pub async fn select_feature(&mut self, id: &FeatureId) -> Result<Outcome, NavigationError> {
        let level = self.level().clone();
        let name = match self.active.get(id) {
            Some(feature) => feature.name.clone(),
            None => {
                return Err(NavigationError::UnknownFeature {
                    level: level.id,
                    feature: id.clone(),
                });
            }
        };

        let Some(child) = self.store.registry().level_after(&level.id).cloned() else {
            return Ok(self.select_leaf(&level, id, name));
        };
        let Some(parents) = self.active.collection.clone() else {
            return Err(NavigationError::UnknownFeature {
                level: level.id,
                feature: id.clone(),
            });
        };

        debug!(level = %level.id, feature = %id, child = %child.id, "descending");
        let loaded = match self.store.load(&child.id).await {
            Ok(collection) => collection,
            Err(err) => return Err(self.abort(err)),
        };
        self.audit_orphans(&child, &loaded, &parents);

        let indices = matching_indices(&loaded, Some(id));
        let viewport = self.viewport_config.fit(self.bounds_for(&loaded, &indices));
        let previous = std::mem::replace(
            &mut self.state,
            NavigationState {
                level: child.id.clone(),
                parent: Some(id.clone()),
                viewport,
            },
        );
        self.history.push(previous);
        self.install(&child, loaded, indices);

        self.metrics.inc_counter(TRANSITIONS_SELECT, 1);
        self.events.emit(
            EventKind::Selected,
            &child.id,
            Some(id),
            format!("{} features under {name}", self.active.len()),
        );
        Ok(Outcome::Moved)
    }

    /// Returns to the state before the last descent.
    pub async fn go_back(&mut self) -> Result<Outcome, NavigationError> {
        let Some(previous) = self.history.peek().cloned() else {
            return Ok(Outcome::Unchanged);
        };
        let level = self
            .store
            .registry()
            .level(&previous.level)
            .cloned()
            .ok_or_else(|| NavigationError::UnknownLevel(previous.level.clone()))?;

        let collection = match self.store.load(&level.id).await {
            Ok(collection) => collection,
            Err(err) => return Err(self.abort(err)),
        };

        self.history.pop();
        let indices = matching_indices(&collection, previous.parent.as_ref());
        debug!(level = %level.id, parent = ?previous.parent, "going back");
        self.state = previous;
        self.install(&level, collection, indices);

        self.metrics.inc_counter(TRANSITIONS_BACK, 1);
        self.events.emit(
            EventKind::Back,
            &level.id,
            self.state.parent.as_ref(),
            format!("history depth {}", self.history.len()),
        );
        Ok(Outcome::Moved)
    }

    /// Resets to the full root set with an empty history.
    pub async fn go_home(&mut self) -> Result<Outcome, NavigationError> {
        let root = self.store.registry().root().clone();
        let collection = match self.store.load(&root.id).await {
            Ok(collection) => collection,
            Err(err) => return Err(self.abort(err)),
        };

        let indices = matching_indices(&collection, None);
        self.adopt_root_extent(&collection, &indices);
        let viewport = self.viewport_config.fit(self.bounds_for(&collection, &indices));
        self.history.clear();
        self.state = NavigationState::at_root(root.id.clone(), viewport);
        self.install(&root, collection, indices);

        debug!(level = %root.id, "home");
        self.metrics.inc_counter(TRANSITIONS_HOME, 1);
        self.events
            .emit(EventKind::Home, &root.id, None, format!("{} features", self.active.len()));
        Ok(Outcome::Moved)
    }

    /// Zoom change from the render layer. Re-clusters the active points and
    /// leaves navigation state alone. Returns whether anything changed.
    pub fn set_resolution(&mut self, resolution: u8) -> bool {
        if !self.clusters.set_resolution(resolution) {
            return false;
        }
        let level = self.state.level.clone();
        if !self.clusters.is_empty() {
            self.metrics
                .record_histogram(CLUSTERS_COUNT, self.clusters.nodes().len() as i64);
        }
        self.events.emit(
            EventKind::Resolution,
            &level,
            None,
            format!(
                "resolution {} -> {} clusters",
                self.clusters.resolution(),
                self.clusters.nodes().len()
            ),
        );
        true
    }

    /// Render-interface view of the current state.
    pub fn snapshot(&self) -> ViewSnapshot {
        let level = self.level();
        let items = match level.kind {
            GeometryKind::Polygon => SnapshotItems::Features(
                self.active
                    .features()
                    .map(|f| FeatureView::from_feature(f, self.content.content_count(&level.id, &f.id)))
                    .collect(),
            ),
            GeometryKind::Point => SnapshotItems::Clusters(
                self.clusters
                    .nodes()
                    .iter()
                    .map(|node| {
                        let mut view = ClusterView::from(node);
                        if let ClusterNode::Leaf(point) = node {
                            view.feature = self.active.get(&point.feature).map(|f| {
                                FeatureView::from_feature(
                                    f,
                                    self.content.content_count(&level.id, &f.id),
                                )
                            });
                        }
                        view
                    })
                    .collect(),
            ),
        };

        ViewSnapshot {
            level: level.id.clone(),
            level_label: level.label.clone(),
            kind: level.kind,
            parent: self.state.parent.clone(),
            breadcrumbs: self.breadcrumbs(),
            viewport: self.state.viewport,
            items,
            unavailable: self.unavailable,
            failed_levels: self.failed.iter().cloned().collect(),
            history_depth: self.history.len(),
        }
    }

    /// Path from the root to the current level, with the feature chosen at
    /// each step.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let registry = self.store.registry();
        let states: Vec<&NavigationState> = self
            .history
            .iter()
            .chain(std::iter::once(&self.state))
            .collect();

        states
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let label = registry
                    .level(&s.level)
                    .map(|l| l.label.clone())
                    .unwrap_or_else(|| s.level.to_string());
                let feature = states.get(i + 1).and_then(|next| next.parent.clone());
                let name = feature.as_ref().and_then(|id| {
                    let collection = self.store.cached(&s.level)?;
                    collection.get(id).map(|f| f.name.clone())
                });
                Breadcrumb {
                    level: s.level.clone(),
                    label,
                    feature,
                    name,
                }
            })
            .collect()
    }

    fn select_leaf(&mut self, level: &Level, id: &FeatureId, name: String) -> Outcome {
        let selection = LeafSelection {
            level: level.id.clone(),
            feature: id.clone(),
            name,
            content_count: self.content.content_count(&level.id, id),
            content_link: self.content.content_link(&level.id, id),
        };
        debug!(level = %level.id, feature = %id, link = ?selection.content_link, "leaf selected");
        self.metrics.inc_counter(TRANSITIONS_LEAF, 1);
        self.events.emit(
            EventKind::Leaf,
            &level.id,
            Some(id),
            format!("{} content items", selection.content_count),
        );
        Outcome::Leaf(selection)
    }

    fn bounds_for(&self, collection: &FeatureCollection, indices: &[usize]) -> GeoBounds {
        self.bounds
            .bounds_of(indices.iter().filter_map(|&idx| collection.features().get(idx)))
    }

    fn adopt_root_extent(&mut self, collection: &FeatureCollection, indices: &[usize]) {
        if self.extent_from_root && !indices.is_empty() {
            let extent = self.bounds_for(collection, indices);
            self.bounds.set_fallback(extent);
        }
    }

    /// Commits the derived part of a transition: active set and clusters at
    /// the zoom of the already-updated state.
    fn install(&mut self, level: &Level, collection: Arc<FeatureCollection>, indices: Vec<usize>) {
        let points: Vec<ClusterPoint> = match level.kind {
            GeometryKind::Point => indices
                .iter()
                .filter_map(|&idx| collection.features().get(idx))
                .filter_map(ClusterPoint::from_feature)
                .collect(),
            GeometryKind::Polygon => Vec::new(),
        };

        self.clusters.clear();
        self.clusters.set_resolution(self.state.viewport.zoom);
        self.clusters.rebuild(points);
        if matches!(level.kind, GeometryKind::Point) {
            self.metrics
                .record_histogram(CLUSTERS_COUNT, self.clusters.nodes().len() as i64);
        }

        self.active = ActiveSet {
            collection: Some(collection),
            indices,
        };
        self.unavailable = false;
        self.failed.remove(&level.id);
        self.metrics
            .set_gauge(HISTORY_DEPTH, self.history.len() as i64);
        self.metrics
            .set_gauge(STORE_FETCHES, self.store.fetch_count() as i64);
    }

    fn mark_failed(&mut self, err: &StoreError) {
        if let StoreError::DataUnavailable { level, .. } = err {
            self.failed.insert(level.clone());
        }
    }

    fn abort(&mut self, err: StoreError) -> NavigationError {
        warn!(%err, level = %self.state.level, "transition aborted; navigation state unchanged");
        self.mark_failed(&err);
        self.metrics.inc_counter(TRANSITIONS_FAILED, 1);
        self.events
            .emit(EventKind::Failed, err.level(), None, err.to_string());
        err.into()
    }

    /// Logs children whose parent does not resolve, once per level.
    fn audit_orphans(&mut self, level: &Level, children: &FeatureCollection, parents: &FeatureCollection) {
        if !self.audited.insert(level.id.clone()) {
            return;
        }
        let orphans = find_orphans(children, parents);
        if orphans.is_empty() {
            return;
        }
        for orphan in &orphans {
            warn!(
                level = %level.id,
                feature = %orphan.id,
                parent = ?orphan.parent,
                "orphan feature: parent does not resolve"
            );
        }
        self.metrics.inc_counter(DATA_ORPHANS, orphans.len() as u64);
        self.events.emit(
            EventKind::Orphans,
            &level.id,
            None,
            format!("{} orphan features", orphans.len()),
        );
    }
}
