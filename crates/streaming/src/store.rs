use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use formats::{GeoJsonCollection, content_hash_hex};
use foundation::LevelId;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use hierarchy::{DecodeReport, FeatureCollection, Level, LevelRegistry};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::residency::LoadState;
use crate::source::GeometrySource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The id is not part of the registry; a caller bug, not a data problem.
    UnknownLevel(LevelId),
    /// The level's source could not be fetched or decoded. Retried lazily.
    DataUnavailable { level: LevelId, reason: String },
}

impl StoreError {
    fn unavailable(level: &LevelId, reason: impl Into<String>) -> Self {
        StoreError::DataUnavailable {
            level: level.clone(),
            reason: reason.into(),
        }
    }

    pub fn level(&self) -> &LevelId {
        match self {
            StoreError::UnknownLevel(level) => level,
            StoreError::DataUnavailable { level, .. } => level,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnknownLevel(level) => write!(f, "unknown level: {level}"),
            StoreError::DataUnavailable { level, reason } => {
                write!(f, "data unavailable for level {level}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

type LoadResult = Result<Arc<FeatureCollection>, StoreError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

enum Slot {
    /// `generation` tells a finished load whether its slot was replaced.
    Loading { generation: u64, load: SharedLoad },
    Ready(Arc<FeatureCollection>),
}

/// Lazily loads and caches one immutable feature collection per level.
///
/// Concurrent requests for a level that is still loading join the in-flight
/// fetch instead of issuing a second one. A failed load leaves the level
/// absent so the next request retries. The slot lock is only held for
/// bookkeeping, never across an await.
pub struct GeometryStore {
    registry: Arc<LevelRegistry>,
    source: Arc<dyn GeometrySource>,
    slots: Mutex<BTreeMap<LevelId, Slot>>,
    next_generation: AtomicU64,
    fetches: AtomicU64,
}

impl fmt::Debug for GeometryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryStore")
            .field("source", &self.source.describe())
            .field("levels", &self.registry.len())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

impl GeometryStore {
    pub fn new(registry: Arc<LevelRegistry>, source: Arc<dyn GeometrySource>) -> Self {
        Self {
            registry,
            source,
            slots: Mutex::new(BTreeMap::new()),
            next_generation: AtomicU64::new(1),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<LevelRegistry> {
        &self.registry
    }

    /// Number of fetches issued against the source so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn state(&self, level: &LevelId) -> LoadState {
        match self.slots.lock().get(level) {
            None => LoadState::Absent,
            Some(Slot::Loading { .. }) => LoadState::Loading,
            Some(Slot::Ready(_)) => LoadState::Ready,
        }
    }

    /// Non-blocking peek at a loaded collection.
    pub fn cached(&self, level: &LevelId) -> Option<Arc<FeatureCollection>> {
        match self.slots.lock().get(level) {
            Some(Slot::Ready(c)) => Some(Arc::clone(c)),
            _ => None,
        }
    }

    /// Returns the level's collection, fetching it on first use.
    pub async fn load(&self, level: &LevelId) -> Result<Arc<FeatureCollection>, StoreError> {
        let (generation, load) = {
            let mut slots = self.slots.lock();
            match slots.get(level) {
                Some(Slot::Ready(c)) => return Ok(Arc::clone(c)),
                Some(Slot::Loading { generation, load }) => {
                    debug!(%level, "joining in-flight load");
                    (*generation, load.clone())
                }
                None => {
                    let config = self
                        .registry
                        .level(level)
                        .ok_or_else(|| StoreError::UnknownLevel(level.clone()))?
                        .clone();
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let load = self.start_fetch(config);
                    slots.insert(
                        level.clone(),
                        Slot::Loading {
                            generation,
                            load: load.clone(),
                        },
                    );
                    (generation, load)
                }
            }
        };

        let result = load.await;

        let mut slots = self.slots.lock();
        let current = matches!(
            slots.get(level),
            Some(Slot::Loading { generation: g, .. }) if *g == generation
        );
        if current {
            match &result {
                Ok(collection) => {
                    slots.insert(level.clone(), Slot::Ready(Arc::clone(collection)));
                }
                Err(err) => {
                    slots.remove(level);
                    warn!(%level, %err, "level load failed; will retry on next visit");
                }
            }
        }
        result
    }

    /// Starts loading `level` in the background.
    pub fn prefetch(self: &Arc<Self>, level: LevelId) -> tokio::task::JoinHandle<Result<(), StoreError>> {
        let store = Arc::clone(self);
        tokio::spawn(async move { store.load(&level).await.map(|_| ()) })
    }

    fn start_fetch(&self, level: Level) -> SharedLoad {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(level = %level.id, source = %self.source.describe(), location = %level.source, "fetching level");
        let fetch = self.source.fetch(&level.source);
        async move {
            let bytes = fetch
                .await
                .map_err(|e| StoreError::unavailable(&level.id, e.to_string()))?;
            let (collection, report) = decode_level(&level, &bytes)?;
            info!(
                level = %level.id,
                features = report.accepted,
                skipped = report.skipped.len(),
                "level loaded"
            );
            Ok(Arc::new(collection))
        }
        .boxed()
        .shared()
    }
}

/// Verifies and decodes one level payload.
pub fn decode_level(
    level: &Level,
    bytes: &[u8],
) -> Result<(FeatureCollection, DecodeReport), StoreError> {
    if let Some(expected) = &level.content_hash {
        let actual = content_hash_hex(bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(StoreError::unavailable(
                &level.id,
                format!("content hash mismatch: expected {expected}, got {actual}"),
            ));
        }
    }
    let geojson = GeoJsonCollection::from_slice(bytes)
        .map_err(|e| StoreError::unavailable(&level.id, e.to_string()))?;
    Ok(FeatureCollection::from_geojson(level, &geojson))
}

#[cfg(test)]
mod tests {
    use super::{GeometryStore, StoreError, decode_level};
    use crate::residency::LoadState;
    use crate::source::{GeometrySource, SourceError, StaticSource};
    use bytes::Bytes;
    use formats::{GeometryKind, LevelEntry, content_hash_hex};
    use foundation::LevelId;
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use hierarchy::LevelRegistry;
    use std::sync::Arc;
    use tokio::sync::Notify;

    const REGIONS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"id":"A"},
         "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
        {"type":"Feature","properties":{"id":"B"},
         "geometry":{"type":"Polygon","coordinates":[[[2,2],[3,2],[3,3],[2,2]]]}}
    ]}"#;

    fn registry(hash: Option<String>) -> Arc<LevelRegistry> {
        let mut root = LevelEntry::new("region", "Region", GeometryKind::Polygon, "regions.json");
        root.content_hash = hash;
        Arc::new(
            LevelRegistry::from_entries(&[
                root,
                LevelEntry::new("town", "Town", GeometryKind::Point, "towns.json")
                    .with_parent_field("region"),
            ])
            .unwrap(),
        )
    }

    fn region() -> LevelId {
        LevelId::new("region")
    }

    /// Holds every fetch until the gate is opened.
    struct GatedSource {
        inner: StaticSource,
        gate: Arc<Notify>,
    }

    impl GeometrySource for GatedSource {
        fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, SourceError>> {
            let gate = Arc::clone(&self.gate);
            let inner = self.inner.fetch(location);
            async move {
                gate.notified().await;
                inner.await
            }
            .boxed()
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    #[tokio::test]
    async fn second_load_hits_the_cache() {
        let source = StaticSource::new().with_entry("regions.json", REGIONS);
        let store = GeometryStore::new(registry(None), Arc::new(source));

        let first = store.load(&region()).await.unwrap();
        let second = store.load(&region()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(store.state(&region()), LoadState::Ready);
        assert!(store.cached(&region()).is_some());
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_fetch() {
        let gate = Arc::new(Notify::new());
        let source = GatedSource {
            inner: StaticSource::new().with_entry("regions.json", REGIONS),
            gate: Arc::clone(&gate),
        };
        let store = GeometryStore::new(registry(None), Arc::new(source));

        let level = region();
        let (a, b, ()) = tokio::join!(store.load(&level), store.load(&level), async {
            tokio::task::yield_now().await;
            assert_eq!(store.state(&level), LoadState::Loading);
            gate.notify_one();
        });

        let a = a.unwrap();
        let b = b.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_next_visit() {
        let source = StaticSource::new();
        let store = GeometryStore::new(registry(None), Arc::new(source.clone()));

        let err = store.load(&region()).await.unwrap_err();
        assert!(matches!(err, StoreError::DataUnavailable { .. }));
        assert_eq!(err.level(), &region());
        assert_eq!(store.state(&region()), LoadState::Absent);

        source.insert("regions.json", REGIONS);
        let loaded = store.load(&region()).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn malformed_payload_is_data_unavailable() {
        let source = StaticSource::new().with_entry("regions.json", "{\"type\":\"Feature\"}");
        let store = GeometryStore::new(registry(None), Arc::new(source));
        let err = store.load(&region()).await.unwrap_err();
        assert!(matches!(err, StoreError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn one_bad_feature_does_not_fail_the_level() {
        let payload = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"id":"A"},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type":"Feature","properties":{"id":"B"},
             "geometry":{"type":"GeometryCollection","geometries":[]}}
        ]}"#;
        let source = StaticSource::new().with_entry("regions.json", payload);
        let store = GeometryStore::new(registry(None), Arc::new(source));

        let loaded = store.load(&region()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains(&foundation::FeatureId::new("A")));
        assert_eq!(store.state(&region()), LoadState::Ready);
    }

    #[tokio::test]
    async fn unknown_level_is_rejected_without_fetching() {
        let store = GeometryStore::new(registry(None), Arc::new(StaticSource::new()));
        let err = store.load(&LevelId::new("planet")).await.unwrap_err();
        assert_eq!(err, StoreError::UnknownLevel(LevelId::new("planet")));
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn prefetch_populates_the_cache() {
        let source = StaticSource::new().with_entry("regions.json", REGIONS);
        let store = Arc::new(GeometryStore::new(registry(None), Arc::new(source)));
        store.prefetch(region()).await.unwrap().unwrap();
        assert_eq!(store.state(&region()), LoadState::Ready);
    }

    #[test]
    fn content_hash_is_verified() {
        let good = registry(Some(content_hash_hex(REGIONS.as_bytes())));
        let (c, _) = decode_level(good.root(), REGIONS.as_bytes()).unwrap();
        assert_eq!(c.len(), 2);

        let bad = registry(Some("00".repeat(32)));
        let err = decode_level(bad.root(), REGIONS.as_bytes()).unwrap_err();
        match err {
            StoreError::DataUnavailable { reason, .. } => assert!(reason.contains("hash")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
