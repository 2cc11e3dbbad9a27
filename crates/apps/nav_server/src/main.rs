use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use formats::HierarchyPackage;
use foundation::FeatureId;
use hierarchy::LevelRegistry;
use layers::{GridClusterer, ViewportConfig};
use navigator::{
    ContentCatalog, ControllerConfig, DrillDownController, NavigationError, NoContent, Outcome,
    StaticContentCatalog,
};
use serde_json::json;
use streaming::{FileSource, GeometrySource, GeometryStore, HttpSource};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    nav: Arc<Mutex<DrillDownController>>,
    store: Arc<GeometryStore>,
    name: Option<String>,
}

#[derive(Debug, Clone)]
struct ServerConfig {
    package: PathBuf,
    addr: SocketAddr,
    source_url: Option<String>,
    content_index: Option<PathBuf>,
    viewport: ViewportConfig,
    cluster_cell_deg: f64,
}

impl ServerConfig {
    fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = ViewportConfig::default();
        let addr: SocketAddr = env::var("NAV_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:9200".to_string())
            .parse()
            .map_err(|e| format!("invalid NAV_ADDR: {e}"))?;
        Ok(Self {
            package: env::var("NAV_PACKAGE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/hierarchy")),
            addr,
            source_url: env::var("NAV_SOURCE_URL").ok(),
            content_index: env::var("NAV_CONTENT_INDEX").ok().map(PathBuf::from),
            viewport: defaults.with_size(
                env_var_u32("NAV_VIEWPORT_WIDTH", defaults.width_px),
                env_var_u32("NAV_VIEWPORT_HEIGHT", defaults.height_px),
            ),
            cluster_cell_deg: env_var_f64("NAV_CLUSTER_CELL_DEG", GridClusterer::default().base_cell_deg),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    let state = build_state(&config).await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    info!("navigator listening on http://{}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(config: &ServerConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    let package = HierarchyPackage::load(&config.package)?;
    let registry = Arc::new(LevelRegistry::from_manifest(package.manifest())?);

    let source: Arc<dyn GeometrySource> = match &config.source_url {
        Some(url) => Arc::new(HttpSource::new(url.clone())),
        None => Arc::new(FileSource::new(package.root())),
    };
    info!(source = %source.describe(), levels = registry.len(), "hierarchy loaded");

    let content: Arc<dyn ContentCatalog> = match &config.content_index {
        Some(path) => Arc::new(StaticContentCatalog::load(path)?),
        None => {
            let default_index = package.root().join("content.json");
            match StaticContentCatalog::load(&default_index) {
                Ok(catalog) => Arc::new(catalog),
                Err(_) => Arc::new(NoContent),
            }
        }
    };

    let store = Arc::new(GeometryStore::new(registry, source));
    let controller = DrillDownController::open_with_strategy(
        Arc::clone(&store),
        content,
        ControllerConfig {
            viewport: config.viewport,
            extent: package.manifest().extent_bounds(),
            ..ControllerConfig::default()
        },
        Box::new(GridClusterer::new(config.cluster_cell_deg)),
    )
    .await;
    if controller.is_unavailable() {
        warn!("root level unavailable at startup; POST /nav/home retries");
    }

    Ok(AppState {
        nav: Arc::new(Mutex::new(controller)),
        store,
        name: package.manifest().name.clone(),
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/levels", get(get_levels))
        .route("/nav/view", get(get_view))
        .route("/nav/select/:feature_id", post(select))
        .route("/nav/back", post(back))
        .route("/nav/home", post(home))
        .route("/nav/zoom/:resolution", post(zoom))
        .route("/nav/metrics", get(get_metrics))
        .with_state(state)
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

async fn get_levels(State(state): State<AppState>) -> Response {
    let levels: Vec<_> = state
        .store
        .registry()
        .iter()
        .map(|level| {
            json!({
                "id": level.id,
                "label": level.label,
                "kind": level.kind,
                "ordinal": level.ordinal,
                "state": state.store.state(&level.id).as_str(),
            })
        })
        .collect();
    Json(json!({ "name": state.name, "levels": levels })).into_response()
}

async fn get_view(State(state): State<AppState>) -> Response {
    let nav = state.nav.lock().await;
    Json(nav.snapshot()).into_response()
}

async fn select(State(state): State<AppState>, AxumPath(feature_id): AxumPath<String>) -> Response {
    let mut nav = state.nav.lock().await;
    let result = nav.select_feature(&FeatureId::new(feature_id)).await;
    transition_response(&nav, result)
}

async fn back(State(state): State<AppState>) -> Response {
    let mut nav = state.nav.lock().await;
    let result = nav.go_back().await;
    transition_response(&nav, result)
}

async fn home(State(state): State<AppState>) -> Response {
    let mut nav = state.nav.lock().await;
    let result = nav.go_home().await;
    transition_response(&nav, result)
}

async fn zoom(State(state): State<AppState>, AxumPath(resolution): AxumPath<u8>) -> Response {
    let mut nav = state.nav.lock().await;
    let changed = nav.set_resolution(resolution);
    Json(json!({ "changed": changed, "view": nav.snapshot() })).into_response()
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    let nav = state.nav.lock().await;
    Json(nav.metrics().snapshot()).into_response()
}

fn transition_response(
    nav: &DrillDownController,
    result: Result<Outcome, NavigationError>,
) -> Response {
    match result {
        Ok(outcome) => Json(json!({ "outcome": outcome, "view": nav.snapshot() })).into_response(),
        Err(err) => {
            let status = match &err {
                NavigationError::DataUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                NavigationError::UnknownFeature { .. } | NavigationError::UnknownLevel(_) => {
                    StatusCode::NOT_FOUND
                }
            };
            (
                status,
                Json(json!({ "error": err.to_string(), "view": nav.snapshot() })),
            )
                .into_response()
        }
    }
}

fn env_var_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_var_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::{AppState, ServerConfig, back, build_state, get_levels, get_view, home, select, zoom};
    use axum::extract::{Path as AxumPath, State};
    use axum::http::StatusCode;
    use axum::response::Response;
    use layers::ViewportConfig;
    use serde_json::Value;
    use std::path::PathBuf;

    async fn demo_state() -> AppState {
        let config = ServerConfig {
            package: PathBuf::from("assets"),
            addr: "127.0.0.1:0".parse().unwrap(),
            source_url: None,
            content_index: None,
            viewport: ViewportConfig::default(),
            cluster_cell_deg: 45.0,
        };
        build_state(&config).await.unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn demo_package_drills_down_and_back() {
        let state = demo_state().await;

        let view = body_json(get_view(State(state.clone())).await).await;
        assert_eq!(view["level"], "region");
        assert_eq!(view["items"]["items"].as_array().map(Vec::len), Some(3));

        let resp = select(State(state.clone()), AxumPath("HR-S".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["outcome"]["outcome"], "moved");
        assert_eq!(body["view"]["level"], "subdivision");
        assert_eq!(body["view"]["items"]["items"].as_array().map(Vec::len), Some(3));

        let resp = select(State(state.clone()), AxumPath("ST".to_string())).await;
        let body = body_json(resp).await;
        assert_eq!(body["view"]["kind"], "point");
        assert_eq!(body["view"]["history_depth"], 2);

        let resp = zoom(State(state.clone()), AxumPath(0)).await;
        let body = body_json(resp).await;
        assert_eq!(body["changed"], true);
        assert_eq!(body["view"]["items"]["items"].as_array().map(Vec::len), Some(1));

        let resp = select(State(state.clone()), AxumPath("ST-01".to_string())).await;
        let body = body_json(resp).await;
        assert_eq!(body["outcome"]["outcome"], "leaf");
        assert_eq!(body["outcome"]["content_link"], "recipes/split");

        let body = body_json(back(State(state.clone())).await).await;
        assert_eq!(body["view"]["level"], "subdivision");
        let body = body_json(home(State(state.clone())).await).await;
        assert_eq!(body["view"]["history_depth"], 0);
    }

    #[tokio::test]
    async fn unknown_feature_is_not_found() {
        let state = demo_state().await;
        let resp = select(State(state), AxumPath("nowhere".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn levels_report_load_state() {
        let state = demo_state().await;
        let body = body_json(get_levels(State(state)).await).await;
        assert_eq!(body["name"], "Regional recipes");
        assert_eq!(body["levels"][0]["state"], "ready");
        assert_eq!(body["levels"][2]["state"], "absent");
        assert_eq!(body["levels"][1]["label"], "County");
    }
}
