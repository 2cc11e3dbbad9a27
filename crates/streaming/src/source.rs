use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;

/// Where a level's raw GeoJSON bytes come from.
///
/// `location` is the level's manifest `path`; each source decides how to
/// resolve it. Sources are opaque bytes-in: decoding happens in the store.
pub trait GeometrySource: Send + Sync {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, SourceError>>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    NotFound(String),
    InvalidLocation(String),
    Io(String),
    Http { status: Option<u16>, message: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotFound(location) => write!(f, "resource not found: {location}"),
            SourceError::InvalidLocation(location) => {
                write!(f, "location escapes the source root: {location}")
            }
            SourceError::Io(message) => write!(f, "I/O error: {message}"),
            SourceError::Http {
                status: Some(status),
                message,
            } => write!(f, "HTTP {status}: {message}"),
            SourceError::Http {
                status: None,
                message,
            } => write!(f, "HTTP request failed: {message}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Reads level files from a package directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, SourceError> {
        let rel = Path::new(location);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SourceError::InvalidLocation(location.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl GeometrySource for FileSource {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, SourceError>> {
        let path = self.resolve(location);
        let location = location.to_string();
        async move {
            let path = path?;
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(SourceError::NotFound(location))
                }
                Err(err) => Err(SourceError::Io(format!("{}: {err}", path.display()))),
            }
        }
        .boxed()
    }

    fn describe(&self) -> String {
        format!("file:{}", self.root.display())
    }
}

/// Fetches level files relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub fn url_for(&self, location: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            location.trim_start_matches('/')
        )
    }
}

impl GeometrySource for HttpSource {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, SourceError>> {
        let url = self.url_for(location);
        let http = self.http.clone();
        async move {
            let resp = http.get(&url).send().await.map_err(|e| SourceError::Http {
                status: None,
                message: e.to_string(),
            })?;
            let status = resp.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(SourceError::NotFound(url));
            }
            if !status.is_success() {
                return Err(SourceError::Http {
                    status: Some(status.as_u16()),
                    message: url,
                });
            }
            resp.bytes().await.map_err(|e| SourceError::Http {
                status: Some(status.as_u16()),
                message: e.to_string(),
            })
        }
        .boxed()
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// In-memory source for fixtures and embedded data.
///
/// Entries can be inserted or removed while shared, which also makes it the
/// way to simulate an unreachable level.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, location: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        self.insert(location, payload);
        self
    }

    pub fn insert(&self, location: impl Into<String>, payload: impl Into<Bytes>) {
        self.entries.lock().insert(location.into(), payload.into());
    }

    pub fn remove(&self, location: &str) -> Option<Bytes> {
        self.entries.lock().remove(location)
    }
}

impl GeometrySource for StaticSource {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, SourceError>> {
        let found = self.entries.lock().get(location).cloned();
        let location = location.to_string();
        async move { found.ok_or(SourceError::NotFound(location)) }.boxed()
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
