//! Offline stand-in for the tour service, backed by a JSON document.
//!
//! Panorama URLs are resolved against in-memory assets first, then against
//! the directory holding the fixture file. Every call is counted so callers
//! can assert how often the network would have been hit.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Backend, BackendError, HotspotRecord, SceneId, SceneRecord};

/// On-disk shape of a fixture file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TourFixture {
    #[serde(default)]
    pub scenes: Vec<SceneRecord>,
    #[serde(default)]
    pub hotspots: Vec<HotspotRecord>,
}

impl TourFixture {
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let data = fs::read(path).map_err(|source| BackendError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| BackendError::Json {
            what: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Default)]
pub struct FixtureBackend {
    fixture: TourFixture,
    asset_root: Option<PathBuf>,
    assets: BTreeMap<String, Vec<u8>>,
    requests: RefCell<BTreeMap<String, usize>>,
}

impl FixtureBackend {
    pub fn new(fixture: TourFixture) -> Self {
        Self {
            fixture,
            ..Self::default()
        }
    }

    /// Load a fixture file; relative asset URLs resolve next to it.
    pub fn from_path(path: &Path) -> Result<Self, BackendError> {
        let fixture = TourFixture::load(path)?;
        let mut backend = Self::new(fixture);
        backend.asset_root = path.parent().map(Path::to_path_buf);
        Ok(backend)
    }

    /// Serve `bytes` for `url` without touching the filesystem.
    pub fn with_asset(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.assets.insert(url.into(), bytes);
        self
    }

    pub fn fixture(&self) -> &TourFixture {
        &self.fixture
    }

    /// Number of `fetch_scene` calls made for `id`.
    pub fn scene_fetches(&self, id: SceneId) -> usize {
        self.count(&scene_key(id))
    }

    /// Number of `fetch_bytes` calls made for `url`.
    pub fn asset_fetches(&self, url: &str) -> usize {
        self.count(&asset_key(url))
    }

    /// Total number of requests of any kind.
    pub fn total_requests(&self) -> usize {
        self.requests.borrow().values().sum()
    }

    fn count(&self, key: &str) -> usize {
        self.requests.borrow().get(key).copied().unwrap_or(0)
    }

    fn record(&self, key: String) {
        *self.requests.borrow_mut().entry(key).or_insert(0) += 1;
    }

    fn resolve_asset_path(&self, url: &str) -> Option<PathBuf> {
        let stripped = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(stripped);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        if stripped.contains("://") {
            return None;
        }
        Some(match self.asset_root.as_ref() {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        })
    }
}

fn scene_key(id: SceneId) -> String {
    format!("scene:{id}")
}

fn asset_key(url: &str) -> String {
    format!("asset:{url}")
}

impl Backend for FixtureBackend {
    async fn fetch_scene(&self, id: SceneId) -> Result<SceneRecord, BackendError> {
        self.record(scene_key(id));
        self.fixture
            .scenes
            .iter()
            .find(|scene| scene.id == id)
            .cloned()
            .ok_or(BackendError::SceneNotFound(id))
    }

    async fn fetch_hotspots(&self, scene: SceneId) -> Result<Vec<HotspotRecord>, BackendError> {
        self.record(format!("hotspots:{scene}"));
        let mut rows: Vec<HotspotRecord> = self
            .fixture
            .hotspots
            .iter()
            .filter(|hotspot| hotspot.scene_id == scene)
            .cloned()
            .collect();
        rows.sort_by_key(|hotspot| hotspot.id);
        Ok(rows)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        self.record(asset_key(url));
        if let Some(bytes) = self.assets.get(url) {
            return Ok(bytes.clone());
        }

        let path = self
            .resolve_asset_path(url)
            .ok_or_else(|| BackendError::AssetNotFound(url.to_string()))?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::AssetNotFound(url.to_string()))
            }
            Err(source) => Err(BackendError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}
