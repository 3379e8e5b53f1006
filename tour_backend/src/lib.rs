//! Backend access for the panorama tour.
//!
//! The tour service exposes two PostgREST-style resources, `scenes` and
//! `hotspots`, plus plain HTTPS URLs for the panorama images. This crate keeps
//! the wire records and the fetch surface in one place so the viewer and the
//! offline fixtures agree on the same shapes.

use std::future::Future;

use thiserror::Error;

pub mod fixture;
pub mod records;
pub mod rest;

pub use fixture::{FixtureBackend, TourFixture};
pub use records::{HotspotRecord, SceneRecord};
pub use rest::RestBackend;

/// Integer key of a scene row.
pub type SceneId = i64;

/// Integer key of a hotspot row.
pub type HotspotId = i64;

/// Read-only view of the tour service.
///
/// Implementations are driven from a single-threaded runtime, so the returned
/// futures are not required to be `Send`.
pub trait Backend {
    /// Fetch one scene row by id.
    fn fetch_scene(&self, id: SceneId) -> impl Future<Output = Result<SceneRecord, BackendError>>;

    /// Fetch every hotspot row owned by `scene`, in storage order.
    fn fetch_hotspots(
        &self,
        scene: SceneId,
    ) -> impl Future<Output = Result<Vec<HotspotRecord>, BackendError>>;

    /// Fetch the raw bytes behind a panorama (or other asset) URL.
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, BackendError>>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("scene {0} not found")]
    SceneNotFound(SceneId),
    #[error("asset {0} not found")]
    AssetNotFound(String),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {what}: {source}")]
    Json {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    /// Whether the failure means the row or asset simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackendError::SceneNotFound(_)
                | BackendError::AssetNotFound(_)
                | BackendError::Status { status: 404, .. }
        )
    }
}
