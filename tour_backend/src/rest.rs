use serde::de::DeserializeOwned;

use crate::{Backend, BackendError, HotspotRecord, SceneId, SceneRecord};

/// HTTPS client for the hosted tour service.
///
/// Requests under `base_url` carry the API key twice, as the `apikey` header
/// and as a bearer token, which is what the PostgREST gateway in front of the
/// tables expects. Panorama URLs on any other host are fetched without it.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str, filter: &str) -> String {
        format!("{}/rest/v1/{table}?{filter}&select=*", self.base_url)
    }

    /// Whether `url` points at the tour service itself.
    fn is_own_url(&self, url: &str) -> bool {
        url.strip_prefix(&self.base_url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, BackendError> {
        log::debug!("GET {url}");
        let mut request = self.client.get(url);
        if self.is_own_url(url) {
            request = request.header("apikey", &self.api_key).bearer_auth(&self.api_key);
        }
        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_rows<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, BackendError> {
        let body = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|source| BackendError::Http {
                url: url.to_string(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|source| BackendError::Json {
            what: url.to_string(),
            source,
        })
    }
}

impl Backend for RestBackend {
    async fn fetch_scene(&self, id: SceneId) -> Result<SceneRecord, BackendError> {
        let url = self.table_url("scenes", &format!("id=eq.{id}"));
        let rows: Vec<SceneRecord> = self.get_rows(&url).await?;
        rows.into_iter()
            .next()
            .ok_or(BackendError::SceneNotFound(id))
    }

    async fn fetch_hotspots(&self, scene: SceneId) -> Result<Vec<HotspotRecord>, BackendError> {
        let url = self.table_url("hotspots", &format!("scene_id=eq.{scene}&order=id.asc"));
        self.get_rows(&url).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| BackendError::Http {
                url: url.to_string(),
                source,
            })?;
        Ok(bytes.to_vec())
    }
}
