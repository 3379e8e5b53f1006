use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::scene::SceneId;

/// Append-only JSON array of scene ids the viewer has entered.
#[derive(Debug, Clone)]
pub struct VisitLog {
    path: PathBuf,
    visits: Vec<SceneId>,
}

impl VisitLog {
    /// Open `path`, keeping any visits already recorded there. An unreadable
    /// file starts a fresh log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let visits = match read_visits(&path) {
            Ok(visits) => visits,
            Err(err) => {
                log::warn!("starting a new visit log: {err:#}");
                Vec::new()
            }
        };
        Self { path, visits }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn visits(&self) -> &[SceneId] {
        &self.visits
    }

    /// Record `scene`. Write failures are logged and otherwise ignored.
    pub fn record(&mut self, scene: SceneId) {
        self.visits.push(scene);
        if let Err(err) = self.flush() {
            log::warn!("visit log not saved: {err:#}");
        }
    }

    fn flush(&self) -> Result<()> {
        let data = serde_json::to_string(&self.visits)?;
        fs::write(&self.path, data)
            .with_context(|| format!("writing visit log {}", self.path.display()))
    }
}

fn read_visits(path: &Path) -> Result<Vec<SceneId>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading visit log {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&data).with_context(|| format!("parsing visit log {}", path.display()))
}
