use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;

use crate::scene::{HotspotId, SceneId};
use crate::tour::TourSettings;

#[derive(Parser, Debug)]
#[command(about = "Headless driver for the panorama tour viewer", version)]
pub struct Args {
    /// Tour fixture JSON (`{"scenes": [...], "hotspots": [...]}`); panoramas resolve next to it
    #[arg(long, conflicts_with = "backend_url")]
    pub fixture: Option<PathBuf>,

    /// Base URL of the tour service (PostgREST style `/rest/v1/<table>`)
    #[arg(long)]
    pub backend_url: Option<String>,

    /// API key sent to the tour service
    #[arg(long, env = "TOUR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Scene shown first
    #[arg(long, default_value_t = 28)]
    pub start_scene: SceneId,

    /// Comma separated hotspot ids to click, in order, once the tour is up
    #[arg(long, value_delimiter = ',')]
    pub route: Vec<HotspotId>,

    /// Optional tour preset JSON overriding fade, prefetch and XR tuning
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// When set, append every scene entered to this JSON file
    #[arg(long)]
    pub visit_log: Option<PathBuf>,

    /// Video id whose audio track plays as ambient sound
    #[arg(long)]
    pub audio_video_id: Option<String>,

    /// Local audio file used when the video source is unavailable
    #[arg(long)]
    pub audio_fallback: Option<PathBuf>,

    /// Simulate an XR session (no controllers) before walking the route
    #[arg(long)]
    pub xr: bool,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.fixture.is_none() && self.backend_url.is_none() {
            bail!("either --fixture or --backend-url is required");
        }
        if self.backend_url.is_some() && self.api_key.is_none() {
            bail!("--backend-url needs --api-key (or TOUR_API_KEY)");
        }
        Ok(())
    }
}

/// Tuning preset. Every field is optional and falls back to the built-in value.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TourConfig {
    #[serde(default)]
    pub fade_speed: Option<f32>,
    #[serde(default)]
    pub prefetch_batch: Option<usize>,
    #[serde(default)]
    pub controller_attempts: Option<u32>,
    #[serde(default)]
    pub controller_interval_ms: Option<u64>,
    #[serde(default)]
    pub eye_height: Option<f32>,
    #[serde(default)]
    pub laser_length: Option<f32>,
}

impl TourConfig {
    pub fn settings(&self) -> TourSettings {
        let mut settings = TourSettings::default();
        if let Some(speed) = self.fade_speed.filter(|speed| *speed > 0.0) {
            settings.fade_speed = speed;
        }
        if let Some(attempts) = self.controller_attempts {
            settings.controller_retry.attempts = attempts.max(1);
        }
        if let Some(interval) = self.controller_interval_ms {
            settings.controller_retry.interval = Duration::from_millis(interval);
        }
        if let Some(height) = self.eye_height {
            settings.eye_height = height;
        }
        if let Some(length) = self.laser_length {
            settings.laser_length = length;
        }
        settings
    }

    pub fn prefetch_batch(&self) -> usize {
        self.prefetch_batch
            .unwrap_or(crate::loader::PREFETCH_BATCH)
            .max(1)
    }
}

pub fn load_tour_config(path: &Path) -> Result<TourConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading tour config {}", path.display()))?;
    let config: TourConfig = serde_json::from_str(&data)
        .with_context(|| format!("parsing tour config {}", path.display()))?;
    Ok(config)
}
