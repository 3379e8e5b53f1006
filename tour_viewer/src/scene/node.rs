use std::sync::Arc;

use glam::Vec3;

use super::{HotspotId, Scene, SceneId};
use crate::cache::PanoramaTexture;

/// Radius of the inverted panorama sphere.
pub const PANORAMA_RADIUS: f32 = 500.0;

/// Pick radius of a hotspot billboard.
pub const BILLBOARD_RADIUS: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct PanoramaSphere {
    pub url: String,
    pub radius: f32,
    /// `None` while the decode failed; the sphere then renders untextured.
    pub texture: Option<Arc<PanoramaTexture>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotspotBillboard {
    pub hotspot: HotspotId,
    pub label: String,
    pub target: Option<SceneId>,
    /// Position in the scene root group's local space.
    pub position: Vec3,
    pub radius: f32,
}

/// Mesh set for the scene currently on screen: one panorama sphere plus one
/// billboard per hotspot.
#[derive(Debug)]
pub struct ActiveSceneNode {
    scene: Arc<Scene>,
    pub panorama: PanoramaSphere,
    pub billboards: Vec<HotspotBillboard>,
}

impl ActiveSceneNode {
    pub fn build(scene: Arc<Scene>, texture: Option<Arc<PanoramaTexture>>) -> Self {
        let billboards = scene
            .hotspots
            .iter()
            .map(|hotspot| HotspotBillboard {
                hotspot: hotspot.id,
                label: hotspot.label.clone(),
                target: hotspot.target,
                position: hotspot.position,
                radius: BILLBOARD_RADIUS,
            })
            .collect();
        log::debug!(
            "built scene node {} ({} billboard(s), texture {})",
            scene.id,
            scene.hotspots.len(),
            if texture.is_some() { "ready" } else { "missing" }
        );

        Self {
            panorama: PanoramaSphere {
                url: scene.panorama_url.clone(),
                radius: PANORAMA_RADIUS,
                texture,
            },
            billboards,
            scene,
        }
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub fn scene_id(&self) -> SceneId {
        self.scene.id
    }

    pub fn billboard(&self, hotspot: HotspotId) -> Option<&HotspotBillboard> {
        self.billboards.iter().find(|b| b.hotspot == hotspot)
    }
}

impl Drop for ActiveSceneNode {
    fn drop(&mut self) {
        log::debug!("disposed scene node {}", self.scene.id);
    }
}
