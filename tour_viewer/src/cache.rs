//! Process-lifetime caches for scenes and decoded panoramas.
//!
//! Both maps are append-only: once a key is present its value is never
//! replaced, which is what lets a late-finishing prefetch land safely after
//! the viewer has already moved on.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::scene::{Hotspot, Scene, SceneId};

/// Decoded RGBA8 equirectangular panorama.
#[derive(Debug, Clone)]
pub struct PanoramaTexture {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PanoramaTexture {
    pub fn decode(url: &str, bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            url: url.to_string(),
            width,
            height,
            data: image.into_raw(),
        })
    }
}

/// Resolution of a hotspot target against the scene cache.
#[derive(Debug, Clone)]
pub enum TargetRef {
    Pending(SceneId),
    Loaded(Arc<Scene>),
}

impl TargetRef {
    pub fn id(&self) -> SceneId {
        match self {
            TargetRef::Pending(id) => *id,
            TargetRef::Loaded(scene) => scene.id,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, TargetRef::Loaded(_))
    }
}

#[derive(Debug, Default)]
pub struct SceneCache {
    scenes: BTreeMap<SceneId, Arc<Scene>>,
}

impl SceneCache {
    pub fn get(&self, id: SceneId) -> Option<Arc<Scene>> {
        self.scenes.get(&id).cloned()
    }

    pub fn contains(&self, id: SceneId) -> bool {
        self.scenes.contains_key(&id)
    }

    /// Insert unless already present; returns the cached entry either way.
    pub fn insert(&mut self, scene: Scene) -> Arc<Scene> {
        self.scenes
            .entry(scene.id)
            .or_insert_with(|| Arc::new(scene))
            .clone()
    }

    pub fn target(&self, id: SceneId) -> TargetRef {
        match self.get(id) {
            Some(scene) => TargetRef::Loaded(scene),
            None => TargetRef::Pending(id),
        }
    }

    /// `None` for leaf hotspots.
    pub fn resolve(&self, hotspot: &Hotspot) -> Option<TargetRef> {
        hotspot.target.map(|target| self.target(target))
    }

    pub fn ids(&self) -> impl Iterator<Item = SceneId> + '_ {
        self.scenes.keys().copied()
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Arc<Scene>> {
        self.scenes.values()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TextureCache {
    textures: HashMap<String, Arc<PanoramaTexture>>,
}

impl TextureCache {
    pub fn get(&self, url: &str) -> Option<Arc<PanoramaTexture>> {
        self.textures.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.textures.contains_key(url)
    }

    pub fn insert(&mut self, texture: PanoramaTexture) -> Arc<PanoramaTexture> {
        self.textures
            .entry(texture.url.clone())
            .or_insert_with(|| Arc::new(texture))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

/// Owned caches for one tour session. The loader is the only writer.
#[derive(Debug, Default)]
pub struct TourContext {
    pub scenes: SceneCache,
    pub textures: TextureCache,
}

impl TourContext {
    pub fn new() -> Self {
        Self::default()
    }
}
