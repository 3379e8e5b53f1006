//! Scene and panorama loading on top of a [`Backend`].
//!
//! `load_scene` walks the hotspot graph depth-first. The graph may contain
//! cycles (A ↔ B is the common case), so the walk carries an explicit set of
//! visited scene ids and never enters a scene twice. Once the first scene is
//! on screen, a [`Prefetcher`] repeats the same walk in the background, one
//! scene per step, and then warms the panorama cache in small concurrent
//! batches. Background futures only read from the backend; their results are
//! written into the caches by whoever polls them.

use std::{
    collections::{BTreeSet, VecDeque},
    fmt,
    rc::Rc,
    sync::Arc,
    task::Poll,
};

use futures::future::{FutureExt, LocalBoxFuture, join_all};
use thiserror::Error;
use tour_backend::{Backend, BackendError};

use crate::cache::{PanoramaTexture, SceneCache, TextureCache, TourContext};
use crate::scene::{Scene, SceneId};

/// Panoramas fetched concurrently per sweep batch.
pub const PREFETCH_BATCH: usize = 4;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("decoding panorama {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
}

/// Outcome of a background texture sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub fetched: usize,
    pub failed: Vec<String>,
}

#[derive(Debug)]
pub struct SceneLoader<B> {
    backend: Rc<B>,
    batch_size: usize,
}

impl<B: Backend + 'static> SceneLoader<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Rc::new(backend),
            batch_size: PREFETCH_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Return the cached scene, fetching it (row plus hotspots) on a miss.
    pub async fn fetch_scene(
        &self,
        cache: &mut SceneCache,
        id: SceneId,
    ) -> Result<Arc<Scene>, LoadError> {
        if let Some(scene) = cache.get(id) {
            return Ok(scene);
        }
        let scene = fetch_scene_records(self.backend.as_ref(), id).await?;
        Ok(cache.insert(scene))
    }

    /// Fetch `id` and, recursively, every scene reachable from it that is not
    /// already in `visited`. Failures below `id` are logged and skipped; they
    /// fall back to an on-demand fetch when the viewer navigates there.
    pub fn load_scene<'a>(
        &'a self,
        cache: &'a mut SceneCache,
        id: SceneId,
        visited: &'a mut BTreeSet<SceneId>,
    ) -> LocalBoxFuture<'a, Result<Arc<Scene>, LoadError>> {
        async move {
            visited.insert(id);
            let scene = self.fetch_scene(cache, id).await?;
            for target in scene.targets() {
                if visited.contains(&target) {
                    continue;
                }
                if let Err(err) = self.load_scene(cache, target, visited).await {
                    log::warn!("prefetch of scene {target} (linked from {id}) failed: {err}");
                }
            }
            Ok(scene)
        }
        .boxed_local()
    }

    /// Return the cached panorama for `url`, fetching and decoding on a miss.
    pub async fn load_texture(
        &self,
        textures: &mut TextureCache,
        url: &str,
    ) -> Result<Arc<PanoramaTexture>, LoadError> {
        if let Some(texture) = textures.get(url) {
            return Ok(texture);
        }
        let texture = fetch_texture(self.backend.as_ref(), url).await?;
        Ok(textures.insert(texture))
    }

    /// Decode the panorama of every cached scene that has none yet.
    pub async fn sweep_textures(&self, context: &mut TourContext) -> SweepReport {
        Prefetcher::sweep_only().finish(self, context).await
    }

    fn background_scene(&self, id: SceneId) -> LocalBoxFuture<'static, Fetched> {
        let backend = Rc::clone(&self.backend);
        async move { Fetched::Scene(id, fetch_scene_records(backend.as_ref(), id).await) }.boxed_local()
    }

    fn background_batch(&self, urls: Vec<String>) -> LocalBoxFuture<'static, Fetched> {
        let backend = Rc::clone(&self.backend);
        async move {
            let results = join_all(urls.iter().map(|url| fetch_texture(backend.as_ref(), url))).await;
            Fetched::Textures(urls.into_iter().zip(results).collect())
        }
        .boxed_local()
    }
}

async fn fetch_scene_records<B: Backend>(backend: &B, id: SceneId) -> Result<Scene, LoadError> {
    let record = backend.fetch_scene(id).await?;
    let hotspots = backend.fetch_hotspots(id).await?;
    log::debug!(
        "fetched scene {id} ({} hotspot(s), panorama {})",
        hotspots.len(),
        record.panorama_url
    );
    Ok(Scene::from_records(&record, &hotspots))
}

async fn fetch_texture<B: Backend>(backend: &B, url: &str) -> Result<PanoramaTexture, LoadError> {
    let bytes = backend.fetch_bytes(url).await?;
    PanoramaTexture::decode(url, &bytes).map_err(|source| LoadError::Decode {
        url: url.to_string(),
        source,
    })
}

enum Fetched {
    Scene(SceneId, Result<Scene, LoadError>),
    Textures(Vec<(String, Result<PanoramaTexture, LoadError>)>),
}

/// Background prefetch that advances one unit of work at a time: one scene of
/// the graph walk, then one panorama batch of the sweep.
///
/// The in-flight fetch owns a handle to the backend, so the caller can keep
/// running frames between polls. Results land in the caches only through
/// [`Prefetcher::poll_step`] and [`Prefetcher::finish`].
pub struct Prefetcher {
    visited: BTreeSet<SceneId>,
    /// Scenes still to walk, with the scene that linked them.
    stack: Vec<(SceneId, SceneId)>,
    /// Panorama URLs still to warm; `None` until the walk is over.
    sweep: Option<VecDeque<String>>,
    in_flight: Option<LocalBoxFuture<'static, Fetched>>,
    report: SweepReport,
    done: bool,
}

impl fmt::Debug for Prefetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prefetcher")
            .field("visited", &self.visited)
            .field("stack", &self.stack)
            .field("sweep", &self.sweep)
            .field("in_flight", &self.in_flight.is_some())
            .field("report", &self.report)
            .field("done", &self.done)
            .finish()
    }
}

impl Prefetcher {
    /// Walk everything reachable from `start`, which counts as visited.
    pub fn from_scene(start: &Scene) -> Self {
        let mut stack: Vec<(SceneId, SceneId)> =
            start.targets().into_iter().map(|target| (target, start.id)).collect();
        stack.reverse();
        Self {
            visited: BTreeSet::from([start.id]),
            stack,
            sweep: None,
            in_flight: None,
            report: SweepReport::default(),
            done: false,
        }
    }

    /// Skip the walk and only warm panoramas of already cached scenes.
    pub fn sweep_only() -> Self {
        Self {
            visited: BTreeSet::new(),
            stack: Vec::new(),
            sweep: None,
            in_flight: None,
            report: SweepReport::default(),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the graph walk is over and panoramas are being warmed.
    pub fn is_sweeping(&self) -> bool {
        self.sweep.is_some() && !self.done
    }

    pub fn visited(&self) -> &BTreeSet<SceneId> {
        &self.visited
    }

    pub fn report(&self) -> &SweepReport {
        &self.report
    }

    /// Poll the in-flight fetch once without waiting on it. Applies a finished
    /// result and launches the next unit. Returns whether a unit completed.
    pub async fn poll_step<B: Backend + 'static>(
        &mut self,
        loader: &SceneLoader<B>,
        context: &mut TourContext,
    ) -> bool {
        if self.in_flight.is_none() && !self.launch(loader, context) {
            return false;
        }
        let Some(fetch) = self.in_flight.as_mut() else {
            return false;
        };
        let Poll::Ready(fetched) = futures::poll!(fetch.as_mut()) else {
            return false;
        };
        self.in_flight = None;
        self.apply(fetched, context);
        self.launch(loader, context);
        true
    }

    /// Drive the prefetch to the end.
    pub async fn finish<B: Backend + 'static>(
        mut self,
        loader: &SceneLoader<B>,
        context: &mut TourContext,
    ) -> SweepReport {
        loop {
            if self.in_flight.is_none() && !self.launch(loader, context) {
                break;
            }
            if let Some(fetch) = self.in_flight.take() {
                let fetched = fetch.await;
                self.apply(fetched, context);
            }
        }
        self.report
    }

    /// Start the next fetch. Returns false once there is nothing left.
    fn launch<B: Backend + 'static>(&mut self, loader: &SceneLoader<B>, context: &mut TourContext) -> bool {
        if self.done {
            return false;
        }
        while let Some((id, from)) = self.stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            match context.scenes.get(id) {
                // Fetched on demand since the walk began.
                Some(scene) => self.push_targets(&scene),
                None => {
                    log::trace!("prefetching scene {id} (linked from {from})");
                    self.in_flight = Some(loader.background_scene(id));
                    return true;
                }
            }
        }

        let pending = self.sweep.get_or_insert_with(|| {
            log::info!("prefetch walked {} scene(s)", context.scenes.len());
            let mut urls = VecDeque::new();
            for scene in context.scenes.scenes() {
                let url = &scene.panorama_url;
                if !context.textures.contains(url) && !urls.contains(url) {
                    urls.push_back(url.clone());
                }
            }
            urls
        });
        let mut batch = Vec::new();
        while batch.len() < loader.batch_size() {
            let Some(url) = pending.pop_front() else {
                break;
            };
            if !context.textures.contains(&url) {
                batch.push(url);
            }
        }
        if batch.is_empty() {
            self.done = true;
            log::info!(
                "texture sweep finished: {} fetched, {} failed",
                self.report.fetched,
                self.report.failed.len()
            );
            return false;
        }
        self.in_flight = Some(loader.background_batch(batch));
        true
    }

    fn apply(&mut self, fetched: Fetched, context: &mut TourContext) {
        match fetched {
            Fetched::Scene(_, Ok(scene)) => {
                let scene = context.scenes.insert(scene);
                self.push_targets(&scene);
            }
            Fetched::Scene(id, Err(err)) => {
                log::warn!("prefetch of scene {id} failed: {err}");
            }
            Fetched::Textures(results) => {
                for (url, result) in results {
                    match result {
                        Ok(texture) => {
                            context.textures.insert(texture);
                            self.report.fetched += 1;
                        }
                        Err(err) => {
                            log::warn!("background panorama load failed: {err}");
                            self.report.failed.push(url);
                        }
                    }
                }
            }
        }
    }

    fn push_targets(&mut self, scene: &Scene) {
        let mut targets: Vec<(SceneId, SceneId)> = scene
            .targets()
            .into_iter()
            .filter(|target| !self.visited.contains(target))
            .map(|target| (target, scene.id))
            .collect();
        targets.reverse();
        self.stack.extend(targets);
    }
}
