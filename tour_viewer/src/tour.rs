//! The tour: one current scene, the fade gate around every swap, and the
//! per-frame glue between input, XR, interaction and the hover label.
//!
//! `Tour::frame` is synchronous. Anything it cannot finish without I/O is
//! returned as an [`AssetRequest`]; [`TourDriver`] awaits those through the
//! loader between frames and reports back.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use glam::{EulerRot, Quat, Vec2, Vec3};
use thiserror::Error;
use tour_backend::Backend;

use crate::audio::AudioSync;
use crate::cache::{TargetRef, TourContext};
use crate::camera::ViewRig;
use crate::fade::{FADE_SPEED, FadeController, FadeDirection};
use crate::interaction::{ControllerFrame, InteractionController, LASER_LENGTH, SelectEvent, TransitionRequest};
use crate::label::{HoverLabel, LabelStyle};
use crate::loader::{LoadError, Prefetcher, SceneLoader, SweepReport};
use crate::scene::orientation::{
    Arrival, CameraSink, GroupSink, OrientationSink, arrival_hotspot, entry_orientation,
};
use crate::scene::{ActiveSceneNode, EulerAngles, HotspotId, Scene, SceneId};
use crate::visit_log::VisitLog;
use crate::xr::{EYE_HEIGHT, InputSource, RetryPolicy, XrDevice, XrSessionManager};

#[derive(Debug, Clone, Copy)]
pub struct TourSettings {
    pub fade_speed: f32,
    pub laser_length: f32,
    pub eye_height: f32,
    pub controller_retry: RetryPolicy,
    pub label: LabelStyle,
}

impl Default for TourSettings {
    fn default() -> Self {
        Self {
            fade_speed: FADE_SPEED,
            laser_length: LASER_LENGTH,
            eye_height: EYE_HEIGHT,
            controller_retry: RetryPolicy::default(),
            label: LabelStyle::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TourError {
    #[error("loading start scene {id}")]
    Startup {
        id: SceneId,
        #[source]
        source: LoadError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRequest {
    Scene(SceneId),
    Texture(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Pointer moved to normalized device coordinates.
    Move(Vec2),
    Down(Vec2),
    /// Drag delta in pixels.
    Drag(Vec2),
}

/// One XR frame as reported by the device, poses in reference space.
#[derive(Debug, Clone, Default)]
pub struct XrFrame {
    pub head_position: Vec3,
    pub head_rotation: Quat,
    pub input_sources: Vec<InputSource>,
    pub controllers: Vec<ControllerFrame>,
    pub events: Vec<(usize, SelectEvent)>,
}

impl XrFrame {
    /// Whether input source `index` exposes a gamepad whose button 0 is read.
    pub fn has_gamepad(&self, index: usize) -> bool {
        self.input_sources
            .iter()
            .any(|source| source.index == index && source.has_gamepad)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    /// Seconds since the previous frame.
    pub dt: f32,
    /// Frame clock since the tour started.
    pub elapsed: Duration,
    pub pointer: Vec<PointerEvent>,
    /// Device orientation reading (`alpha`, `beta`) in radians.
    pub gyro: Option<(f32, f32)>,
    pub xr: Option<XrFrame>,
}

impl FrameInput {
    pub fn idle(dt: f32) -> Self {
        Self {
            dt,
            ..Self::default()
        }
    }
}

/// Midpoint payload of a transition fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Swap {
    target: SceneId,
    arrival: Arrival,
}

pub struct Tour {
    context: TourContext,
    fade: FadeController<Swap>,
    interaction: InteractionController,
    label: HoverLabel,
    xr: XrSessionManager,
    rig: ViewRig,
    sink: Box<dyn OrientationSink>,
    node: ActiveSceneNode,
    entry: EulerAngles,
    audio: AudioSync,
    visit_log: Option<VisitLog>,
    /// Transition waiting for its target scene to be fetched.
    parked: Option<TransitionRequest>,
    /// Midpoint reached; the swap waits for the panorama.
    holding: Option<Swap>,
    failed_textures: BTreeSet<String>,
    in_flight: Vec<AssetRequest>,
    outbox: Vec<AssetRequest>,
    history: Vec<SceneId>,
    /// Orbit and gyro state to restore when an XR session ends.
    desktop_controls: (bool, bool),
}

impl std::fmt::Debug for Tour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tour")
            .field("scene", &self.node.scene_id())
            .field("fade", &self.fade.state())
            .field("xr", &self.xr.phase())
            .field("sink", &self.sink.label())
            .field("parked", &self.parked)
            .field("holding", &self.holding)
            .finish()
    }
}

impl Tour {
    /// Fetch and show the first scene. Failing to fetch it is fatal; a
    /// missing panorama is not.
    pub async fn start<B: Backend + 'static>(
        loader: &SceneLoader<B>,
        start: SceneId,
        settings: TourSettings,
    ) -> Result<Self, TourError> {
        let mut context = TourContext::new();
        let scene = loader
            .fetch_scene(&mut context.scenes, start)
            .await
            .map_err(|source| TourError::Startup { id: start, source })?;

        let mut failed_textures = BTreeSet::new();
        if let Err(err) = loader
            .load_texture(&mut context.textures, &scene.panorama_url)
            .await
        {
            log::warn!("start panorama unavailable: {err}");
            failed_textures.insert(scene.panorama_url.clone());
        }

        let texture = context.textures.get(&scene.panorama_url);
        let node = ActiveSceneNode::build(Arc::clone(&scene), texture);
        let mut tour = Self {
            context,
            fade: FadeController::new(settings.fade_speed),
            interaction: InteractionController::new(settings.laser_length),
            label: HoverLabel::new(settings.label),
            xr: XrSessionManager::new(settings.controller_retry, settings.eye_height),
            rig: ViewRig::default(),
            sink: Box::new(CameraSink),
            node,
            entry: scene.entry,
            audio: AudioSync::silent(),
            visit_log: None,
            parked: None,
            holding: None,
            failed_textures,
            in_flight: Vec::new(),
            outbox: Vec::new(),
            history: Vec::new(),
            desktop_controls: (true, false),
        };
        tour.enter(scene, None);
        Ok(tour)
    }

    pub fn attach_audio(&mut self, audio: AudioSync) {
        self.audio = audio;
    }

    /// Start logging visits; the current scene is the first entry.
    pub fn attach_visit_log(&mut self, mut visit_log: VisitLog) {
        visit_log.record(self.node.scene_id());
        self.visit_log = Some(visit_log);
    }

    pub fn context(&self) -> &TourContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut TourContext {
        &mut self.context
    }

    pub fn current_scene(&self) -> &Arc<Scene> {
        self.node.scene()
    }

    pub fn current_scene_id(&self) -> SceneId {
        self.node.scene_id()
    }

    pub fn node(&self) -> &ActiveSceneNode {
        &self.node
    }

    pub fn rig(&self) -> &ViewRig {
        &self.rig
    }

    pub fn fade(&self) -> &FadeController<impl std::fmt::Debug> {
        &self.fade
    }

    pub fn xr(&self) -> &XrSessionManager {
        &self.xr
    }

    pub fn interaction(&self) -> &InteractionController {
        &self.interaction
    }

    pub fn label(&self) -> &HoverLabel {
        &self.label
    }

    pub fn audio(&self) -> &AudioSync {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioSync {
        &mut self.audio
    }

    pub fn sink_label(&self) -> &'static str {
        self.sink.label()
    }

    /// Scenes made current so far, in order.
    pub fn history(&self) -> &[SceneId] {
        &self.history
    }

    /// No fade running, nothing parked or held.
    pub fn is_settled(&self) -> bool {
        self.fade.is_clear() && self.parked.is_none() && self.holding.is_none()
    }

    /// Start the fade towards `request.target`, or park the request while the
    /// target scene is fetched.
    pub fn request_transition(&mut self, request: TransitionRequest) {
        match self.context.scenes.target(request.target) {
            TargetRef::Loaded(scene) => {
                let url = &scene.panorama_url;
                if !self.context.textures.contains(url) {
                    // An earlier failure only covers the visit it happened on.
                    if self.failed_textures.remove(url) {
                        log::debug!("retrying panorama {url}");
                    }
                    self.request(AssetRequest::Texture(url.clone()));
                }
                log::debug!(
                    "transition {} -> {} (hotspot {:?})",
                    request.arrival.from_scene,
                    request.target,
                    request.arrival.hotspot
                );
                self.fade.start(
                    FadeDirection::Out,
                    Some(Swap {
                        target: request.target,
                        arrival: request.arrival,
                    }),
                );
            }
            TargetRef::Pending(id) => {
                if let Some(previous) = self.parked.replace(request) {
                    log::warn!(
                        "transition to scene {} superseded while its scene was loading",
                        previous.target
                    );
                }
                self.request(AssetRequest::Scene(id));
            }
        }
    }

    pub fn scene_loaded(&mut self, id: SceneId) {
        self.settle_request(&AssetRequest::Scene(id));
        if let Some(request) = self.parked.take_if(|parked| parked.target == id) {
            self.request_transition(request);
        }
    }

    pub fn mark_scene_failed(&mut self, id: SceneId) {
        self.settle_request(&AssetRequest::Scene(id));
        if self.parked.take_if(|parked| parked.target == id).is_some() {
            log::warn!("scene {id} could not be loaded; staying in scene {}", self.current_scene_id());
        }
    }

    pub fn texture_loaded(&mut self, url: &str) {
        self.settle_request(&AssetRequest::Texture(url.to_string()));
    }

    pub fn mark_texture_failed(&mut self, url: &str) {
        self.settle_request(&AssetRequest::Texture(url.to_string()));
        self.failed_textures.insert(url.to_string());
    }

    /// Enable or disable device-orientation look controls.
    pub fn set_gyro(&mut self, enabled: bool) {
        if self.xr.is_presenting() {
            self.desktop_controls = (!enabled, enabled);
            return;
        }
        self.rig.gyro.enabled = enabled;
        self.rig.orbit.enabled = !enabled;
        if enabled {
            self.rig.gyro.reset_yaw();
        }
    }

    pub fn on_session_start(&mut self, device: &mut dyn XrDevice, now: Duration) {
        self.desktop_controls = (self.rig.orbit.enabled, self.rig.gyro.enabled);
        self.rig.orbit.enabled = false;
        self.rig.gyro.enabled = false;

        let reference = self.xr.on_session_start(device, now);
        self.rig.camera.position = Vec3::Y * reference.offset_y;
        self.rig.camera.rotation = Quat::IDENTITY;
        self.select_sink(Box::new(GroupSink));
        self.audio.on_session_start();
    }

    pub fn on_session_end(&mut self) {
        self.xr.on_session_end();
        self.interaction.unbind_all();
        self.label.hide();

        let (orbit, gyro) = self.desktop_controls;
        self.rig.orbit.enabled = orbit;
        self.rig.gyro.enabled = gyro;
        self.rig.camera.position = Vec3::ZERO;
        self.select_sink(Box::new(CameraSink));
        self.audio.on_session_end();
    }

    /// Point the desktop camera at a hotspot of the current scene.
    pub fn aim_at_hotspot(&mut self, hotspot: HotspotId) -> bool {
        let Some(billboard) = self.node.billboard(hotspot) else {
            return false;
        };
        let direction = (self.rig.root.to_world(billboard.position) - self.rig.camera.position)
            .normalize_or_zero();
        if direction == Vec3::ZERO {
            return false;
        }
        let yaw = (-direction.x).atan2(-direction.z);
        let pitch = direction.y.clamp(-1.0, 1.0).asin();
        self.rig.camera.rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
        self.rig.orbit.sync_from(&self.rig.camera);
        true
    }

    /// The per-frame callback for both flat and XR frames.
    pub fn frame(&mut self, input: FrameInput) -> Vec<AssetRequest> {
        for event in &input.pointer {
            self.handle_pointer(*event);
        }
        if let Some((alpha, beta)) = input.gyro {
            if !self.xr.is_presenting() {
                self.rig.gyro.update(alpha, beta, &mut self.rig.camera);
            }
        }
        if let Some(xr_frame) = &input.xr {
            if self.xr.is_presenting() {
                self.xr_frame(xr_frame, input.elapsed);
            }
        }

        if let Some(swap) = self.fade.tick(input.dt) {
            if let Some(dropped) = self.holding.replace(swap) {
                log::warn!("held transition to scene {} replaced", dropped.target);
            }
        }
        self.try_swap();
        self.update_label();

        std::mem::take(&mut self.outbox)
    }

    fn handle_pointer(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Move(ndc) => self.interaction.pointer_move(ndc),
            PointerEvent::Drag(delta) => {
                if self.rig.orbit.enabled && !self.xr.is_presenting() {
                    self.rig.orbit.drag(delta, &mut self.rig.camera);
                }
            }
            PointerEvent::Down(ndc) => {
                self.audio.on_user_gesture();
                if self.xr.is_presenting() {
                    return;
                }
                if let Some(request) =
                    self.interaction
                        .pointer_down(ndc, &self.rig.camera, &self.node, &self.rig.root)
                {
                    self.request_transition(request);
                }
            }
        }
    }

    fn xr_frame(&mut self, frame: &XrFrame, now: Duration) {
        let offset = self
            .xr
            .reference_space()
            .map(|reference| reference.offset_y)
            .unwrap_or_default();
        let offset = if self.xr.height_corrected() {
            offset
        } else {
            self.xr
                .normalize_eye_height(frame.head_position.y + offset)
                .unwrap_or(offset)
        };
        let lift = Vec3::Y * offset;
        self.rig.camera.position = frame.head_position + lift;
        self.rig.camera.rotation = frame.head_rotation;

        for index in self.xr.poll_controllers(&frame.input_sources, now) {
            self.interaction.bind_controller(index);
        }
        for &(index, event) in &frame.events {
            self.audio.on_user_gesture();
            self.interaction.controller_event(index, event);
        }

        let controllers: Vec<ControllerFrame> = frame
            .controllers
            .iter()
            .map(|controller| ControllerFrame {
                position: controller.position + lift,
                trigger_pressed: controller
                    .trigger_pressed
                    .filter(|_| frame.has_gamepad(controller.index)),
                ..*controller
            })
            .collect();
        let requests = self
            .interaction
            .update_controllers(&controllers, &self.node, &self.rig.root);
        for request in requests {
            self.request_transition(request);
        }
    }

    /// Finish a held swap once its panorama is cached or known to be missing.
    fn try_swap(&mut self) {
        let Some(swap) = self.holding else {
            return;
        };
        let Some(scene) = self.context.scenes.get(swap.target) else {
            log::warn!("scene {} left the cache before its swap", swap.target);
            self.holding = None;
            self.fade.start(FadeDirection::In, None);
            return;
        };
        let url = &scene.panorama_url;
        if !self.context.textures.contains(url) && !self.failed_textures.contains(url) {
            self.request(AssetRequest::Texture(url.clone()));
            return;
        }

        self.holding = None;
        self.enter(scene, Some(swap.arrival));
        self.fade.start(FadeDirection::In, None);
    }

    /// Make `scene` current and orient the viewer for it.
    fn enter(&mut self, scene: Arc<Scene>, arrival: Option<Arrival>) {
        let previous = self.node.scene();
        let via = arrival.and_then(|arrival| {
            let from = if previous.id == arrival.from_scene {
                Some(Arc::clone(previous))
            } else {
                self.context.scenes.get(arrival.from_scene)
            }?;
            arrival_hotspot(&from, scene.id, arrival.hotspot).cloned()
        });
        self.entry = entry_orientation(&scene, via.as_ref());

        let texture = self.context.textures.get(&scene.panorama_url);
        self.node = ActiveSceneNode::build(Arc::clone(&scene), texture);
        self.label.hide();

        if self.rig.gyro.enabled && !self.xr.is_presenting() {
            self.rig.gyro.reset_yaw();
        } else {
            self.sink.apply(&mut self.rig, self.entry);
        }

        self.history.push(scene.id);
        if let Some(visit_log) = self.visit_log.as_mut() {
            visit_log.record(scene.id);
        }
        log::info!(
            "entered scene {} (yaw {:.1}°, via {} sink)",
            scene.id,
            self.entry.yaw.to_degrees(),
            self.sink.label()
        );
    }

    fn select_sink(&mut self, sink: Box<dyn OrientationSink>) {
        self.sink = sink;
        self.sink.apply(&mut self.rig, self.entry);
    }

    fn update_label(&mut self) {
        let hit = if self.xr.is_presenting() {
            self.interaction.controller_hover()
        } else {
            self.interaction
                .pointer_hit(&self.rig.camera, &self.node, &self.rig.root)
        };
        let root = self.rig.root;
        self.label.update(
            hit.as_ref(),
            &self.node,
            |local| root.to_world(local),
            self.rig.camera.position,
        );
    }

    fn request(&mut self, request: AssetRequest) {
        if !self.in_flight.contains(&request) {
            self.in_flight.push(request.clone());
            self.outbox.push(request);
        }
    }

    fn settle_request(&mut self, request: &AssetRequest) {
        self.in_flight.retain(|pending| pending != request);
    }
}

/// Runs a [`Tour`] against a backend: boot, background prefetch, and the
/// asset requests each frame hands back.
#[derive(Debug)]
pub struct TourDriver<B> {
    loader: SceneLoader<B>,
    tour: Tour,
    prefetch: Option<Prefetcher>,
    clock: Duration,
}

impl<B: Backend + 'static> TourDriver<B> {
    pub async fn boot(loader: SceneLoader<B>, start: SceneId, settings: TourSettings) -> Result<Self, TourError> {
        let tour = Tour::start(&loader, start, settings).await?;
        Ok(Self {
            loader,
            tour,
            prefetch: None,
            clock: Duration::ZERO,
        })
    }

    pub fn tour(&self) -> &Tour {
        &self.tour
    }

    pub fn tour_mut(&mut self) -> &mut Tour {
        &mut self.tour
    }

    pub fn loader(&self) -> &SceneLoader<B> {
        &self.loader
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    /// Begin the background walk from the current scene. Each later frame
    /// advances it by at most one unit.
    pub fn start_prefetch(&mut self) {
        if self.prefetch.is_some() {
            log::debug!("prefetch already running");
            return;
        }
        self.prefetch = Some(Prefetcher::from_scene(self.tour.current_scene()));
    }

    pub fn prefetcher(&self) -> Option<&Prefetcher> {
        self.prefetch.as_ref()
    }

    /// Drive the background prefetch to completion, starting it if needed.
    pub async fn finish_prefetch(&mut self) -> SweepReport {
        self.start_prefetch();
        match self.prefetch.take() {
            Some(prefetch) => {
                let report = prefetch.finish(&self.loader, self.tour.context_mut()).await;
                log::info!("prefetch complete: {} scene(s) cached", self.tour.context().scenes.len());
                report
            }
            None => SweepReport::default(),
        }
    }

    /// Walk the hotspot graph from the current scene, then warm panoramas.
    pub async fn prefetch(&mut self) -> SweepReport {
        self.finish_prefetch().await
    }

    pub async fn pump(&mut self, requests: Vec<AssetRequest>) {
        for request in requests {
            match request {
                AssetRequest::Scene(id) => {
                    let scenes = &mut self.tour.context_mut().scenes;
                    match self.loader.fetch_scene(scenes, id).await {
                        Ok(_) => self.tour.scene_loaded(id),
                        Err(err) => {
                            log::warn!("on-demand fetch of scene {id} failed: {err}");
                            self.tour.mark_scene_failed(id);
                        }
                    }
                }
                AssetRequest::Texture(url) => {
                    let textures = &mut self.tour.context_mut().textures;
                    match self.loader.load_texture(textures, &url).await {
                        Ok(_) => self.tour.texture_loaded(&url),
                        Err(err) => {
                            log::warn!("panorama load failed: {err}");
                            self.tour.mark_texture_failed(&url);
                        }
                    }
                }
            }
        }
    }

    /// Advance the frame clock, run one frame and serve what it asked for.
    pub async fn run_frame(&mut self, mut input: FrameInput) {
        self.clock += Duration::from_secs_f32(input.dt.max(0.0));
        input.elapsed = self.clock;
        let requests = self.tour.frame(input);
        self.pump(requests).await;
        self.advance_prefetch().await;
    }

    async fn advance_prefetch(&mut self) {
        let Some(prefetch) = self.prefetch.as_mut() else {
            return;
        };
        if prefetch.is_done() {
            return;
        }
        prefetch.poll_step(&self.loader, self.tour.context_mut()).await;
        // Let the runtime drive I/O for the fetch still in flight.
        tokio::task::yield_now().await;
    }

    /// Run idle frames until the tour settles. Returns false if it did not
    /// within `max_frames`.
    pub async fn settle(&mut self, dt: f32, max_frames: usize) -> bool {
        for _ in 0..max_frames {
            if self.tour.is_settled() {
                return true;
            }
            self.run_frame(FrameInput::idle(dt)).await;
        }
        self.tour.is_settled()
    }

    /// Aim at `hotspot` and click it. Returns false when it is not in the
    /// current scene.
    pub async fn click_hotspot(&mut self, hotspot: HotspotId, dt: f32) -> bool {
        if !self.tour.aim_at_hotspot(hotspot) {
            return false;
        }
        let input = FrameInput {
            dt,
            pointer: vec![PointerEvent::Down(Vec2::ZERO)],
            ..FrameInput::default()
        };
        self.run_frame(input).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use tour_backend::{BackendError, FixtureBackend, HotspotRecord, SceneRecord, TourFixture};

    use super::*;
    use crate::testing::{hotspot_record, png_bytes, scene_record};
    use crate::xr::{SimulatedHeadset, XrPhase};

    const DT: f32 = 1.0 / 60.0;

    fn backend(with_textures: bool) -> FixtureBackend {
        let mut hotspot_28 = hotspot_record(1, 28, Some(31));
        hotspot_28.yaw = Some(250.0);
        let mut backend = FixtureBackend::new(TourFixture {
            scenes: vec![scene_record(28, 30.0), scene_record(31, 90.0), scene_record(40, 0.0)],
            hotspots: vec![
                hotspot_28,
                hotspot_record(2, 31, Some(28)),
                hotspot_record(3, 31, Some(40)),
            ],
        });
        if with_textures {
            for url in ["p28.png", "p31.png", "p40.png"] {
                backend = backend.with_asset(url, png_bytes());
            }
        }
        backend
    }

    async fn driver(with_textures: bool) -> TourDriver<FixtureBackend> {
        TourDriver::boot(SceneLoader::new(backend(with_textures)), 28, TourSettings::default())
            .await
            .unwrap()
    }

    fn yaw_of(tour: &Tour) -> f32 {
        crate::scene::normalize_angle(tour.rig().camera.euler().0)
    }

    #[tokio::test]
    async fn start_applies_scene_default_yaw() {
        let driver = driver(true).await;
        let tour = driver.tour();
        assert_eq!(tour.current_scene_id(), 28);
        assert!((yaw_of(tour) - 30.0_f32.to_radians()).abs() < 1e-4);
        assert!(tour.node().panorama.texture.is_some());
        assert!(tour.is_settled());
    }

    #[tokio::test]
    async fn missing_start_scene_is_fatal() {
        let err = TourDriver::boot(SceneLoader::new(backend(true)), 99, TourSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TourError::Startup { id: 99, .. }));
    }

    #[tokio::test]
    async fn uncached_target_is_fetched_before_the_fade_starts() {
        let mut driver = driver(true).await;
        assert!(!driver.tour().context().scenes.contains(31));

        let request = TransitionRequest {
            target: 31,
            arrival: Arrival {
                from_scene: 28,
                hotspot: Some(1),
            },
        };
        driver.tour_mut().request_transition(request);
        assert!(driver.tour().fade().is_idle());

        assert!(driver.settle(DT, 600).await);
        assert_eq!(driver.tour().current_scene_id(), 31);
        assert!((yaw_of(driver.tour()) - 250.0_f32.to_radians()).abs() < 1e-4);
    }

    #[tokio::test]
    async fn screen_stays_black_until_the_panorama_resolves() {
        let mut driver = driver(false).await;
        driver.prefetch().await;
        driver.tour_mut().request_transition(TransitionRequest {
            target: 31,
            arrival: Arrival {
                from_scene: 28,
                hotspot: None,
            },
        });

        // Drive the tour by hand so the texture request is not served.
        let mut requests = Vec::new();
        for _ in 0..120 {
            requests.extend(driver.tour_mut().frame(FrameInput::idle(DT)));
        }
        assert_eq!(requests, vec![AssetRequest::Texture("p31.png".into())]);
        assert_eq!(driver.tour().current_scene_id(), 28);
        assert_eq!(driver.tour().fade().opacity(), 1.0);

        driver.tour_mut().mark_texture_failed("p31.png");
        driver.tour_mut().frame(FrameInput::idle(DT));
        assert_eq!(driver.tour().current_scene_id(), 31);
        assert!(driver.tour().node().panorama.texture.is_none());
    }

    #[tokio::test]
    async fn failed_target_fetch_keeps_current_scene() {
        let mut driver = driver(true).await;
        driver.tour_mut().request_transition(TransitionRequest {
            target: 77,
            arrival: Arrival {
                from_scene: 28,
                hotspot: None,
            },
        });
        assert!(driver.settle(DT, 10).await);
        assert_eq!(driver.tour().current_scene_id(), 28);
        assert_eq!(driver.tour().history(), &[28]);
    }

    #[tokio::test]
    async fn xr_session_swaps_sink_and_gives_up_on_controllers() {
        let mut driver = driver(true).await;
        driver
            .tour_mut()
            .on_session_start(&mut SimulatedHeadset::default(), Duration::ZERO);
        assert_eq!(driver.tour().sink_label(), "group");
        assert!(!driver.tour().rig().orbit.enabled);

        let frame = XrFrame {
            head_position: Vec3::new(0.0, 1.8, 0.0),
            head_rotation: Quat::IDENTITY,
            ..XrFrame::default()
        };
        for _ in 0..50 {
            driver
                .run_frame(FrameInput {
                    dt: 0.5,
                    xr: Some(frame.clone()),
                    ..FrameInput::default()
                })
                .await;
        }
        let tour = driver.tour();
        assert_eq!(tour.xr().phase(), XrPhase::HeadLookOnly);
        assert!((tour.rig().camera.position.y - EYE_HEIGHT).abs() < 1e-4);

        driver.tour_mut().on_session_end();
        let tour = driver.tour();
        assert_eq!(tour.sink_label(), "camera");
        assert!(tour.rig().orbit.enabled);
        assert_eq!(tour.rig().root.rotation, Quat::IDENTITY);
        assert!((yaw_of(tour) - 30.0_f32.to_radians()).abs() < 1e-4);
    }

    #[tokio::test]
    async fn gyro_mode_resets_its_yaw_instead_of_aligning() {
        let mut driver = driver(true).await;
        driver.prefetch().await;
        driver.tour_mut().set_gyro(true);
        driver
            .run_frame(FrameInput {
                dt: DT,
                gyro: Some((1.0, std::f32::consts::FRAC_PI_2)),
                ..FrameInput::default()
            })
            .await;
        assert!(driver.tour().rig().gyro.yaw().abs() > 0.5);

        driver.tour_mut().request_transition(TransitionRequest {
            target: 31,
            arrival: Arrival {
                from_scene: 28,
                hotspot: Some(1),
            },
        });
        assert!(driver.settle(DT, 600).await);
        assert_eq!(driver.tour().current_scene_id(), 31);
        assert_eq!(driver.tour().rig().gyro.yaw(), 0.0);
    }
    /// Serves `inner`, except that the `stalled` panorama never arrives.
    #[derive(Debug)]
    struct StalledPanorama {
        inner: FixtureBackend,
        stalled: &'static str,
    }

    impl Backend for StalledPanorama {
        async fn fetch_scene(&self, id: SceneId) -> Result<SceneRecord, BackendError> {
            self.inner.fetch_scene(id).await
        }

        async fn fetch_hotspots(&self, scene: SceneId) -> Result<Vec<HotspotRecord>, BackendError> {
            self.inner.fetch_hotspots(scene).await
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, BackendError> {
            if url == self.stalled {
                return futures::future::pending().await;
            }
            self.inner.fetch_bytes(url).await
        }
    }

    #[tokio::test]
    async fn navigation_completes_while_the_background_sweep_is_stalled() {
        let backend = StalledPanorama {
            inner: backend(true),
            stalled: "p40.png",
        };
        let mut driver = TourDriver::boot(SceneLoader::new(backend), 28, TourSettings::default())
            .await
            .unwrap();
        driver.start_prefetch();
        for _ in 0..10 {
            driver.run_frame(FrameInput::idle(DT)).await;
        }
        assert!(driver.prefetcher().unwrap().is_sweeping());
        assert!(driver.tour().context().scenes.contains(40));
        assert!(!driver.tour().context().textures.contains("p31.png"));

        assert!(driver.click_hotspot(1, DT).await);
        assert!(driver.settle(DT, 600).await);

        assert_eq!(driver.tour().current_scene_id(), 31);
        assert!(driver.tour().node().panorama.texture.is_some());
        assert!(!driver.prefetcher().unwrap().is_done());
    }

    #[tokio::test]
    async fn failed_panorama_is_retried_on_the_next_visit() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = TourFixture {
            scenes: vec![scene_record(28, 30.0), scene_record(31, 90.0)],
            hotspots: vec![hotspot_record(1, 28, Some(31)), hotspot_record(2, 31, Some(28))],
        };
        let path = dir.path().join("tour.json");
        std::fs::write(&path, serde_json::to_vec(&fixture).unwrap()).unwrap();
        std::fs::write(dir.path().join("p28.png"), png_bytes()).unwrap();
        let backend = FixtureBackend::from_path(&path).unwrap();
        let mut driver = TourDriver::boot(SceneLoader::new(backend), 28, TourSettings::default())
            .await
            .unwrap();
        driver.prefetch().await;

        let go = |target: SceneId, from_scene: SceneId| TransitionRequest {
            target,
            arrival: Arrival {
                from_scene,
                hotspot: None,
            },
        };
        driver.tour_mut().request_transition(go(31, 28));
        assert!(driver.settle(DT, 600).await);
        assert_eq!(driver.tour().current_scene_id(), 31);
        assert!(driver.tour().node().panorama.texture.is_none());

        std::fs::write(dir.path().join("p31.png"), png_bytes()).unwrap();
        driver.tour_mut().request_transition(go(28, 31));
        assert!(driver.settle(DT, 600).await);
        driver.tour_mut().request_transition(go(31, 28));
        assert!(driver.settle(DT, 600).await);

        assert_eq!(driver.tour().current_scene_id(), 31);
        assert!(driver.tour().node().panorama.texture.is_some());
        // One failure from the sweep, one from the first visit, then success.
        assert_eq!(driver.loader().backend().asset_fetches("p31.png"), 3);
    }

    #[tokio::test]
    async fn trigger_is_ignored_for_sources_without_a_gamepad() {
        let mut driver = driver(true).await;
        driver.prefetch().await;
        driver.tour_mut().on_session_start(
            &mut SimulatedHeadset {
                floor_supported: true,
            },
            Duration::ZERO,
        );
        let tour = driver.tour();
        let target = tour
            .rig()
            .root
            .to_world(tour.node().billboard(1).unwrap().position);
        let frame = |has_gamepad: bool| XrFrame {
            head_position: Vec3::new(0.0, 1.6, 0.0),
            head_rotation: Quat::IDENTITY,
            input_sources: vec![InputSource {
                index: 0,
                has_gamepad,
            }],
            controllers: vec![ControllerFrame {
                index: 0,
                position: Vec3::ZERO,
                rotation: Quat::from_rotation_arc(Vec3::NEG_Z, target.normalize()),
                trigger_pressed: Some(true),
            }],
            events: Vec::new(),
        };

        let input = |has_gamepad| FrameInput {
            dt: DT,
            xr: Some(frame(has_gamepad)),
            ..FrameInput::default()
        };
        driver.run_frame(input(false)).await;
        assert_eq!(driver.tour().xr().bound_controllers(), &[0]);
        assert!(driver.tour().is_settled());

        driver.run_frame(input(true)).await;
        assert!(driver.settle(DT, 600).await);
        assert_eq!(driver.tour().current_scene_id(), 31);
    }
}
