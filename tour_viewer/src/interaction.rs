//! Pointer and controller picking against hotspot billboards.
//!
//! Rays are only ever tested against billboards; the panorama sphere
//! surrounds the viewer and would swallow every hit.

use glam::{Quat, Vec2, Vec3};

use crate::camera::{Camera, SceneRoot};
use crate::scene::orientation::Arrival;
use crate::scene::{ActiveSceneNode, HotspotId, SceneId};

/// Laser length when a controller points at nothing.
pub const LASER_LENGTH: f32 = 10.0;

pub const MAX_CONTROLLERS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Nearest positive distance along `ray` to a sphere, if any.
pub fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let near = -b - root;
    if near > 0.0 {
        return Some(near);
    }
    let far = -b + root;
    (far > 0.0).then_some(far)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillboardHit {
    pub hotspot: HotspotId,
    pub target: Option<SceneId>,
    pub distance: f32,
    pub point: Vec3,
}

/// Closest billboard of `node` hit by `ray`.
pub fn raycast_billboards(ray: &Ray, node: &ActiveSceneNode, root: &SceneRoot) -> Option<BillboardHit> {
    node.billboards
        .iter()
        .filter_map(|billboard| {
            let center = root.to_world(billboard.position);
            ray_sphere(ray, center, billboard.radius).map(|distance| BillboardHit {
                hotspot: billboard.hotspot,
                target: billboard.target,
                distance,
                point: ray.at(distance),
            })
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// A hit turned into a scene-switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRequest {
    pub target: SceneId,
    pub arrival: Arrival,
}

impl TransitionRequest {
    fn from_hit(hit: &BillboardHit, current: SceneId) -> Option<Self> {
        // Leaf hotspots have nowhere to go.
        let target = hit.target?;
        Some(Self {
            target,
            arrival: Arrival {
                from_scene: current,
                hotspot: Some(hit.hotspot),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectEvent {
    SelectStart,
    Select,
}

/// Per-frame controller pose and gamepad reading.
#[derive(Debug, Clone, Copy)]
pub struct ControllerFrame {
    pub index: usize,
    pub position: Vec3,
    pub rotation: Quat,
    /// Button 0 state, when the input source exposes a gamepad.
    pub trigger_pressed: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    pub index: usize,
    pub laser_length: f32,
    pub hit: Option<BillboardHit>,
    latched: bool,
    button_was_pressed: bool,
    select_requested: bool,
}

impl ControllerState {
    fn new(index: usize, laser_length: f32) -> Self {
        Self {
            index,
            laser_length,
            hit: None,
            latched: false,
            button_was_pressed: false,
            select_requested: false,
        }
    }

    /// One physical press fires once, whichever of the three paths reports it.
    fn press(&mut self) {
        if !self.latched {
            self.latched = true;
            self.select_requested = true;
        }
    }

    fn handle_event(&mut self, event: SelectEvent) {
        match event {
            SelectEvent::SelectStart => self.press(),
            SelectEvent::Select => {
                self.press();
                self.latched = false;
            }
        }
    }

    fn poll_button(&mut self, pressed: bool) {
        if pressed && !self.button_was_pressed {
            self.press();
        } else if !pressed && self.button_was_pressed {
            self.latched = false;
        }
        self.button_was_pressed = pressed;
    }
}

#[derive(Debug)]
pub struct InteractionController {
    pointer: Vec2,
    laser_length: f32,
    controllers: Vec<ControllerState>,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(LASER_LENGTH)
    }
}

impl InteractionController {
    pub fn new(laser_length: f32) -> Self {
        Self {
            pointer: Vec2::ZERO,
            laser_length,
            controllers: Vec::new(),
        }
    }

    pub fn pointer(&self) -> Vec2 {
        self.pointer
    }

    pub fn pointer_move(&mut self, ndc: Vec2) {
        self.pointer = ndc.clamp(Vec2::splat(-1.0), Vec2::splat(1.0));
    }

    /// Billboard under the last pointer position.
    pub fn pointer_hit(&self, camera: &Camera, node: &ActiveSceneNode, root: &SceneRoot) -> Option<BillboardHit> {
        raycast_billboards(&camera.ray_from_ndc(self.pointer), node, root)
    }

    pub fn pointer_down(
        &mut self,
        ndc: Vec2,
        camera: &Camera,
        node: &ActiveSceneNode,
        root: &SceneRoot,
    ) -> Option<TransitionRequest> {
        self.pointer_move(ndc);
        let hit = self.pointer_hit(camera, node, root)?;
        log::debug!("pointer hit hotspot {} at {:.2} m", hit.hotspot, hit.distance);
        TransitionRequest::from_hit(&hit, node.scene_id())
    }

    /// Start tracking controller `index`. Returns false when already bound or
    /// when both slots are taken.
    pub fn bind_controller(&mut self, index: usize) -> bool {
        if self.controllers.len() >= MAX_CONTROLLERS
            || self.controllers.iter().any(|c| c.index == index)
        {
            return false;
        }
        self.controllers
            .push(ControllerState::new(index, self.laser_length));
        true
    }

    pub fn unbind_all(&mut self) {
        self.controllers.clear();
    }

    pub fn controllers(&self) -> &[ControllerState] {
        &self.controllers
    }

    pub fn controller_event(&mut self, index: usize, event: SelectEvent) {
        if let Some(controller) = self.controllers.iter_mut().find(|c| c.index == index) {
            controller.handle_event(event);
        }
    }

    /// Cast each bound controller's −Z ray, size its laser and collect the
    /// selections made since the previous frame.
    pub fn update_controllers(
        &mut self,
        frames: &[ControllerFrame],
        node: &ActiveSceneNode,
        root: &SceneRoot,
    ) -> Vec<TransitionRequest> {
        let mut requests = Vec::new();
        for controller in &mut self.controllers {
            let Some(frame) = frames.iter().find(|f| f.index == controller.index) else {
                controller.hit = None;
                controller.laser_length = self.laser_length;
                continue;
            };

            if let Some(pressed) = frame.trigger_pressed {
                controller.poll_button(pressed);
            }

            let ray = Ray::new(frame.position, frame.rotation * Vec3::NEG_Z);
            controller.hit = raycast_billboards(&ray, node, root);
            controller.laser_length = controller
                .hit
                .map(|hit| hit.distance)
                .unwrap_or(self.laser_length);

            if std::mem::take(&mut controller.select_requested) {
                if let Some(request) = controller
                    .hit
                    .as_ref()
                    .and_then(|hit| TransitionRequest::from_hit(hit, node.scene_id()))
                {
                    requests.push(request);
                }
            }
        }
        requests
    }

    /// First controller currently pointing at a billboard.
    pub fn controller_hover(&self) -> Option<BillboardHit> {
        self.controllers.iter().find_map(|c| c.hit)
    }
}
