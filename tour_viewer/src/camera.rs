//! Camera state and the desktop controls that drive it when no XR session
//! owns the pose.

use std::f32::consts::FRAC_PI_2;

use glam::{EulerRot, Quat, Vec2, Vec3};

use crate::interaction::Ray;

const MAX_ORBIT_PITCH: f32 = 85.0 * std::f32::consts::PI / 180.0;

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_y_radians: f32,
    pub aspect: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y_radians: 75.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
        }
    }
}

impl Camera {
    /// `(yaw, pitch, roll)` of the current rotation in YXZ order.
    pub fn euler(&self) -> (f32, f32, f32) {
        self.rotation.to_euler(EulerRot::YXZ)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Ray through normalized device coordinates (`[-1, 1]`, y up).
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Ray {
        let half_height = (self.fov_y_radians * 0.5).tan();
        let local = Vec3::new(
            ndc.x * half_height * self.aspect,
            ndc.y * half_height,
            -1.0,
        );
        Ray::new(self.position, self.rotation * local)
    }
}

/// Pointer-drag orbit around the viewer's own position.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub enabled: bool,
    yaw: f32,
    pitch: f32,
    /// Radians per pixel of drag.
    pub sensitivity: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            enabled: true,
            yaw: 0.0,
            pitch: 0.0,
            sensitivity: 0.005,
        }
    }
}

impl OrbitControls {
    pub fn drag(&mut self, delta: Vec2, camera: &mut Camera) {
        if !self.enabled {
            return;
        }
        self.yaw += delta.x * self.sensitivity;
        self.pitch = (self.pitch + delta.y * self.sensitivity).clamp(-MAX_ORBIT_PITCH, MAX_ORBIT_PITCH);
        camera.rotation = Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0);
    }

    /// Adopt the camera's current angles so the next drag continues from them.
    pub fn sync_from(&mut self, camera: &Camera) {
        let (yaw, pitch, _) = camera.euler();
        self.yaw = yaw;
        self.pitch = pitch.clamp(-FRAC_PI_2, FRAC_PI_2);
    }

    pub fn angles(&self) -> (f32, f32) {
        (self.yaw, self.pitch)
    }
}

/// Device-orientation (gyroscope) look controls.
///
/// Keeps its own yaw accumulator; on scene change the accumulator is reset
/// so the current physical heading becomes the scene's forward direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct GyroControls {
    pub enabled: bool,
    alpha: f32,
    yaw_offset: f32,
}

impl GyroControls {
    /// Feed a device reading (`alpha` heading, `beta` tilt, in radians).
    pub fn update(&mut self, alpha: f32, beta: f32, camera: &mut Camera) {
        self.alpha = alpha;
        if !self.enabled {
            return;
        }
        let pitch = (beta - FRAC_PI_2).clamp(-FRAC_PI_2, FRAC_PI_2);
        camera.rotation = Quat::from_euler(EulerRot::YXZ, self.yaw(), pitch, 0.0);
    }

    pub fn reset_yaw(&mut self) {
        self.yaw_offset = self.alpha;
    }

    pub fn yaw(&self) -> f32 {
        self.alpha - self.yaw_offset
    }
}

/// Root group that parents the panorama and billboards.
#[derive(Debug, Clone, Copy)]
pub struct SceneRoot {
    pub rotation: Quat,
    pub origin: Vec3,
}

impl Default for SceneRoot {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            origin: Vec3::ZERO,
        }
    }
}

impl SceneRoot {
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.origin + self.rotation * local
    }
}

/// Everything an entry orientation can be applied to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewRig {
    pub camera: Camera,
    pub orbit: OrbitControls,
    pub gyro: GyroControls,
    pub root: SceneRoot,
}
