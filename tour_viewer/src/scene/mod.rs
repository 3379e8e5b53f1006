//! Runtime scene model. Backend rows arrive with angles in degrees; they are
//! converted once here so everything downstream works in radians. Scenes are
//! immutable after construction and shared through `Arc`.

mod node;
pub mod orientation;

use std::f32::consts::TAU;

use glam::Vec3;
use tour_backend::{HotspotRecord, SceneRecord};

pub use node::{ActiveSceneNode, HotspotBillboard, PanoramaSphere};
pub use tour_backend::{HotspotId, SceneId};

/// Distance from the viewer at which hotspots without a stored position are placed.
pub const HOTSPOT_DISTANCE: f32 = 10.0;

/// Yaw/pitch/roll in radians, applied in intrinsic YXZ order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl EulerAngles {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }

    pub fn from_degrees(yaw: f64, pitch: f64, roll: f64) -> Self {
        Self {
            yaw: deg_to_rad(yaw),
            pitch: deg_to_rad(pitch),
            roll: deg_to_rad(roll),
        }
    }
}

/// Per-hotspot override for the destination scene's entry orientation.
/// Components the backend left empty stay `None` and fall through to the
/// destination scene's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntryOverride {
    pub yaw: Option<f32>,
    pub pitch: Option<f32>,
    pub roll: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub id: HotspotId,
    pub label: String,
    pub target: Option<SceneId>,
    /// Position exactly as stored by the backend.
    pub stored_position: Option<Vec3>,
    /// Stored position, or the computed fallback when none is stored.
    pub position: Vec3,
    pub entry: EntryOverride,
}

impl Hotspot {
    fn from_record(record: &HotspotRecord, index: usize, count: usize) -> Self {
        let entry = EntryOverride {
            yaw: record.yaw.map(deg_to_rad),
            pitch: record.pitch.map(deg_to_rad),
            roll: record.roll.map(deg_to_rad),
        };
        let stored_position = record
            .position()
            .map(|[x, y, z]| Vec3::new(x as f32, y as f32, z as f32));
        let position = stored_position.unwrap_or_else(|| fallback_position(&entry, index, count));

        Self {
            id: record.id,
            label: record.label.clone(),
            target: record.target_scene_id,
            stored_position,
            position,
            entry,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.target.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: SceneId,
    pub panorama_url: String,
    pub entry: EulerAngles,
    /// Capture rig height in metres, when the backend recorded one.
    pub capture_height: Option<f32>,
    pub hotspots: Vec<Hotspot>,
}

impl Scene {
    pub fn from_records(record: &SceneRecord, hotspots: &[HotspotRecord]) -> Self {
        let count = hotspots.len();
        Self {
            id: record.id,
            panorama_url: record.panorama_url.clone(),
            entry: EulerAngles::from_degrees(record.yaw, record.pitch, record.roll),
            capture_height: record.height.map(|h| h as f32),
            hotspots: hotspots
                .iter()
                .enumerate()
                .map(|(index, hotspot)| Hotspot::from_record(hotspot, index, count))
                .collect(),
        }
    }

    pub fn hotspot(&self, id: HotspotId) -> Option<&Hotspot> {
        self.hotspots.iter().find(|hotspot| hotspot.id == id)
    }

    /// Distinct destination scenes, in hotspot order.
    pub fn targets(&self) -> Vec<SceneId> {
        let mut out: Vec<SceneId> = Vec::new();
        for target in self.hotspots.iter().filter_map(|hotspot| hotspot.target) {
            if !out.contains(&target) {
                out.push(target);
            }
        }
        out
    }
}

pub fn deg_to_rad(degrees: f64) -> f32 {
    degrees.to_radians() as f32
}

/// Wrap an angle into `[0, 2π)`.
pub fn normalize_angle(radians: f32) -> f32 {
    let wrapped = radians.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU { 0.0 } else { wrapped }
}

fn fallback_position(entry: &EntryOverride, index: usize, count: usize) -> Vec3 {
    let yaw = entry
        .yaw
        .unwrap_or_else(|| TAU * index as f32 / count.max(1) as f32);
    let pitch = entry.pitch.unwrap_or(0.0);
    Vec3::new(
        yaw.sin() * pitch.cos(),
        pitch.sin(),
        yaw.cos() * pitch.cos(),
    ) * HOTSPOT_DISTANCE
}
