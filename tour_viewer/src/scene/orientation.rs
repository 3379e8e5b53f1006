//! Entry orientation for a scene the viewer has just arrived in.
//!
//! A scene carries a default yaw/pitch/roll; arriving through a specific
//! hotspot lets that hotspot override the facing. The result is applied in
//! intrinsic yaw→pitch→roll (`YXZ`) order, either to the camera (flat view)
//! or to the scene's root group (XR, where the camera pose belongs to the
//! headset).

use glam::{EulerRot, Quat, Vec3};

use super::{EulerAngles, Hotspot, HotspotId, Scene, SceneId, normalize_angle};
use crate::camera::ViewRig;

/// How the viewer reached the scene being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    pub from_scene: SceneId,
    pub hotspot: Option<HotspotId>,
}

/// Find the hotspot in `from` that led to `to`. An explicit hotspot id wins;
/// otherwise the first hotspot targeting `to` is used.
pub fn arrival_hotspot(from: &Scene, to: SceneId, hotspot: Option<HotspotId>) -> Option<&Hotspot> {
    if let Some(id) = hotspot {
        if let Some(found) = from.hotspot(id).filter(|h| h.target == Some(to)) {
            return Some(found);
        }
    }
    from.hotspots.iter().find(|h| h.target == Some(to))
}

/// Yaw that looks towards `position` from the origin, in `[0, 2π)`.
pub fn yaw_towards(position: Vec3) -> f32 {
    normalize_angle(position.x.atan2(position.z))
}

/// Orientation for entering `scene`, optionally through `via`.
pub fn entry_orientation(scene: &Scene, via: Option<&Hotspot>) -> EulerAngles {
    let mut angles = scene.entry;
    let Some(hotspot) = via else {
        return angles;
    };

    if let Some(pitch) = hotspot.entry.pitch {
        angles.pitch = pitch;
    }
    if let Some(roll) = hotspot.entry.roll {
        angles.roll = roll;
    }
    if let Some(yaw) = hotspot.entry.yaw {
        angles.yaw = yaw;
    } else if let Some(position) = hotspot.stored_position {
        angles.yaw = yaw_towards(position);
    }
    angles
}

pub fn quat_from_entry(angles: EulerAngles) -> Quat {
    Quat::from_euler(EulerRot::YXZ, angles.yaw, angles.pitch, angles.roll)
}

/// Where an entry orientation lands. Chosen once per session-mode change.
pub trait OrientationSink: std::fmt::Debug {
    fn apply(&self, rig: &mut ViewRig, angles: EulerAngles);

    fn label(&self) -> &'static str;
}

/// Flat view: rotate the camera itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraSink;

impl OrientationSink for CameraSink {
    fn apply(&self, rig: &mut ViewRig, angles: EulerAngles) {
        // Orbit input is suspended so a drag in flight cannot fight the new pose.
        let was_enabled = rig.orbit.enabled;
        rig.orbit.enabled = false;
        rig.camera.rotation = quat_from_entry(angles);
        rig.root.rotation = Quat::IDENTITY;
        rig.orbit.sync_from(&rig.camera);
        rig.orbit.enabled = was_enabled;
    }

    fn label(&self) -> &'static str {
        "camera"
    }
}

/// XR view: the headset owns the camera, so the world is turned the other
/// way instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupSink;

impl OrientationSink for GroupSink {
    fn apply(&self, rig: &mut ViewRig, angles: EulerAngles) {
        rig.root.rotation = quat_from_entry(angles).inverse();
    }

    fn label(&self) -> &'static str {
        "group"
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use super::*;
    use crate::scene::EntryOverride;

    const EPSILON: f32 = 1e-5;

    fn scene(id: SceneId, yaw_deg: f64) -> Scene {
        Scene {
            id,
            panorama_url: format!("p{id}.jpg"),
            entry: EulerAngles::from_degrees(yaw_deg, 5.0, 0.0),
            capture_height: None,
            hotspots: Vec::new(),
        }
    }

    fn hotspot(entry: EntryOverride, stored_position: Option<Vec3>) -> Hotspot {
        Hotspot {
            id: 7,
            label: "Atrium".into(),
            target: Some(31),
            stored_position,
            position: stored_position.unwrap_or(Vec3::Z),
            entry,
        }
    }

    #[test]
    fn scene_defaults_apply_without_hotspot() {
        let angles = entry_orientation(&scene(28, 90.0), None);
        assert!((angles.yaw - FRAC_PI_2).abs() < EPSILON);
        assert!((angles.pitch - 5.0_f32.to_radians()).abs() < EPSILON);
    }

    #[test]
    fn hotspot_override_replaces_yaw_pitch_and_roll() {
        let via = hotspot(
            EntryOverride {
                yaw: Some(200.0_f64.to_radians() as f32),
                pitch: Some((-12.0_f64).to_radians() as f32),
                roll: Some(1.0_f64.to_radians() as f32),
            },
            Some(Vec3::new(1.0, 0.0, 0.0)),
        );
        let angles = entry_orientation(&scene(31, 45.0), Some(&via));
        assert!((angles.yaw - 200.0_f32.to_radians()).abs() < EPSILON);
        assert!((angles.pitch + 12.0_f32.to_radians()).abs() < EPSILON);
        assert!((angles.roll - 1.0_f32.to_radians()).abs() < EPSILON);
    }

    #[test]
    fn yaw_falls_back_to_stored_position() {
        let via = hotspot(EntryOverride::default(), Some(Vec3::new(-1.0, 0.3, 0.0)));
        let angles = entry_orientation(&scene(31, 45.0), Some(&via));
        assert!((angles.yaw - 1.5 * PI).abs() < EPSILON);
        // Pitch keeps the scene default when the hotspot stores none.
        assert!((angles.pitch - 5.0_f32.to_radians()).abs() < EPSILON);
    }

    #[test]
    fn missing_override_and_position_keep_scene_yaw() {
        let via = hotspot(EntryOverride::default(), None);
        let angles = entry_orientation(&scene(31, 45.0), Some(&via));
        assert!((angles.yaw - 45.0_f32.to_radians()).abs() < EPSILON);
    }

    #[test]
    fn arrival_prefers_explicit_hotspot_targeting_destination() {
        let mut from = scene(28, 0.0);
        let mut first = hotspot(EntryOverride::default(), None);
        first.id = 1;
        let mut second = first.clone();
        second.id = 2;
        let mut elsewhere = first.clone();
        elsewhere.id = 3;
        elsewhere.target = Some(40);
        from.hotspots = vec![first, second, elsewhere];

        assert_eq!(arrival_hotspot(&from, 31, Some(2)).map(|h| h.id), Some(2));
        assert_eq!(arrival_hotspot(&from, 31, None).map(|h| h.id), Some(1));
        assert_eq!(arrival_hotspot(&from, 31, Some(3)).map(|h| h.id), Some(1));
        assert!(arrival_hotspot(&from, 99, None).is_none());
    }

    #[test]
    fn camera_sink_rotates_camera_and_resyncs_orbit() {
        let mut rig = ViewRig::default();
        let angles = EulerAngles::new(1.0, 0.2, 0.0);
        CameraSink.apply(&mut rig, angles);

        let (yaw, pitch, _) = rig.camera.euler();
        assert!((yaw - 1.0).abs() < EPSILON);
        assert!((pitch - 0.2).abs() < EPSILON);
        assert!(rig.orbit.enabled);
        let (orbit_yaw, orbit_pitch) = rig.orbit.angles();
        assert!((orbit_yaw - 1.0).abs() < EPSILON);
        assert!((orbit_pitch - 0.2).abs() < EPSILON);
    }

    #[test]
    fn group_sink_leaves_camera_alone() {
        let mut rig = ViewRig::default();
        GroupSink.apply(&mut rig, EulerAngles::new(FRAC_PI_2, 0.0, 0.0));
        assert_eq!(rig.camera.rotation, Quat::IDENTITY);
        assert!(rig.root.rotation.angle_between(Quat::from_rotation_y(-FRAC_PI_2)) < 1e-3);

        // The billboard straight ahead of the entry yaw ends up in front of the headset.
        let ahead = Quat::from_rotation_y(FRAC_PI_2) * Vec3::NEG_Z;
        let world = rig.root.rotation * ahead;
        assert!((world - Vec3::NEG_Z).length() < EPSILON);
    }

    #[test]
    fn group_sink_applies_pitch_and_roll_too() {
        let angles = EulerAngles::new(FRAC_PI_2, 0.3, 0.1);
        let mut rig = ViewRig::default();
        GroupSink.apply(&mut rig, angles);

        // What the flat camera would look at is straight ahead of the headset.
        let mut flat = ViewRig::default();
        CameraSink.apply(&mut flat, angles);
        let looked_at = flat.camera.rotation * Vec3::NEG_Z;
        assert!((looked_at.y - 0.3_f32.sin()).abs() < EPSILON);
        assert!((rig.root.rotation * looked_at - Vec3::NEG_Z).length() < EPSILON);

        let up = flat.camera.rotation * Vec3::Y;
        assert!((rig.root.rotation * up - Vec3::Y).length() < EPSILON);
    }
}
