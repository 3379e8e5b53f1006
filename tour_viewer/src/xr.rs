//! XR session lifecycle: controller discovery, reference space selection and
//! eye-height normalisation.
//!
//! Input sources can attach well after the session starts, so discovery is a
//! bounded poll driven from the frame loop rather than a one-shot query.

use std::time::Duration;

use thiserror::Error;

pub const EYE_HEIGHT: f32 = 1.6;
pub const CONTROLLER_ATTEMPTS: u32 = 40;
pub const CONTROLLER_INTERVAL: Duration = Duration::from_millis(500);

/// Controllers bound per session.
const MAX_BOUND: usize = crate::interaction::MAX_CONTROLLERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSpaceKind {
    LocalFloor,
    Local,
}

#[derive(Debug, Error)]
pub enum XrError {
    #[error("reference space {0:?} is not supported by this device")]
    Unsupported(ReferenceSpaceKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSource {
    pub index: usize,
    pub has_gamepad: bool,
}

/// The slice of the XR device API the session manager needs.
pub trait XrDevice {
    fn request_reference_space(&mut self, kind: ReferenceSpaceKind) -> Result<(), XrError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceSpace {
    pub kind: ReferenceSpaceKind,
    /// Vertical offset applied on top of the device's origin, in metres.
    pub offset_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrPhase {
    NotPresenting,
    DiscoveringControllers,
    ControllersBound,
    /// Discovery budget exhausted with no controller: gaze only.
    HeadLookOnly,
}

/// Who drives the camera pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOwner {
    Desktop,
    Xr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: CONTROLLER_ATTEMPTS,
            interval: CONTROLLER_INTERVAL,
        }
    }
}

#[derive(Debug)]
pub struct XrSessionManager {
    phase: XrPhase,
    owner: ControlOwner,
    policy: RetryPolicy,
    eye_height: f32,
    attempts: u32,
    next_attempt: Duration,
    bound: Vec<usize>,
    reference: Option<ReferenceSpace>,
    height_corrected: bool,
}

impl Default for XrSessionManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), EYE_HEIGHT)
    }
}

impl XrSessionManager {
    pub fn new(policy: RetryPolicy, eye_height: f32) -> Self {
        Self {
            phase: XrPhase::NotPresenting,
            owner: ControlOwner::Desktop,
            policy,
            eye_height,
            attempts: 0,
            next_attempt: Duration::ZERO,
            bound: Vec::new(),
            reference: None,
            height_corrected: false,
        }
    }

    pub fn phase(&self) -> XrPhase {
        self.phase
    }

    pub fn owner(&self) -> ControlOwner {
        self.owner
    }

    pub fn is_presenting(&self) -> bool {
        self.phase != XrPhase::NotPresenting
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn bound_controllers(&self) -> &[usize] {
        &self.bound
    }

    pub fn reference_space(&self) -> Option<ReferenceSpace> {
        self.reference
    }

    pub fn eye_height(&self) -> f32 {
        self.eye_height
    }

    /// Enter the session: take over the camera, pick a reference space and
    /// arm controller discovery. `now` is the frame clock.
    pub fn on_session_start(&mut self, device: &mut dyn XrDevice, now: Duration) -> ReferenceSpace {
        let reference = match device.request_reference_space(ReferenceSpaceKind::LocalFloor) {
            Ok(()) => ReferenceSpace {
                kind: ReferenceSpaceKind::LocalFloor,
                offset_y: 0.0,
            },
            Err(err) => {
                log::info!("{err}; falling back to local space with manual eye offset");
                if let Err(err) = device.request_reference_space(ReferenceSpaceKind::Local) {
                    log::warn!("local reference space also unavailable: {err}");
                }
                ReferenceSpace {
                    kind: ReferenceSpaceKind::Local,
                    offset_y: self.eye_height,
                }
            }
        };

        self.phase = XrPhase::DiscoveringControllers;
        self.owner = ControlOwner::Xr;
        self.attempts = 0;
        self.next_attempt = now;
        self.bound.clear();
        self.reference = Some(reference);
        self.height_corrected = false;
        log::info!("xr session started ({:?} reference space)", reference.kind);
        reference
    }

    /// Poll input sources when an attempt is due. Returns controller indices
    /// bound by this call.
    pub fn poll_controllers(&mut self, sources: &[InputSource], now: Duration) -> Vec<usize> {
        if self.phase != XrPhase::DiscoveringControllers || now < self.next_attempt {
            return Vec::new();
        }
        self.attempts += 1;

        let mut newly_bound = Vec::new();
        for source in sources {
            if self.bound.len() >= MAX_BOUND {
                break;
            }
            if !self.bound.contains(&source.index) {
                self.bound.push(source.index);
                newly_bound.push(source.index);
                log::info!(
                    "bound controller {} on attempt {}",
                    source.index,
                    self.attempts
                );
            }
        }

        if self.bound.len() >= MAX_BOUND {
            self.phase = XrPhase::ControllersBound;
        } else if self.attempts >= self.policy.attempts {
            if self.bound.is_empty() {
                log::warn!(
                    "no controllers after {} attempts; continuing with head-look only",
                    self.attempts
                );
                self.phase = XrPhase::HeadLookOnly;
            } else {
                self.phase = XrPhase::ControllersBound;
            }
        } else {
            self.next_attempt = now + self.policy.interval;
        }
        newly_bound
    }

    /// First-frame height measurement. `measured` is the viewer's height in
    /// the current reference space including the present offset. Applied once
    /// per session; returns the resulting offset.
    pub fn normalize_eye_height(&mut self, measured: f32) -> Option<f32> {
        if self.height_corrected {
            return None;
        }
        let reference = self.reference.as_mut()?;
        reference.offset_y += self.eye_height - measured;
        self.height_corrected = true;
        log::debug!(
            "eye height normalised: measured {measured:.3} m, offset now {:.3} m",
            reference.offset_y
        );
        Some(reference.offset_y)
    }

    pub fn height_corrected(&self) -> bool {
        self.height_corrected
    }

    pub fn on_session_end(&mut self) {
        self.phase = XrPhase::NotPresenting;
        self.owner = ControlOwner::Desktop;
        self.bound.clear();
        self.reference = None;
        self.height_corrected = false;
        log::info!("xr session ended");
    }
}

/// Stand-in headset for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedHeadset {
    pub floor_supported: bool,
}

impl XrDevice for SimulatedHeadset {
    fn request_reference_space(&mut self, kind: ReferenceSpaceKind) -> Result<(), XrError> {
        match kind {
            ReferenceSpaceKind::LocalFloor if !self.floor_supported => Err(XrError::Unsupported(kind)),
            _ => Ok(()),
        }
    }
}
