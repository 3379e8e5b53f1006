//! Full-screen black fade that gates every scene swap.
//!
//! A fade-out carries a midpoint payload. When the quad reaches full opacity
//! the payload is handed back from [`FadeController::tick`]; the caller swaps
//! the scene and starts the fade-in. The controller has a single pending slot:
//! a second request before the first midpoint replaces the earlier payload.

pub const FADE_SPEED: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    /// Towards black (opacity 0 → 1).
    Out,
    /// Back to the scene (opacity 1 → 0).
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeState {
    Idle,
    FadingOut,
    FadingIn,
}

#[derive(Debug)]
pub struct FadeController<M> {
    opacity: f32,
    state: FadeState,
    speed: f32,
    pending: Option<M>,
    replaced: usize,
}

impl<M> Default for FadeController<M> {
    fn default() -> Self {
        Self::new(FADE_SPEED)
    }
}

impl<M> FadeController<M> {
    /// `speed` is opacity change per second.
    pub fn new(speed: f32) -> Self {
        Self {
            opacity: 0.0,
            state: FadeState::Idle,
            speed: speed.max(f32::EPSILON),
            pending: None,
            replaced: 0,
        }
    }

    pub fn start(&mut self, direction: FadeDirection, midpoint: Option<M>) {
        self.state = match direction {
            FadeDirection::Out => FadeState::FadingOut,
            FadeDirection::In => FadeState::FadingIn,
        };
        if let Some(payload) = midpoint {
            if self.pending.replace(payload).is_some() {
                // TODO: queue overlapping transitions instead of dropping the earlier one.
                self.replaced += 1;
                log::warn!("fade midpoint replaced before it ran; the earlier transition is dropped");
            }
        }
    }

    /// Advance by `dt` seconds. Returns the midpoint payload on the tick that
    /// reaches full opacity.
    pub fn tick(&mut self, dt: f32) -> Option<M> {
        let step = self.speed * dt.max(0.0);
        match self.state {
            FadeState::Idle => None,
            FadeState::FadingOut => {
                self.opacity = (self.opacity + step).min(1.0);
                if self.opacity >= 1.0 {
                    self.state = FadeState::Idle;
                    return self.pending.take();
                }
                None
            }
            FadeState::FadingIn => {
                self.opacity = (self.opacity - step).max(0.0);
                if self.opacity <= 0.0 {
                    self.state = FadeState::Idle;
                }
                None
            }
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn state(&self) -> FadeState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == FadeState::Idle
    }

    /// Idle with the scene fully visible.
    pub fn is_clear(&self) -> bool {
        self.is_idle() && self.opacity <= 0.0
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// How many midpoint payloads were overwritten by a later request.
    pub fn replaced(&self) -> usize {
        self.replaced
    }
}
