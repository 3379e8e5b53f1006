//! Orchestration layer of the panorama tour viewer: scene loading and
//! prefetch, entry orientation, hotspot picking, XR session handling, the
//! fade gate around scene swaps, and ambient audio.

pub mod audio;
pub mod cache;
pub mod camera;
pub mod cli;
pub mod fade;
pub mod interaction;
pub mod label;
pub mod loader;
pub mod scene;
pub mod tour;
pub mod visit_log;
pub mod xr;

pub use loader::SceneLoader;
pub use tour::{Tour, TourDriver, TourError, TourSettings};
