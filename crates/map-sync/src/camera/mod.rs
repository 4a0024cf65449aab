//! Camera commands: zoom, rotate, pitch tiers, fit-to-bounds and the
//! two-stage fly-to-target motion.

mod controller;
pub mod motion;

pub use controller::CameraController;
