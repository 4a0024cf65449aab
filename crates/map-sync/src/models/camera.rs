use serde::{Deserialize, Serialize};

use super::record::GeoPoint;

/// Camera state read from the rendering surface.
///
/// Read on demand and never cached beyond a single operation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub center: GeoPoint,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
}

/// Target of a camera motion. Unset fields keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraOptions {
    pub center: Option<GeoPoint>,
    pub zoom: Option<f64>,
    pub bearing: Option<f64>,
    pub pitch: Option<f64>,
}

impl CameraOptions {
    pub fn centered(center: GeoPoint) -> Self {
        Self {
            center: Some(center),
            ..Self::default()
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }
}

/// Screen-space margins, in logical pixels, kept clear when framing bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeInsets {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl EdgeInsets {
    pub fn uniform(inset: f64) -> Self {
        Self {
            top: inset,
            left: inset,
            bottom: inset,
            right: inset,
        }
    }
}

impl Default for EdgeInsets {
    fn default() -> Self {
        Self::uniform(48.0)
    }
}
