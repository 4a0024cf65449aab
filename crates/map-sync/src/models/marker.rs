use std::sync::Arc;

use serde_json::{Map, Value};

use super::record::GeoPoint;
use super::types::ComplaintId;

/// Icon bitmap used for every complaint marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconImage {
    /// Name the rendering surface registers the image under.
    pub name: String,
    /// Encoded image bytes (PNG).
    pub bytes: Vec<u8>,
}

impl IconImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Renderable description of one marker, produced 1:1 from a valid record.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDescriptor {
    pub complaint_id: ComplaintId,
    pub location: GeoPoint,
    /// Icon scale the annotation is created with.
    pub icon_size: f64,
    pub icon: Arc<IconImage>,
    /// Category, status and other record fields, passed through for rendering.
    pub payload: Map<String, Value>,
}
