//! Map sync models
//!
//! This module contains the core data types for the marker pipeline:
//! - `types` - Identifier aliases and the opaque annotation handle
//! - `record` - Raw complaint rows and the validated `ComplaintRecord`
//! - `marker` - Renderable marker descriptors and icon images
//! - `camera` - Camera state, camera targets and edge insets
//! - `connection` - Live-feed connection state machine states

mod camera;
mod connection;
mod marker;
mod record;
mod types;

pub use camera::{CameraOptions, CameraState, EdgeInsets};
pub use connection::ConnectionState;
pub use marker::{IconImage, MarkerDescriptor};
pub use record::{
    ComplaintRecord, CoordinateValue, GeoPoint, RawComplaintRecord, RawRecordId, RecordRejection,
};
pub use types::{AnnotationHandle, ComplaintId};
