//! Complaint Map Sync Crate
//!
//! This crate keeps a rendering surface's marker annotations in sync with a
//! set of geolocated complaint records, over the lifetime of one map screen.
//!
//! # Overview
//!
//! The engine supports:
//! - Validating raw complaint rows into marker descriptors, off the event loop
//!   for large inputs
//! - Bulk materialization of annotations in bounded batches
//! - Zoom-driven icon resizing with debouncing and a degraded-performance mode
//! - Highlight bounces and two-stage fly-to-target camera motions
//! - A live-feed connection supervised with exponential backoff
//! - A single, ordered disposal path
//!
//! # Architecture
//!
//! ```text
//!  RecordSource        LiveFeed
//!       |                  |
//!       |          +----------------------+
//!       |          | ConnectionSupervisor |  (Idle/Connecting/Connected/Retrying)
//!       |          +----------------------+
//!       v                  v
//! +-------------------------------+      +--------------------+
//! |      MapSyncOrchestrator      | <--- | PerformanceMonitor |  (frame timings)
//! +-------------------------------+      +--------------------+
//!       |            |        |
//!       v            |        v
//! +--------------------+   +------------------+
//! | MarkerDataPreparer |   | CameraController |
//! +--------------------+   +------------------+
//!       |            |        |
//!       v            v        v
//!   +----------------------------+
//!   | AnnotationLifecycleManager |  (id <-> handle maps)
//!   +----------------------------+
//!                 |
//!                 v
//!         RenderingSurface
//! ```
//!
//! # Core Types
//!
//! - [`MapSyncOrchestrator`] - Entry point owning one map session
//! - [`MapEvent`] - Events exposed to the UI layer
//! - [`MarkerDescriptor`] - Renderable form of a validated complaint
//! - [`ConnectionState`] - Live-feed supervisor state
//! - [`MapSyncError`] - Error taxonomy with [`RecoveryAction`] classification
//!
//! Collaborators are injected as trait objects ([`RenderingSurface`],
//! [`RecordSource`], [`LiveFeed`]); in-memory implementations live in
//! [`collaborators::memory`].

pub mod annotations;
pub mod camera;
pub mod collaborators;
pub mod config;
pub mod connection;
pub mod errors;
pub mod liveness;
pub mod models;
pub mod orchestrator;
pub mod performance;
pub mod preparer;

pub use annotations::{AnnotationLifecycleManager, HandleIndex, IconSizing, MaterializeReport};
pub use camera::CameraController;
pub use collaborators::{
    AnnotationUpdate, FeedEvent, FeedSubscription, LiveFeed, RecordSource, RenderingSurface,
    SurfaceEvent,
};
pub use config::{
    AnnotationConfig, BackoffConfig, CameraConfig, HighlightConfig, MapSyncConfig,
    OrchestratorConfig, PerformanceConfig, PreparerConfig, SizingConfig,
};
pub use connection::{BackoffPolicy, ConnectionSupervisor, FeedUpdate};
pub use errors::{MapSyncError, RecoveryAction, Result, SurfaceError};
pub use liveness::Liveness;
pub use models::{
    AnnotationHandle, CameraOptions, CameraState, ComplaintId, ComplaintRecord, ConnectionState,
    CoordinateValue, EdgeInsets, GeoPoint, IconImage, MarkerDescriptor, RawComplaintRecord,
};
pub use orchestrator::{MapEvent, MapEventBus, MapSyncOrchestrator, Navigation, UserNotice};
pub use performance::{ModeReader, PerformanceMode, PerformanceMonitor};
pub use preparer::{prepare_markers, MarkerDataPreparer, PreparationStats, PreparedMarkers};
