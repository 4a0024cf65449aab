//! Collaborator trait definitions.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::{MapSyncError, SurfaceError, ABNORMAL_CLOSURE_CODE};
use crate::models::{
    AnnotationHandle, CameraOptions, CameraState, EdgeInsets, GeoPoint, MarkerDescriptor,
    RawComplaintRecord,
};

/// Events raised by the rendering surface.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceEvent {
    /// The map style finished loading.
    StyleLoaded,
    /// The camera moved. Raised continuously during gestures and animations.
    CameraChanged { zoom: f64 },
    /// The user tapped an annotation.
    AnnotationTapped(AnnotationHandle),
    /// A frame was rendered in the given time.
    FrameRendered(Duration),
}

/// New icon size for one live annotation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationUpdate {
    pub handle: AnnotationHandle,
    pub icon_size: f64,
}

/// The external map-rendering surface.
///
/// All methods may fail independently, for example when the surface is
/// disposed while a call is in flight. Batched calls report one result per
/// entry, in input order.
#[async_trait]
pub trait RenderingSurface: Send + Sync {
    /// Resolves once the map style is ready to accept annotations.
    async fn wait_for_style(&self) -> Result<(), SurfaceError>;

    /// Registers the tap, camera and frame-timing listeners.
    async fn attach_listeners(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<SurfaceEvent>, SurfaceError>;

    /// Removes every listener registered by `attach_listeners`.
    async fn detach_listeners(&self);

    async fn camera_state(&self) -> Result<CameraState, SurfaceError>;

    /// Starts a camera animation. Returns when the surface has accepted the call.
    async fn fly_to(&self, target: CameraOptions, duration: Duration) -> Result<(), SurfaceError>;

    /// Computes a camera that frames every point inside the given insets.
    async fn camera_for_bounds(
        &self,
        points: &[GeoPoint],
        insets: EdgeInsets,
    ) -> Result<CameraOptions, SurfaceError>;

    async fn create_annotations(
        &self,
        batch: &[MarkerDescriptor],
    ) -> Vec<Result<AnnotationHandle, SurfaceError>>;

    async fn update_annotations(&self, updates: &[AnnotationUpdate]) -> Vec<Result<(), SurfaceError>>;

    async fn delete_annotations(&self, handles: &[AnnotationHandle]) -> Result<(), SurfaceError>;

    /// Frees every resource held by the surface.
    async fn release(&self);
}

/// Source of the complaint records shown on the map.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches every complaint with non-null coordinates.
    ///
    /// Failures are reported as [`MapSyncError::DataFetch`].
    async fn fetch_records(&self) -> Result<Vec<RawComplaintRecord>, MapSyncError>;
}

/// Event delivered over a live-feed subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    /// The complete current record set.
    Snapshot(Vec<RawComplaintRecord>),
    /// Records changed upstream; the consumer refetches.
    Changed,
    /// The channel closed. Code 1006 marks an abnormal closure.
    Closed { code: Option<u16> },
    /// The channel reported an error.
    Error(String),
}

impl FeedEvent {
    pub fn abnormal_closure() -> Self {
        Self::Closed {
            code: Some(ABNORMAL_CLOSURE_CODE),
        }
    }
}

/// An active live-feed subscription.
pub struct FeedSubscription {
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl FeedSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<FeedEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the feed dropped the subscription.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }
}

/// Subscribe/unsubscribe API of the live data feed.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    async fn subscribe(&self) -> Result<FeedSubscription, MapSyncError>;

    /// Clean unsubscribe. Never triggers a reconnect.
    async fn unsubscribe(&self);
}
