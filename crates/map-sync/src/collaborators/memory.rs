//! In-memory collaborators.
//!
//! These record every call they receive and accept failure injection. The
//! test suites and the simulator binary drive the engine through them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::traits::{
    AnnotationUpdate, FeedEvent, FeedSubscription, LiveFeed, RecordSource, RenderingSurface,
    SurfaceEvent,
};
use crate::errors::{MapSyncError, SurfaceError};
use crate::models::{
    AnnotationHandle, CameraOptions, CameraState, ComplaintId, EdgeInsets, GeoPoint,
    MarkerDescriptor, RawComplaintRecord,
};

/// Lock a mutex, recovering from poison.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("In-memory collaborator mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Number of calls an [`InMemorySurface`] received, by kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceCallCounts {
    pub create_calls: usize,
    pub update_calls: usize,
    pub delete_calls: usize,
    pub camera_moves: usize,
}

/// An annotation currently placed on the in-memory surface.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedAnnotation {
    pub complaint_id: ComplaintId,
    pub location: GeoPoint,
    pub icon_size: f64,
}

#[derive(Debug, Default)]
struct FailurePlan {
    rejected_ids: HashSet<ComplaintId>,
    reject_all_creates: bool,
    camera_fails: bool,
    delete_fails: bool,
    create_latency: Duration,
}

#[derive(Debug)]
struct SurfaceState {
    camera: CameraState,
    annotations: HashMap<AnnotationHandle, PlacedAnnotation>,
    counts: SurfaceCallCounts,
    camera_log: Vec<CameraOptions>,
    animation_log: Vec<Duration>,
    size_log: Vec<(AnnotationHandle, f64)>,
    failures: FailurePlan,
    listener: Option<mpsc::UnboundedSender<SurfaceEvent>>,
    released: bool,
}

/// A rendering surface that keeps annotations and the camera in memory.
pub struct InMemorySurface {
    state: Mutex<SurfaceState>,
    next_handle: AtomicU64,
}

impl InMemorySurface {
    pub fn new(initial_camera: CameraState) -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                camera: initial_camera,
                annotations: HashMap::new(),
                counts: SurfaceCallCounts::default(),
                camera_log: Vec::new(),
                animation_log: Vec::new(),
                size_log: Vec::new(),
                failures: FailurePlan::default(),
                listener: None,
                released: false,
            }),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Reject creation of the annotation for this complaint.
    pub fn reject_complaint(&self, complaint_id: impl Into<ComplaintId>) {
        lock(&self.state)
            .failures
            .rejected_ids
            .insert(complaint_id.into());
    }

    pub fn reject_all_creates(&self, reject: bool) {
        lock(&self.state).failures.reject_all_creates = reject;
    }

    pub fn fail_camera(&self, fail: bool) {
        lock(&self.state).failures.camera_fails = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        lock(&self.state).failures.delete_fails = fail;
    }

    /// Delay applied to every `create_annotations` call.
    pub fn set_create_latency(&self, latency: Duration) {
        lock(&self.state).failures.create_latency = latency;
    }

    /// Deliver an event to the attached listener. Returns false if none is attached.
    pub fn emit(&self, event: SurfaceEvent) -> bool {
        let state = lock(&self.state);
        match &state.listener {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn counts(&self) -> SurfaceCallCounts {
        lock(&self.state).counts
    }

    pub fn annotation_count(&self) -> usize {
        lock(&self.state).annotations.len()
    }

    pub fn annotation(&self, handle: AnnotationHandle) -> Option<PlacedAnnotation> {
        lock(&self.state).annotations.get(&handle).cloned()
    }

    /// Every icon size applied to `handle`, in order.
    pub fn size_history(&self, handle: AnnotationHandle) -> Vec<f64> {
        lock(&self.state)
            .size_log
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, size)| *size)
            .collect()
    }

    pub fn camera_log(&self) -> Vec<CameraOptions> {
        lock(&self.state).camera_log.clone()
    }

    /// Duration requested by every accepted `fly_to`, in order.
    pub fn animation_durations(&self) -> Vec<Duration> {
        lock(&self.state).animation_log.clone()
    }

    pub fn current_camera(&self) -> CameraState {
        lock(&self.state).camera
    }

    pub fn listeners_attached(&self) -> bool {
        lock(&self.state).listener.is_some()
    }

    pub fn is_released(&self) -> bool {
        lock(&self.state).released
    }

    fn ensure_usable(state: &SurfaceState) -> Result<(), SurfaceError> {
        if state.released {
            Err(SurfaceError::Disposed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RenderingSurface for InMemorySurface {
    async fn wait_for_style(&self) -> Result<(), SurfaceError> {
        Self::ensure_usable(&lock(&self.state))
    }

    async fn attach_listeners(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<SurfaceEvent>, SurfaceError> {
        let mut state = lock(&self.state);
        Self::ensure_usable(&state)?;
        let (tx, rx) = mpsc::unbounded_channel();
        state.listener = Some(tx);
        Ok(rx)
    }

    async fn detach_listeners(&self) {
        lock(&self.state).listener = None;
    }

    async fn camera_state(&self) -> Result<CameraState, SurfaceError> {
        let state = lock(&self.state);
        Self::ensure_usable(&state)?;
        Ok(state.camera)
    }

    async fn fly_to(&self, target: CameraOptions, duration: Duration) -> Result<(), SurfaceError> {
        let mut state = lock(&self.state);
        Self::ensure_usable(&state)?;
        if state.failures.camera_fails {
            return Err(SurfaceError::Rejected("camera animation refused".to_string()));
        }

        state.counts.camera_moves += 1;
        state.camera_log.push(target);
        state.animation_log.push(duration);
        if let Some(center) = target.center {
            state.camera.center = center;
        }
        if let Some(zoom) = target.zoom {
            state.camera.zoom = zoom;
        }
        if let Some(bearing) = target.bearing {
            state.camera.bearing = bearing;
        }
        if let Some(pitch) = target.pitch {
            state.camera.pitch = pitch;
        }
        Ok(())
    }

    async fn camera_for_bounds(
        &self,
        points: &[GeoPoint],
        _insets: EdgeInsets,
    ) -> Result<CameraOptions, SurfaceError> {
        let state = lock(&self.state);
        Self::ensure_usable(&state)?;
        if state.failures.camera_fails {
            return Err(SurfaceError::Rejected("bounds camera refused".to_string()));
        }
        if points.is_empty() {
            return Err(SurfaceError::InvalidGeometry("empty bounds".to_string()));
        }

        let (mut south, mut north) = (f64::MAX, f64::MIN);
        let (mut west, mut east) = (f64::MAX, f64::MIN);
        for point in points {
            south = south.min(point.latitude);
            north = north.max(point.latitude);
            west = west.min(point.longitude);
            east = east.max(point.longitude);
        }

        let span = (north - south).max(east - west).max(1e-6);
        let zoom = (360.0 / span).log2().clamp(0.0, 20.0);
        let center = GeoPoint::new((south + north) / 2.0, (west + east) / 2.0)
            .ok_or_else(|| SurfaceError::InvalidGeometry("bounds center".to_string()))?;

        Ok(CameraOptions::centered(center).with_zoom(zoom))
    }

    async fn create_annotations(
        &self,
        batch: &[MarkerDescriptor],
    ) -> Vec<Result<AnnotationHandle, SurfaceError>> {
        let latency = lock(&self.state).failures.create_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.counts.create_calls += 1;
        debug!("In-memory surface: creating {} annotations", batch.len());

        batch
            .iter()
            .map(|descriptor| {
                Self::ensure_usable(state)?;
                if state.failures.reject_all_creates {
                    return Err(SurfaceError::Rejected("annotation manager busy".to_string()));
                }
                if state.failures.rejected_ids.contains(&descriptor.complaint_id) {
                    return Err(SurfaceError::InvalidGeometry(descriptor.complaint_id.clone()));
                }

                let handle = AnnotationHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
                state.annotations.insert(
                    handle,
                    PlacedAnnotation {
                        complaint_id: descriptor.complaint_id.clone(),
                        location: descriptor.location,
                        icon_size: descriptor.icon_size,
                    },
                );
                Ok(handle)
            })
            .collect()
    }

    async fn update_annotations(&self, updates: &[AnnotationUpdate]) -> Vec<Result<(), SurfaceError>> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.counts.update_calls += 1;

        updates
            .iter()
            .map(|update| {
                Self::ensure_usable(state)?;
                let placed = state
                    .annotations
                    .get_mut(&update.handle)
                    .ok_or_else(|| SurfaceError::Rejected(format!("unknown {}", update.handle)))?;
                placed.icon_size = update.icon_size;
                state.size_log.push((update.handle, update.icon_size));
                Ok(())
            })
            .collect()
    }

    async fn delete_annotations(&self, handles: &[AnnotationHandle]) -> Result<(), SurfaceError> {
        let mut state = lock(&self.state);
        state.counts.delete_calls += 1;
        Self::ensure_usable(&state)?;
        if state.failures.delete_fails {
            return Err(SurfaceError::Rejected("annotation delete refused".to_string()));
        }
        for handle in handles {
            state.annotations.remove(handle);
        }
        Ok(())
    }

    async fn release(&self) {
        let mut state = lock(&self.state);
        state.released = true;
        state.listener = None;
        state.annotations.clear();
    }
}

/// Record source serving a fixed, replaceable record set.
pub struct StaticRecordSource {
    records: Mutex<Result<Vec<RawComplaintRecord>, String>>,
    fetches: AtomicUsize,
}

impl StaticRecordSource {
    pub fn new(records: Vec<RawComplaintRecord>) -> Self {
        Self {
            records: Mutex::new(Ok(records)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_records(&self, records: Vec<RawComplaintRecord>) {
        *lock(&self.records) = Ok(records);
    }

    /// Make every fetch fail until `set_records` is called again.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.records) = Err(message.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for StaticRecordSource {
    async fn fetch_records(&self) -> Result<Vec<RawComplaintRecord>, MapSyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        lock(&self.records).clone().map_err(MapSyncError::DataFetch)
    }
}

/// Outcome of one `subscribe` call on a [`ScriptedFeed`].
#[derive(Clone, Debug)]
pub enum SubscribeOutcome {
    Accept,
    Reject(String),
}

/// Live feed whose subscribe outcomes are scripted in advance.
///
/// Subscribe calls beyond the script are accepted. Events are pushed into the
/// current subscription with [`ScriptedFeed::send`].
#[derive(Default)]
pub struct ScriptedFeed {
    script: Mutex<VecDeque<SubscribeOutcome>>,
    current: Mutex<Option<mpsc::UnboundedSender<FeedEvent>>>,
    subscribe_times: Mutex<Vec<Instant>>,
    unsubscribes: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: impl IntoIterator<Item = SubscribeOutcome>) -> Self {
        let feed = Self::default();
        lock(&feed.script).extend(outcomes);
        feed
    }

    pub fn push_outcome(&self, outcome: SubscribeOutcome) {
        lock(&self.script).push_back(outcome);
    }

    /// Send an event to the live subscription. Returns false if there is none.
    pub fn send(&self, event: FeedEvent) -> bool {
        match lock(&self.current).as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Drop the live subscription with an abnormal-closure code.
    pub fn close_abnormally(&self) -> bool {
        let sent = self.send(FeedEvent::abnormal_closure());
        lock(&self.current).take();
        sent
    }

    pub fn subscribe_count(&self) -> usize {
        lock(&self.subscribe_times).len()
    }

    /// Instants at which `subscribe` was called (tokio clock).
    pub fn subscribe_times(&self) -> Vec<Instant> {
        lock(&self.subscribe_times).clone()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.current).is_some()
    }
}

#[async_trait]
impl LiveFeed for ScriptedFeed {
    async fn subscribe(&self) -> Result<FeedSubscription, MapSyncError> {
        lock(&self.subscribe_times).push(Instant::now());
        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or(SubscribeOutcome::Accept);

        match outcome {
            SubscribeOutcome::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                *lock(&self.current) = Some(tx);
                Ok(FeedSubscription::new(rx))
            }
            SubscribeOutcome::Reject(message) => {
                debug!("Scripted feed: rejecting subscribe ({})", message);
                Err(MapSyncError::FeedDisconnection { code: None })
            }
        }
    }

    async fn unsubscribe(&self) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        lock(&self.current).take();
    }
}
