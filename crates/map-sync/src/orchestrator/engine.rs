use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::events::{MapEvent, MapEventBus, UserNotice};
use crate::annotations::{AnnotationLifecycleManager, MaterializeReport};
use crate::camera::CameraController;
use crate::collaborators::{LiveFeed, RecordSource, RenderingSurface, SurfaceEvent};
use crate::config::MapSyncConfig;
use crate::connection::{ConnectionSupervisor, FeedUpdate};
use crate::errors::{MapSyncError, RecoveryAction, Result};
use crate::liveness::Liveness;
use crate::models::{
    AnnotationHandle, ComplaintId, ConnectionState, GeoPoint, IconImage, MarkerDescriptor,
    RawComplaintRecord,
};
use crate::performance::{PerformanceMode, PerformanceMonitor};
use crate::preparer::MarkerDataPreparer;

/// Direction for stepping through markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
}

/// Markers currently on the map, in record order, and the selected one.
#[derive(Debug, Default)]
struct MarkerSet {
    descriptors: Arc<Vec<MarkerDescriptor>>,
    selected: Option<ComplaintId>,
}

impl MarkerSet {
    fn replace(&mut self, descriptors: Vec<MarkerDescriptor>) {
        let keep = self
            .selected
            .as_deref()
            .is_some_and(|id| descriptors.iter().any(|d| d.complaint_id == id));
        if !keep {
            self.selected = None;
        }
        self.descriptors = Arc::new(descriptors);
    }

    fn selected_index(&self) -> Option<usize> {
        let selected = self.selected.as_deref()?;
        self.descriptors
            .iter()
            .position(|d| d.complaint_id == selected)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Map sync mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Owns one map session: initial load, live updates, camera-driven resizes,
/// UI commands and the single disposal path.
///
/// Construct with [`MapSyncOrchestrator::new`], call [`start`] once the
/// surface exists and [`dispose`] when the screen goes away. Background tasks
/// hold a reference to the orchestrator until `dispose` stops them.
///
/// [`start`]: MapSyncOrchestrator::start
/// [`dispose`]: MapSyncOrchestrator::dispose
pub struct MapSyncOrchestrator {
    config: MapSyncConfig,
    surface: Arc<dyn RenderingSurface>,
    source: Arc<dyn RecordSource>,
    liveness: Liveness,
    performance: Arc<PerformanceMonitor>,
    preparer: MarkerDataPreparer,
    annotations: Arc<AnnotationLifecycleManager>,
    camera: Arc<CameraController>,
    supervisor: Arc<ConnectionSupervisor>,
    events: MapEventBus,
    icon: IconImage,
    markers: Mutex<MarkerSet>,
    /// Serializes the fetch -> prepare -> materialize pipeline.
    pipeline: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl MapSyncOrchestrator {
    pub fn new(
        config: MapSyncConfig,
        surface: Arc<dyn RenderingSurface>,
        source: Arc<dyn RecordSource>,
        feed: Arc<dyn LiveFeed>,
    ) -> Arc<Self> {
        let liveness = Liveness::new();
        let performance = Arc::new(PerformanceMonitor::new(config.performance.clone()));
        let annotations = Arc::new(AnnotationLifecycleManager::new(
            Arc::clone(&surface),
            config.annotations.clone(),
            liveness.clone(),
            performance.reader(),
        ));
        let camera = Arc::new(CameraController::new(
            Arc::clone(&surface),
            Arc::clone(&annotations),
            config.camera.clone(),
            liveness.clone(),
            performance.reader(),
        ));
        let supervisor = Arc::new(ConnectionSupervisor::new(
            feed,
            config.backoff.clone(),
            liveness.clone(),
        ));
        let icon = IconImage::new(
            config.orchestrator.icon_name.clone(),
            config.orchestrator.icon_bytes.clone(),
        );

        Arc::new(Self {
            preparer: MarkerDataPreparer::new(config.preparer.clone()),
            events: MapEventBus::new(config.orchestrator.event_capacity),
            config,
            surface,
            source,
            liveness,
            performance,
            annotations,
            camera,
            supervisor,
            icon,
            markers: Mutex::new(MarkerSet::default()),
            pipeline: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Waits for the map style, wires the surface and feed listeners and
    /// runs the initial load.
    ///
    /// A failed initial load is recovered (default view plus a notice) and
    /// does not fail `start`. Calling `start` twice does nothing.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.liveness.ensure_live()?;
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Map sync already started");
            return Ok(());
        }

        self.surface.wait_for_style().await?;
        self.liveness.ensure_live()?;
        let surface_events = self.surface.attach_listeners().await?;
        self.liveness.ensure_live()?;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let handles = vec![
            tokio::spawn(Arc::clone(self).run_surface_events(surface_events)),
            tokio::spawn(Arc::clone(self).run_feed_updates(updates_rx)),
            tokio::spawn(Arc::clone(self).run_status(
                self.supervisor.watch(),
                self.performance.reader().watch(),
            )),
        ];
        lock(&self.tasks).extend(handles);
        self.supervisor.start(updates_tx);

        info!("Map sync started, loading complaint markers");
        match self.refresh().await {
            Ok(report) => debug!("Initial load placed {} markers", report.created),
            Err(e) => debug!("Initial load recovered from: {}", e),
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn performance_mode(&self) -> PerformanceMode {
        self.performance.mode()
    }

    pub fn is_disposed(&self) -> bool {
        !self.liveness.is_live()
    }

    pub fn annotations(&self) -> &AnnotationLifecycleManager {
        &self.annotations
    }

    /// Markers currently on the map, in record order.
    pub fn markers(&self) -> Arc<Vec<MarkerDescriptor>> {
        Arc::clone(&lock(&self.markers).descriptors)
    }

    pub fn selected(&self) -> Option<ComplaintId> {
        lock(&self.markers).selected.clone()
    }

    /// Refetches every record and rebuilds the markers.
    ///
    /// Emits `LoadingStateChanged` around the load. A failed fetch or a
    /// total materialize failure falls back to the default view.
    pub async fn refresh(&self) -> Result<MaterializeReport> {
        self.liveness.ensure_live()?;
        let _pipeline = self.pipeline.lock().await;
        self.liveness.ensure_live()?;

        self.events
            .publish(MapEvent::LoadingStateChanged { loading: true });
        let result = self.fetch_and_apply(true).await;
        if self.liveness.is_live() {
            self.events
                .publish(MapEvent::LoadingStateChanged { loading: false });
        }

        if let Err(e) = &result {
            self.recover(e).await;
        }
        result
    }

    async fn fetch_and_apply(&self, fit_camera: bool) -> Result<MaterializeReport> {
        let records = self.source.fetch_records().await?;
        self.liveness.ensure_live()?;
        self.apply_records(records, fit_camera).await
    }

    /// Prepare -> full materialize -> optional fit. The caller holds the pipeline lock.
    async fn apply_records(
        &self,
        records: Vec<RawComplaintRecord>,
        fit_camera: bool,
    ) -> Result<MaterializeReport> {
        let zoom = match self.surface.camera_state().await {
            Ok(camera) => camera.zoom,
            Err(e) => {
                debug!("Camera unavailable for icon sizing: {}", e);
                self.config.camera.default_zoom
            }
        };
        self.liveness.ensure_live()?;

        let icon_size = self.annotations.sizing().size_for_zoom(zoom);
        let prepared = self.preparer.prepare(records, &self.icon, icon_size).await;
        self.liveness.ensure_live()?;

        let dropped_rows = prepared.stats.dropped();
        let materialized = self.annotations.materialize(&prepared.descriptors).await;
        self.liveness.ensure_live()?;

        let placed: Vec<MarkerDescriptor> = prepared
            .descriptors
            .into_iter()
            .filter(|d| self.annotations.handle_for(&d.complaint_id).is_some())
            .collect();
        let points: Vec<GeoPoint> = placed.iter().map(|d| d.location).collect();
        let count = placed.len();
        lock(&self.markers).replace(placed);

        let report = materialized?;
        self.events.publish(MapEvent::MarkersUpdated {
            count,
            dropped: dropped_rows + report.failed,
        });

        if fit_camera {
            if let Err(e) = self.camera.fit_to_bounds(&points).await {
                warn!("Could not frame {} markers: {}", points.len(), e);
            }
        }
        Ok(report)
    }

    async fn recover(&self, error: &MapSyncError) {
        match error.recovery_action() {
            RecoveryAction::FallbackToDefaultView => {
                warn!("Marker load failed, showing default view: {}", error);
                let notice = match error {
                    MapSyncError::MarkerMaterialization { requested } => {
                        self.events.publish(MapEvent::MarkersUpdated {
                            count: 0,
                            dropped: *requested,
                        });
                        UserNotice::MarkersUnavailable {
                            message: error.to_string(),
                        }
                    }
                    _ => UserNotice::FetchFailed {
                        message: error.to_string(),
                    },
                };
                self.events.publish(MapEvent::Notice(notice));
                if let Err(e) = self.camera.show_default_view().await {
                    warn!("Default view failed: {}", e);
                }
            }
            RecoveryAction::Abort => debug!("Marker load stopped: session disposed"),
            RecoveryAction::Ignore | RecoveryAction::Backoff => {
                warn!("Marker load failed: {}", error);
            }
        }
    }

    /// Frames every marker, or the default view when there are none.
    pub async fn reset_view(&self) {
        let points: Vec<GeoPoint> = self.markers().iter().map(|d| d.location).collect();
        if let Err(e) = self.camera.fit_to_bounds(&points).await {
            warn!("Reset view failed: {}", e);
            if self.liveness.is_live() {
                self.events
                    .publish(MapEvent::Notice(UserNotice::ResetViewFailed {
                        message: e.to_string(),
                    }));
            }
        }
    }

    /// Selects the next or previous marker, wrapping at both ends, and flies to it.
    ///
    /// Returns the newly selected complaint, or `None` when there are no markers.
    pub async fn navigate(&self, direction: Navigation) -> Option<ComplaintId> {
        if !self.liveness.is_live() {
            return None;
        }

        let (index, markers) = {
            let mut set = lock(&self.markers);
            let len = set.descriptors.len();
            if len == 0 {
                debug!("Nothing to navigate to");
                return None;
            }
            let index = match (set.selected_index(), direction) {
                (None, Navigation::Next) => 0,
                (None, Navigation::Previous) => len - 1,
                (Some(current), Navigation::Next) => (current + 1) % len,
                (Some(current), Navigation::Previous) => (current + len - 1) % len,
            };
            set.selected = Some(set.descriptors[index].complaint_id.clone());
            (index, Arc::clone(&set.descriptors))
        };

        let complaint_id = markers[index].complaint_id.clone();
        if let Err(e) = self.camera.fly_to_target(index, &markers).await {
            warn!("Flight to complaint {} failed: {}", complaint_id, e);
        }
        Some(complaint_id)
    }

    pub async fn zoom_in(&self) {
        log_camera("zoom in", self.camera.zoom_in().await);
    }

    pub async fn zoom_out(&self) {
        log_camera("zoom out", self.camera.zoom_out().await);
    }

    pub async fn rotate_left(&self) {
        log_camera("rotate left", self.camera.rotate_left().await);
    }

    pub async fn rotate_right(&self) {
        log_camera("rotate right", self.camera.rotate_right().await);
    }

    pub async fn increase_pitch(&self) {
        log_camera("increase pitch", self.camera.increase_pitch().await);
    }

    pub async fn decrease_pitch(&self) {
        log_camera("decrease pitch", self.camera.decrease_pitch().await);
    }

    /// Manual reconnect of the live feed, also out of `PermanentlyFailed`.
    pub fn reconnect(&self) {
        if self.liveness.is_live() {
            self.supervisor.reconnect();
        }
    }

    /// Tears the session down. Safe to call more than once.
    ///
    /// Order: terminal flag, background tasks and the feed supervisor,
    /// annotation teardown, surface release. None of the steps can stop the
    /// next one from running.
    pub async fn dispose(&self) {
        if !self.liveness.dispose() {
            debug!("Map sync already disposed");
            return;
        }
        info!("Disposing map sync");

        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for task in tasks {
            task.abort();
        }
        self.supervisor.shutdown().await;

        self.annotations.teardown().await;
        self.surface.release().await;
        info!("Map sync disposed");
    }

    fn debounce_window(&self) -> Duration {
        if self.performance.reader().is_degraded() {
            self.config.orchestrator.degraded_debounce
        } else {
            self.config.orchestrator.debounce
        }
    }

    async fn run_surface_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SurfaceEvent>) {
        debug!("Surface event loop started");
        let mut pending_zoom: Option<f64> = None;
        let mut deadline = Instant::now();

        loop {
            let event = if pending_zoom.is_some() {
                tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        if let Some(zoom) = pending_zoom.take() {
                            self.apply_zoom(zoom).await;
                        }
                        continue;
                    }
                }
            } else {
                events.recv().await
            };

            if !self.liveness.is_live() {
                break;
            }
            let Some(event) = event else {
                debug!("Surface listeners detached, stopping event loop");
                break;
            };

            match event {
                SurfaceEvent::CameraChanged { zoom } => {
                    pending_zoom = Some(zoom);
                    deadline = Instant::now() + self.debounce_window();
                }
                SurfaceEvent::AnnotationTapped(handle) => self.on_tap(handle),
                SurfaceEvent::FrameRendered(duration) => {
                    self.performance.record_frame(duration);
                }
                SurfaceEvent::StyleLoaded => debug!("Map style reloaded"),
            }
        }
    }

    async fn apply_zoom(&self, zoom: f64) {
        match self.annotations.resize(zoom, false).await {
            Ok(updated) if updated > 0 => debug!("Zoom {:.2}: resized {} markers", zoom, updated),
            Ok(_) => {}
            Err(e) if e.is_disposed() => {}
            Err(e) => warn!("Resize at zoom {:.2} failed: {}", zoom, e),
        }
    }

    fn on_tap(&self, handle: AnnotationHandle) {
        let Some(complaint_id) = self.annotations.complaint_for(handle) else {
            debug!("Tap on unknown {}", handle);
            return;
        };

        lock(&self.markers).selected = Some(complaint_id.clone());
        self.events
            .publish(MapEvent::MarkerTapped { complaint_id });

        let annotations = Arc::clone(&self.annotations);
        tokio::spawn(async move {
            if let Err(e) = annotations.highlight(handle).await {
                if !e.is_disposed() {
                    warn!("Highlight of {} failed: {}", handle, e);
                }
            }
        });
    }

    async fn run_feed_updates(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<FeedUpdate>) {
        while let Some(mut update) = updates.recv().await {
            // Only the newest queued update matters for a full rebuild.
            while let Ok(newer) = updates.try_recv() {
                update = newer;
            }
            if !self.liveness.is_live() {
                break;
            }

            let result = {
                let _pipeline = self.pipeline.lock().await;
                if !self.liveness.is_live() {
                    break;
                }
                match update {
                    FeedUpdate::Snapshot(records) => {
                        debug!("Live feed snapshot with {} records", records.len());
                        self.apply_records(records, false).await
                    }
                    FeedUpdate::Changed => {
                        debug!("Live feed reported changes, refetching");
                        self.fetch_and_apply(false).await
                    }
                }
            };

            match result {
                Ok(report) => debug!(
                    "Live update applied: {} of {} markers",
                    report.created, report.requested
                ),
                Err(e) if e.is_disposed() => break,
                Err(e) => warn!("Live update failed: {}", e),
            }
        }
        debug!("Feed update loop stopped");
    }

    async fn run_status(
        self: Arc<Self>,
        mut connection: watch::Receiver<ConnectionState>,
        mut mode: watch::Receiver<PerformanceMode>,
    ) {
        loop {
            tokio::select! {
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *connection.borrow_and_update();
                    if !self.liveness.is_live() {
                        break;
                    }
                    self.events.publish(MapEvent::ConnectionStateChanged { state });
                    if state == ConnectionState::PermanentlyFailed {
                        error!("Live feed permanently failed, waiting for manual reconnect");
                        self.events
                            .publish(MapEvent::Notice(UserNotice::LiveUpdatesUnavailable));
                    }
                }
                changed = mode.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *mode.borrow_and_update();
                    if !self.liveness.is_live() {
                        break;
                    }
                    info!("Rendering performance mode is now {}", current);
                    self.events.publish(MapEvent::PerformanceModeChanged { mode: current });
                }
            }
        }
    }
}

fn log_camera(command: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Camera {} failed: {}", command, e);
    }
}
