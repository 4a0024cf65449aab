use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use super::{HandleIndex, IconSizing};
use crate::collaborators::{AnnotationUpdate, RenderingSurface};
use crate::config::AnnotationConfig;
use crate::errors::{MapSyncError, Result};
use crate::liveness::Liveness;
use crate::models::{AnnotationHandle, ComplaintId, MarkerDescriptor};
use crate::performance::ModeReader;

/// Outcome of one bulk materialize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub requested: usize,
    pub created: usize,
    pub failed: usize,
}

/// Removes a handle from the bounce set when the bounce ends, however it ends.
struct BounceGuard<'a> {
    bouncing: &'a Mutex<HashSet<AnnotationHandle>>,
    handle: AnnotationHandle,
}

impl Drop for BounceGuard<'_> {
    fn drop(&mut self) {
        lock(self.bouncing).remove(&self.handle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Annotation manager mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Owns every annotation placed on the rendering surface.
///
/// Creation batches run strictly one after another. Surface failures on a
/// single entry are logged and leave that entry in its prior state.
pub struct AnnotationLifecycleManager {
    surface: Arc<dyn RenderingSurface>,
    config: AnnotationConfig,
    sizing: IconSizing,
    liveness: Liveness,
    mode: ModeReader,
    index: Mutex<HandleIndex>,
    /// Handles the surface failed to delete. Retried by the next materialize or teardown.
    pending_delete: Mutex<Vec<AnnotationHandle>>,
    last_size: Mutex<Option<f64>>,
    /// Most recent zoom passed to `resize`. Cleared when a materialize starts.
    latest_zoom: Mutex<Option<f64>>,
    bouncing: Mutex<HashSet<AnnotationHandle>>,
    resize_generation: AtomicU64,
    /// Serializes materialize and teardown.
    writer: tokio::sync::Mutex<()>,
    /// Serializes resize passes so a newer zoom sample always lands last.
    resizer: tokio::sync::Mutex<()>,
}

impl AnnotationLifecycleManager {
    pub fn new(
        surface: Arc<dyn RenderingSurface>,
        config: AnnotationConfig,
        liveness: Liveness,
        mode: ModeReader,
    ) -> Self {
        Self {
            surface,
            sizing: IconSizing::new(config.sizing.clone()),
            config,
            liveness,
            mode,
            index: Mutex::new(HandleIndex::new()),
            pending_delete: Mutex::new(Vec::new()),
            last_size: Mutex::new(None),
            latest_zoom: Mutex::new(None),
            bouncing: Mutex::new(HashSet::new()),
            resize_generation: AtomicU64::new(0),
            writer: tokio::sync::Mutex::new(()),
            resizer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn sizing(&self) -> &IconSizing {
        &self.sizing
    }

    /// Icon size most recently applied to every marker.
    pub fn current_size(&self) -> f64 {
        lock(&self.last_size).unwrap_or_else(|| self.sizing.min_size())
    }

    pub fn len(&self) -> usize {
        lock(&self.index).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.index).is_empty()
    }

    pub fn handle_for(&self, complaint_id: &str) -> Option<AnnotationHandle> {
        lock(&self.index).handle_for(complaint_id)
    }

    pub fn complaint_for(&self, handle: AnnotationHandle) -> Option<ComplaintId> {
        lock(&self.index).complaint_for(handle).cloned()
    }

    /// Copy of the current id <-> handle maps.
    pub fn index(&self) -> HandleIndex {
        lock(&self.index).clone()
    }

    pub fn is_bouncing(&self, handle: AnnotationHandle) -> bool {
        lock(&self.bouncing).contains(&handle)
    }

    /// Replaces the whole marker set with `descriptors`.
    ///
    /// Existing annotations are deleted first, then new ones are created in
    /// batches of `batch_size` with a short pause between batches. Entries
    /// the surface refuses are dropped. If nothing could be created from a
    /// non-empty input, returns [`MapSyncError::MarkerMaterialization`].
    ///
    /// Each batch enters the index as soon as the surface returns it, so an
    /// interrupted materialize leaves nothing untracked. A zoom change seen
    /// while the batches were being created is applied to the whole set once
    /// the last batch is placed.
    pub async fn materialize(&self, descriptors: &[MarkerDescriptor]) -> Result<MaterializeReport> {
        let _writer = self.writer.lock().await;
        self.liveness.ensure_live()?;

        self.retire_all().await;
        *lock(&self.latest_zoom) = None;
        *lock(&self.last_size) = descriptors.first().map(|d| d.icon_size);

        let batch_size = self.config.batch_size.max(1);
        let mut report = MaterializeReport {
            requested: descriptors.len(),
            ..MaterializeReport::default()
        };

        for (batch_number, batch) in descriptors.chunks(batch_size).enumerate() {
            if batch_number > 0 && !self.config.batch_yield.is_zero() {
                tokio::time::sleep(self.config.batch_yield).await;
            }
            if !self.liveness.is_live() {
                debug!("Materialize aborted before batch {}", batch_number);
                return Err(MapSyncError::Disposed);
            }

            let results = self.surface.create_annotations(batch).await;
            {
                let mut index = lock(&self.index);
                for (descriptor, result) in batch.iter().zip(results) {
                    match result {
                        Ok(handle) => {
                            index.insert(descriptor.complaint_id.clone(), handle);
                            report.created += 1;
                        }
                        Err(e) => {
                            warn!(
                                "Failed to create annotation for complaint {}: {}",
                                descriptor.complaint_id, e
                            );
                        }
                    }
                }
            }
            debug!(
                "Materialize batch {}: {} of {} annotations placed",
                batch_number, report.created, report.requested
            );

            if !self.liveness.is_live() {
                return Err(MapSyncError::Disposed);
            }
        }

        report.failed = report.requested - report.created;
        info!(
            "Materialized {} of {} markers",
            report.created, report.requested
        );

        if report.requested > 0 && report.created == 0 {
            return Err(MapSyncError::MarkerMaterialization {
                requested: report.requested,
            });
        }

        let zoomed = *lock(&self.latest_zoom);
        if let (Some(zoom), Some(built_size)) = (zoomed, descriptors.first().map(|d| d.icon_size)) {
            if (self.sizing.size_for_zoom(zoom) - built_size).abs() > f64::EPSILON {
                debug!("Zoom moved to {:.2} during materialize, resizing", zoom);
                match self.resize(zoom, true).await {
                    Ok(_) => {}
                    Err(e) if e.is_disposed() => return Err(e),
                    Err(e) => warn!("Resize after materialize failed: {}", e),
                }
            }
        }
        Ok(report)
    }

    /// Moves every tracked handle to the pending-delete list and deletes the
    /// whole list. On failure the handles stay pending.
    async fn retire_all(&self) {
        let stale = {
            let mut pending = lock(&self.pending_delete);
            let previous = std::mem::take(&mut *lock(&self.index));
            pending.extend(previous.handles());
            pending.clone()
        };
        if stale.is_empty() {
            return;
        }

        match self.surface.delete_annotations(&stale).await {
            Ok(()) => {
                lock(&self.pending_delete).clear();
                debug!("Removed {} annotations", stale.len());
            }
            Err(e) => warn!(
                "Failed to delete {} annotations, keeping them for retry: {}",
                stale.len(),
                e
            ),
        }
    }

    /// Applies the icon size for `zoom` to every marker not mid-bounce.
    ///
    /// Returns the number of annotations updated. Changes smaller than the
    /// update threshold are skipped unless `force` is set. A call overtaken
    /// by a newer one before reaching the surface does nothing.
    pub async fn resize(&self, zoom: f64, force: bool) -> Result<usize> {
        *lock(&self.latest_zoom) = Some(zoom);
        let generation = self.resize_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let _resizer = self.resizer.lock().await;
        self.liveness.ensure_live()?;

        if self.resize_generation.load(Ordering::Acquire) != generation {
            debug!("Resize for zoom {:.2} superseded", zoom);
            return Ok(0);
        }

        let size = self.sizing.size_for_zoom(zoom);
        let last = *lock(&self.last_size);
        if !force && !self.sizing.should_update(last, size) {
            return Ok(0);
        }

        let updates: Vec<AnnotationUpdate> = {
            let index = lock(&self.index);
            if index.is_empty() {
                // Nothing placed yet. The next materialize picks the zoom up.
                return Ok(0);
            }
            let bouncing = lock(&self.bouncing);
            index
                .handles()
                .into_iter()
                .filter(|handle| !bouncing.contains(handle))
                .map(|handle| AnnotationUpdate {
                    handle,
                    icon_size: size,
                })
                .collect()
        };

        *lock(&self.last_size) = Some(size);
        if updates.is_empty() {
            return Ok(0);
        }

        let results = self.surface.update_annotations(&updates).await;
        self.liveness.ensure_live()?;

        let mut updated = 0;
        for (update, result) in updates.iter().zip(results) {
            match result {
                Ok(()) => updated += 1,
                Err(e) => warn!("Failed to resize {}: {}", update.handle, e),
            }
        }
        debug!("Resized {} markers to {:.2} (zoom {:.2})", updated, size, zoom);
        Ok(updated)
    }

    /// Runs the two-phase bounce on `handle`.
    ///
    /// Returns `Ok(false)` without touching the surface when the handle is
    /// unknown or already bouncing.
    pub async fn highlight(&self, handle: AnnotationHandle) -> Result<bool> {
        self.liveness.ensure_live()?;
        if !lock(&self.index).contains_handle(handle) {
            debug!("Ignoring highlight for unknown {}", handle);
            return Ok(false);
        }
        if !lock(&self.bouncing).insert(handle) {
            debug!("{} is already bouncing", handle);
            return Ok(false);
        }
        let _guard = BounceGuard {
            bouncing: &self.bouncing,
            handle,
        };

        let highlight = &self.config.highlight;
        let (enlarged_hold, settle_hold) = if self.mode.is_degraded() {
            (highlight.enlarged_hold / 2, highlight.settle_hold / 2)
        } else {
            (highlight.enlarged_hold, highlight.settle_hold)
        };

        self.set_size(handle, self.current_size() * highlight.scale).await;
        self.hold(enlarged_hold).await?;

        // Resizes skipped this handle while it was enlarged.
        self.set_size(handle, self.current_size()).await;
        self.hold(settle_hold).await?;

        Ok(true)
    }

    async fn set_size(&self, handle: AnnotationHandle, icon_size: f64) {
        let results = self
            .surface
            .update_annotations(&[AnnotationUpdate { handle, icon_size }])
            .await;
        for result in results {
            if let Err(e) = result {
                warn!("Failed to set size of {}: {}", handle, e);
            }
        }
    }

    async fn hold(&self, duration: Duration) -> Result<()> {
        self.liveness.ensure_live()?;
        tokio::time::sleep(duration).await;
        self.liveness.ensure_live()
    }

    /// Deletes every annotation, clears both maps and detaches listeners.
    ///
    /// Safe to call any number of times, including after disposal. Handles
    /// from an earlier failed delete are retried.
    pub async fn teardown(&self) {
        let _writer = self.writer.lock().await;

        self.retire_all().await;
        *lock(&self.last_size) = None;
        self.surface.detach_listeners().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::InMemorySurface;
    use crate::config::HighlightConfig;
    use crate::models::{CameraState, GeoPoint, IconImage};
    use crate::performance::PerformanceMode;

    fn camera() -> CameraState {
        CameraState {
            center: GeoPoint::new(12.97, 77.59).unwrap(),
            zoom: 11.0,
            bearing: 0.0,
            pitch: 0.0,
        }
    }

    fn descriptors(count: usize, icon_size: f64) -> Vec<MarkerDescriptor> {
        let icon = Arc::new(IconImage::new("pin", vec![]));
        (0..count)
            .map(|i| MarkerDescriptor {
                complaint_id: format!("c-{i}"),
                location: GeoPoint::new(12.9 + i as f64 * 1e-4, 77.6).unwrap(),
                icon_size,
                icon: Arc::clone(&icon),
                payload: Default::default(),
            })
            .collect()
    }

    fn manager_with(
        surface: Arc<InMemorySurface>,
        config: AnnotationConfig,
        mode: PerformanceMode,
    ) -> (Arc<AnnotationLifecycleManager>, Liveness) {
        let liveness = Liveness::new();
        let manager = AnnotationLifecycleManager::new(
            surface,
            config,
            liveness.clone(),
            ModeReader::fixed(mode),
        );
        (Arc::new(manager), liveness)
    }

    fn manager(surface: Arc<InMemorySurface>) -> (Arc<AnnotationLifecycleManager>, Liveness) {
        manager_with(surface, AnnotationConfig::default(), PerformanceMode::Normal)
    }

    #[tokio::test(start_paused = true)]
    async fn test_materialize_creates_in_batches() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());

        let report = manager.materialize(&descriptors(1200, 0.4)).await.unwrap();

        assert_eq!(
            report,
            MaterializeReport {
                requested: 1200,
                created: 1200,
                failed: 0
            }
        );
        assert_eq!(surface.counts().create_calls, 3);
        assert_eq!(manager.len(), 1200);
        assert!(manager.index().is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_materialize_replaces_previous_set() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());

        manager.materialize(&descriptors(10, 0.4)).await.unwrap();
        let old = manager.handle_for("c-0").unwrap();
        manager.materialize(&descriptors(4, 0.4)).await.unwrap();

        assert_eq!(surface.annotation_count(), 4);
        assert_eq!(manager.len(), 4);
        assert!(surface.annotation(old).is_none());
        assert_ne!(manager.handle_for("c-0"), Some(old));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_is_tolerated() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        surface.reject_complaint("c-1");
        let (manager, _) = manager(surface.clone());

        let report = manager.materialize(&descriptors(3, 0.4)).await.unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(manager.handle_for("c-1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_is_reported() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        surface.reject_all_creates(true);
        let (manager, _) = manager(surface.clone());

        let err = manager.materialize(&descriptors(3, 0.4)).await.unwrap_err();
        assert!(matches!(
            err,
            MapSyncError::MarkerMaterialization { requested: 3 }
        ));
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_materialize_clears_markers() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());

        manager.materialize(&descriptors(5, 0.4)).await.unwrap();
        let report = manager.materialize(&[]).await.unwrap();

        assert_eq!(report, MaterializeReport::default());
        assert_eq!(surface.annotation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_applies_and_skips_small_changes() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());
        manager.materialize(&descriptors(3, 0.4)).await.unwrap();

        assert_eq!(manager.resize(14.0, false).await.unwrap(), 3);
        assert!((manager.current_size() - 0.8).abs() < 1e-9);

        // 14.05 moves the icon by far less than the threshold.
        assert_eq!(manager.resize(14.05, false).await.unwrap(), 0);
        assert_eq!(manager.resize(14.05, true).await.unwrap(), 3);

        let handle = manager.handle_for("c-0").unwrap();
        assert_eq!(surface.size_history(handle).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_skips_bouncing_markers() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());
        manager.materialize(&descriptors(2, 0.4)).await.unwrap();
        let bouncing = manager.handle_for("c-0").unwrap();

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.highlight(bouncing).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.is_bouncing(bouncing));

        assert_eq!(manager.resize(18.0, false).await.unwrap(), 1);
        assert!(task.await.unwrap().unwrap());

        // The bounce settles on the size applied meanwhile.
        assert_eq!(surface.annotation(bouncing).unwrap().icon_size, 1.2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_bounces_once() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());
        manager.materialize(&descriptors(1, 0.5)).await.unwrap();
        let handle = manager.handle_for("c-0").unwrap();

        let first = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.highlight(handle).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = manager.highlight(handle).await.unwrap();

        assert!(!second);
        assert!(first.await.unwrap().unwrap());
        assert!(!manager.is_bouncing(handle));

        let history = surface.size_history(handle);
        assert_eq!(history.len(), 2);
        assert!((history[0] - 0.9).abs() < 1e-9);
        assert_eq!(history[1], 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_holds_shorter_in_degraded_mode() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let config = AnnotationConfig {
            highlight: HighlightConfig::default(),
            ..AnnotationConfig::default()
        };
        let (manager, _) = manager_with(surface.clone(), config, PerformanceMode::Degraded);
        manager.materialize(&descriptors(1, 0.5)).await.unwrap();
        let handle = manager.handle_for("c-0").unwrap();

        let started = tokio::time::Instant::now();
        assert!(manager.highlight(handle).await.unwrap());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(275), "took {elapsed:?}");
        assert!(elapsed < Duration::from_millis(550), "took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_unknown_handle_is_ignored() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());

        assert!(!manager.highlight(AnnotationHandle::new(99)).await.unwrap());
        assert_eq!(surface.counts().update_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_mid_materialize_stops_creating() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        surface.set_create_latency(Duration::from_millis(100));
        let config = AnnotationConfig {
            batch_size: 10,
            ..AnnotationConfig::default()
        };
        let (manager, liveness) = manager_with(surface.clone(), config, PerformanceMode::Normal);

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.materialize(&descriptors(50, 0.4)).await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        liveness.dispose();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(MapSyncError::Disposed)));
        assert_eq!(surface.counts().create_calls, 2);

        manager.teardown().await;
        assert_eq!(surface.annotation_count(), 0);
        assert_eq!(surface.counts().create_calls, 2);
    }

    fn slow_batches() -> AnnotationConfig {
        AnnotationConfig {
            batch_size: 10,
            ..AnnotationConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zoom_during_materialize_lands_on_every_marker() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        surface.set_create_latency(Duration::from_millis(100));
        let (manager, _) = manager_with(surface.clone(), slow_batches(), PerformanceMode::Normal);

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.materialize(&descriptors(50, 0.4)).await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        manager.resize(18.0, false).await.unwrap();

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.created, 50);

        let expected = manager.sizing().size_for_zoom(18.0);
        assert!((manager.current_size() - expected).abs() < 1e-9);
        for i in 0..50 {
            let handle = manager.handle_for(&format!("c-{i}")).unwrap();
            assert_eq!(surface.annotation(handle).unwrap().icon_size, expected, "c-{i}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_before_any_marker_waits_for_materialize() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());

        assert_eq!(manager.resize(18.0, false).await.unwrap(), 0);
        assert_eq!(manager.current_size(), manager.sizing().min_size());
        assert_eq!(surface.counts().update_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_materialize_leaves_nothing_behind() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        surface.set_create_latency(Duration::from_millis(100));
        let (manager, _) = manager_with(surface.clone(), slow_batches(), PerformanceMode::Normal);

        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.materialize(&descriptors(50, 0.4)).await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(surface.annotation_count(), 10);
        assert_eq!(manager.len(), 10);
        assert!(manager.index().is_consistent());

        manager.teardown().await;
        assert_eq!(surface.annotation_count(), 0);
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_is_retried() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());
        manager.materialize(&descriptors(5, 0.4)).await.unwrap();

        surface.fail_deletes(true);
        manager.materialize(&descriptors(3, 0.4)).await.unwrap();
        assert_eq!(surface.annotation_count(), 8);
        assert_eq!(manager.len(), 3);

        // Still failing: teardown keeps everything for the next attempt.
        manager.teardown().await;
        assert_eq!(surface.annotation_count(), 8);

        surface.fail_deletes(false);
        manager.teardown().await;
        assert_eq!(surface.annotation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_is_retried_by_next_materialize() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());
        manager.materialize(&descriptors(5, 0.4)).await.unwrap();

        surface.fail_deletes(true);
        manager.materialize(&descriptors(2, 0.4)).await.unwrap();
        surface.fail_deletes(false);
        manager.materialize(&descriptors(4, 0.4)).await.unwrap();

        assert_eq!(surface.annotation_count(), 4);
        assert_eq!(manager.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_is_idempotent() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());
        manager.materialize(&descriptors(5, 0.4)).await.unwrap();

        manager.teardown().await;
        manager.teardown().await;

        assert!(manager.is_empty());
        assert_eq!(surface.annotation_count(), 0);
        assert_eq!(surface.counts().delete_calls, 1);
        assert!(!surface.listeners_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_updates_are_not_counted() {
        let surface = Arc::new(InMemorySurface::new(camera()));
        let (manager, _) = manager(surface.clone());
        manager.materialize(&descriptors(2, 0.4)).await.unwrap();

        surface.release().await;
        let result = manager.resize(18.0, true).await;
        assert_eq!(result.unwrap(), 0);
    }
}
