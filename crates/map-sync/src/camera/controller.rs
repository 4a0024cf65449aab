use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;

use super::motion;
use crate::annotations::AnnotationLifecycleManager;
use crate::collaborators::RenderingSurface;
use crate::config::CameraConfig;
use crate::errors::{MapSyncError, Result, SurfaceError};
use crate::liveness::Liveness;
use crate::models::{CameraOptions, CameraState, GeoPoint, MarkerDescriptor};
use crate::performance::ModeReader;

fn camera_error(error: SurfaceError) -> MapSyncError {
    MapSyncError::CameraOperation(error.to_string())
}

/// Serialized camera commands against the rendering surface.
///
/// Every command takes the next sequence number when it is issued and then
/// waits for the previous command's surface call to return. After disposal
/// every command is a no-op that returns `Ok(())`. A failed command leaves
/// the camera where it was and returns [`MapSyncError::CameraOperation`].
pub struct CameraController {
    surface: Arc<dyn RenderingSurface>,
    annotations: Arc<AnnotationLifecycleManager>,
    config: CameraConfig,
    liveness: Liveness,
    mode: ModeReader,
    serial: Mutex<()>,
    sequence: AtomicU64,
}

impl CameraController {
    pub fn new(
        surface: Arc<dyn RenderingSurface>,
        annotations: Arc<AnnotationLifecycleManager>,
        config: CameraConfig,
        liveness: Liveness,
        mode: ModeReader,
    ) -> Self {
        Self {
            surface,
            annotations,
            config,
            liveness,
            mode,
            serial: Mutex::new(()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Animation length for `base`, shortened in degraded mode.
    pub fn animation_duration(&self, base: Duration) -> Duration {
        if self.mode.is_degraded() {
            base.mul_f64(self.config.degraded_duration_factor.clamp(0.0, 1.0))
        } else {
            base
        }
    }

    fn issue(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn is_superseded(&self, sequence: u64) -> bool {
        self.sequence.load(Ordering::Acquire) != sequence
    }

    pub async fn zoom_in(&self) -> Result<()> {
        self.adjust("zoom in", |config, camera| motion::zoom_target(config, camera, 1.0))
            .await
    }

    pub async fn zoom_out(&self) -> Result<()> {
        self.adjust("zoom out", |config, camera| motion::zoom_target(config, camera, -1.0))
            .await
    }

    pub async fn rotate_left(&self) -> Result<()> {
        self.adjust("rotate left", |config, camera| motion::rotate_target(config, camera, -1.0))
            .await
    }

    pub async fn rotate_right(&self) -> Result<()> {
        self.adjust("rotate right", |config, camera| motion::rotate_target(config, camera, 1.0))
            .await
    }

    pub async fn increase_pitch(&self) -> Result<()> {
        self.adjust("increase pitch", |config, camera| {
            CameraOptions::default().with_pitch(motion::raise_pitch(config, camera.pitch))
        })
        .await
    }

    pub async fn decrease_pitch(&self) -> Result<()> {
        self.adjust("decrease pitch", |config, camera| {
            CameraOptions::default().with_pitch(motion::lower_pitch(config, camera.pitch))
        })
        .await
    }

    /// Reads the camera, derives a target from it and animates there.
    async fn adjust(
        &self,
        command: &str,
        plan: impl FnOnce(&CameraConfig, CameraState) -> CameraOptions,
    ) -> Result<()> {
        self.issue();
        if !self.liveness.is_live() {
            return Ok(());
        }

        let _serial = self.serial.lock().await;
        if !self.liveness.is_live() {
            return Ok(());
        }

        let camera = self.surface.camera_state().await.map_err(camera_error)?;
        if !self.liveness.is_live() {
            return Ok(());
        }

        debug!("Camera command: {}", command);
        let target = plan(&self.config, camera);
        self.fly(target, self.config.animation).await
    }

    async fn fly(&self, target: CameraOptions, base: Duration) -> Result<()> {
        self.surface
            .fly_to(target, self.animation_duration(base))
            .await
            .map_err(camera_error)
    }

    /// Frames every point inside the configured insets.
    ///
    /// An empty slice flies to the default camera; a single location flies
    /// to it at the single-point zoom.
    pub async fn fit_to_bounds(&self, points: &[GeoPoint]) -> Result<()> {
        self.issue();
        if !self.liveness.is_live() {
            return Ok(());
        }

        let _serial = self.serial.lock().await;
        if !self.liveness.is_live() {
            return Ok(());
        }

        let target = if points.is_empty() {
            self.config.default_camera()
        } else if motion::is_single_location(points) {
            CameraOptions::centered(points[0]).with_zoom(self.config.single_point_zoom)
        } else {
            let target = self
                .surface
                .camera_for_bounds(points, self.config.fit_insets)
                .await
                .map_err(camera_error)?;
            if !self.liveness.is_live() {
                return Ok(());
            }
            target
        };

        self.fly(target, self.config.animation).await
    }

    /// Flies to the fixed default camera.
    pub async fn show_default_view(&self) -> Result<()> {
        self.fit_to_bounds(&[]).await
    }

    /// Two-stage flight to `markers[index]`.
    ///
    /// Stage one pulls back to the overview zoom and pitch. After a short
    /// pause, stage two flies to the marker at close zoom with a bearing
    /// rotation, and the marker's highlight starts partway through. Stage
    /// two is skipped when another camera command was issued meanwhile.
    pub async fn fly_to_target(&self, index: usize, markers: &[MarkerDescriptor]) -> Result<()> {
        let sequence = self.issue();
        if !self.liveness.is_live() {
            return Ok(());
        }
        let target = markers.get(index).ok_or_else(|| {
            MapSyncError::CameraOperation(format!(
                "no marker at index {} of {}",
                index,
                markers.len()
            ))
        })?;

        {
            let _serial = self.serial.lock().await;
            if !self.liveness.is_live() || self.is_superseded(sequence) {
                return Ok(());
            }
            let overview = CameraOptions::default()
                .with_zoom(self.config.overview_zoom)
                .with_pitch(self.config.overview_pitch);
            self.fly(overview, self.config.overview_animation).await?;
        }

        let pause = self.animation_duration(self.config.overview_animation)
            + self.animation_duration(self.config.overview_pause);
        tokio::time::sleep(pause).await;

        let _serial = self.serial.lock().await;
        if !self.liveness.is_live() {
            return Ok(());
        }
        if self.is_superseded(sequence) {
            debug!(
                "Flight to complaint {} superseded after overview",
                target.complaint_id
            );
            return Ok(());
        }

        let camera = self.surface.camera_state().await.map_err(camera_error)?;
        if !self.liveness.is_live() {
            return Ok(());
        }

        let bearing = (camera.bearing + self.config.target_bearing_offset).rem_euclid(360.0);
        let close = CameraOptions::centered(target.location)
            .with_zoom(self.config.target_zoom)
            .with_pitch(self.config.target_pitch)
            .with_bearing(bearing);
        let duration = self.animation_duration(self.config.target_animation);
        self.surface
            .fly_to(close, duration)
            .await
            .map_err(camera_error)?;

        match self.annotations.handle_for(&target.complaint_id) {
            Some(handle) => {
                let annotations = Arc::clone(&self.annotations);
                let delay = duration.mul_f64(self.config.highlight_at.clamp(0.0, 1.0));
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = annotations.highlight(handle).await {
                        if !e.is_disposed() {
                            warn!("Highlight of {} failed: {}", handle, e);
                        }
                    }
                });
            }
            None => debug!("Complaint {} has no live annotation", target.complaint_id),
        }

        Ok(())
    }
}
