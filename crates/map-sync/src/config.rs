//! Configuration for every component of the engine.
//!
//! All values have production defaults; runtime adapters override individual
//! fields (the simulator reads them from the environment).

use std::time::Duration;

use crate::models::{CameraOptions, EdgeInsets, GeoPoint};

/// Marker data preparation settings.
#[derive(Clone, Debug)]
pub struct PreparerConfig {
    /// Inputs with at least this many rows are prepared on a worker.
    pub worker_threshold: usize,
    /// Maximum number of preparation workers running at once.
    pub max_workers: usize,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        Self {
            worker_threshold: 20,
            max_workers: 2,
        }
    }
}

/// Frame-rate monitoring settings.
#[derive(Clone, Debug)]
pub struct PerformanceConfig {
    /// Number of frame durations kept in the rolling window.
    pub window_size: usize,
    /// No mode decision is taken before this many samples are collected.
    pub min_samples: usize,
    /// Average fps below this enters degraded mode.
    pub degrade_below_fps: f64,
    /// Average fps above this leaves degraded mode.
    pub recover_above_fps: f64,
    /// After this long in degraded mode, recovery only needs to clear `degrade_below_fps`.
    pub min_dwell: Duration,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            min_samples: 30,
            degrade_below_fps: 45.0,
            recover_above_fps: 50.0,
            min_dwell: Duration::from_secs(2),
        }
    }
}

/// Reconnect backoff settings for the live feed.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Random spread applied to each delay, as a fraction (0.0 disables jitter).
    pub jitter: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
            max_attempts: None,
        }
    }
}

/// Zoom-to-icon-size mapping.
#[derive(Clone, Debug)]
pub struct SizingConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub min_size: f64,
    pub max_size: f64,
    /// Resizes that move the icon by less than this are skipped.
    pub update_threshold: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_zoom: 10.0,
            max_zoom: 18.0,
            min_size: 0.4,
            max_size: 1.2,
            update_threshold: 0.1,
        }
    }
}

/// Highlight bounce settings.
#[derive(Clone, Debug)]
pub struct HighlightConfig {
    pub scale: f64,
    pub enlarged_hold: Duration,
    pub settle_hold: Duration,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            scale: 1.8,
            enlarged_hold: Duration::from_millis(250),
            settle_hold: Duration::from_millis(300),
        }
    }
}

/// Annotation lifecycle settings.
#[derive(Clone, Debug)]
pub struct AnnotationConfig {
    pub batch_size: usize,
    /// Pause between two creation batches.
    pub batch_yield: Duration,
    pub sizing: SizingConfig,
    pub highlight: HighlightConfig,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            batch_yield: Duration::from_millis(20),
            sizing: SizingConfig::default(),
            highlight: HighlightConfig::default(),
        }
    }
}

/// Camera command settings.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub default_center: GeoPoint,
    pub default_zoom: f64,
    pub fit_insets: EdgeInsets,
    /// Zoom used when framing a single marker.
    pub single_point_zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    pub bearing_step: f64,
    pub max_pitch: f64,
    /// Discrete pitch levels stepped through by increase/decrease pitch.
    pub pitch_tiers: [f64; 3],
    pub animation: Duration,
    pub overview_zoom: f64,
    pub overview_pitch: f64,
    pub overview_animation: Duration,
    pub overview_pause: Duration,
    pub target_zoom: f64,
    pub target_pitch: f64,
    pub target_bearing_offset: f64,
    pub target_animation: Duration,
    /// Fraction of the target animation after which the marker highlight starts.
    pub highlight_at: f64,
    /// Animation durations are multiplied by this in degraded mode.
    pub degraded_duration_factor: f64,
}

impl CameraConfig {
    pub fn default_camera(&self) -> CameraOptions {
        CameraOptions::centered(self.default_center)
            .with_zoom(self.default_zoom)
            .with_bearing(0.0)
            .with_pitch(0.0)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            // Bengaluru city center.
            default_center: GeoPoint {
                latitude: 12.9716,
                longitude: 77.5946,
            },
            default_zoom: 11.0,
            fit_insets: EdgeInsets::default(),
            single_point_zoom: 15.0,
            min_zoom: 2.0,
            max_zoom: 20.0,
            zoom_step: 1.0,
            bearing_step: 45.0,
            max_pitch: 60.0,
            pitch_tiers: [0.0, 30.0, 60.0],
            animation: Duration::from_millis(500),
            overview_zoom: 12.0,
            overview_pitch: 0.0,
            overview_animation: Duration::from_millis(800),
            overview_pause: Duration::from_millis(300),
            target_zoom: 17.0,
            target_pitch: 60.0,
            target_bearing_offset: 30.0,
            target_animation: Duration::from_millis(1500),
            highlight_at: 0.6,
            degraded_duration_factor: 0.5,
        }
    }
}

/// Orchestrator settings.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub debounce: Duration,
    pub degraded_debounce: Duration,
    pub event_capacity: usize,
    /// Icon image every marker is rendered with.
    pub icon_name: String,
    pub icon_bytes: Vec<u8>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            degraded_debounce: Duration::from_millis(300),
            event_capacity: 256,
            icon_name: "complaint-marker".to_string(),
            icon_bytes: Vec::new(),
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default)]
pub struct MapSyncConfig {
    pub preparer: PreparerConfig,
    pub performance: PerformanceConfig,
    pub backoff: BackoffConfig,
    pub annotations: AnnotationConfig,
    pub camera: CameraConfig,
    pub orchestrator: OrchestratorConfig,
}
