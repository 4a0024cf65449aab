//! Frame-rate monitoring with a hysteresis-guarded degraded mode.
//!
//! The monitor keeps a rolling window of frame durations and publishes a
//! [`PerformanceMode`] through a `watch` channel. Consumers read the current
//! mode synchronously before choosing debounce windows and animation
//! durations; none of them sees the frame samples.
//!
//! - **Normal** -> **Degraded** when the average drops below `degrade_below_fps`.
//! - **Degraded** -> **Normal** when the average climbs above `recover_above_fps`,
//!   or once degraded mode has lasted `min_dwell` and the average is back at
//!   or above `degrade_below_fps`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::PerformanceConfig;

/// Operating mode derived from the observed frame rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    Normal,
    /// Coarser debouncing and shorter animations.
    Degraded,
}

impl std::fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug)]
struct FrameWindow {
    samples: VecDeque<Duration>,
    total: Duration,
    entered_degraded_at: Option<Instant>,
}

/// Read-only view of the current mode, handed to consumers.
#[derive(Clone, Debug)]
pub struct ModeReader {
    receiver: watch::Receiver<PerformanceMode>,
}

impl ModeReader {
    pub fn current(&self) -> PerformanceMode {
        *self.receiver.borrow()
    }

    pub fn is_degraded(&self) -> bool {
        self.current() == PerformanceMode::Degraded
    }

    /// A receiver that is notified on every mode change.
    pub fn watch(&self) -> watch::Receiver<PerformanceMode> {
        self.receiver.clone()
    }

    /// A reader pinned to one mode, for components used without a monitor.
    pub fn fixed(mode: PerformanceMode) -> Self {
        let (_sender, receiver) = watch::channel(mode);
        Self { receiver }
    }
}

/// Samples frame timings and exposes the degraded-mode signal.
pub struct PerformanceMonitor {
    config: PerformanceConfig,
    window: Mutex<FrameWindow>,
    mode: watch::Sender<PerformanceMode>,
}

impl PerformanceMonitor {
    pub fn new(config: PerformanceConfig) -> Self {
        let (mode, _receiver) = watch::channel(PerformanceMode::Normal);
        Self {
            window: Mutex::new(FrameWindow {
                samples: VecDeque::with_capacity(config.window_size),
                total: Duration::ZERO,
                entered_degraded_at: None,
            }),
            config,
            mode,
        }
    }

    fn lock_window(&self) -> MutexGuard<'_, FrameWindow> {
        self.window.lock().unwrap_or_else(|poisoned| {
            warn!("Performance monitor mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn reader(&self) -> ModeReader {
        ModeReader {
            receiver: self.mode.subscribe(),
        }
    }

    pub fn mode(&self) -> PerformanceMode {
        *self.mode.borrow()
    }

    /// Record one rendered frame.
    pub fn record_frame(&self, duration: Duration) -> PerformanceMode {
        self.record_frame_at(duration, Instant::now())
    }

    /// Record one rendered frame observed at `now`.
    pub fn record_frame_at(&self, duration: Duration, now: Instant) -> PerformanceMode {
        let mut window = self.lock_window();

        window.samples.push_back(duration);
        window.total += duration;
        while window.samples.len() > self.config.window_size.max(1) {
            if let Some(evicted) = window.samples.pop_front() {
                window.total -= evicted;
            }
        }

        let current = self.mode();
        if window.samples.len() < self.config.min_samples.max(1) {
            return current;
        }
        let Some(fps) = average_fps(&window) else {
            return current;
        };

        let next = match current {
            PerformanceMode::Normal if fps < self.config.degrade_below_fps => {
                window.entered_degraded_at = Some(now);
                PerformanceMode::Degraded
            }
            PerformanceMode::Degraded => {
                let dwelled = window
                    .entered_degraded_at
                    .map(|since| now.saturating_duration_since(since) >= self.config.min_dwell)
                    .unwrap_or(true);
                let recovered = fps > self.config.recover_above_fps
                    || (dwelled && fps >= self.config.degrade_below_fps);
                if recovered {
                    window.entered_degraded_at = None;
                    PerformanceMode::Normal
                } else {
                    PerformanceMode::Degraded
                }
            }
            PerformanceMode::Normal => PerformanceMode::Normal,
        };
        drop(window);

        if next != current {
            info!(
                "Performance monitor: {} -> {} (average {:.1} fps)",
                current, next, fps
            );
            self.mode.send_replace(next);
        }
        next
    }

    /// Rolling average frames per second, if any frame was recorded.
    pub fn average_fps(&self) -> Option<f64> {
        average_fps(&self.lock_window())
    }

    pub fn sample_count(&self) -> usize {
        self.lock_window().samples.len()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(PerformanceConfig::default())
    }
}

fn average_fps(window: &FrameWindow) -> Option<f64> {
    if window.samples.is_empty() || window.total.is_zero() {
        return None;
    }
    let mean = window.total.as_secs_f64() / window.samples.len() as f64;
    Some(1.0 / mean)
}
