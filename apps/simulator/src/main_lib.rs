use std::sync::Arc;
use std::time::Duration;

use complaint_map_sync::collaborators::memory::{
    InMemorySurface, ScriptedFeed, StaticRecordSource, SubscribeOutcome,
};
use complaint_map_sync::{
    CameraConfig, CameraState, FeedEvent, MapEvent, MapSyncOrchestrator, Navigation,
    RawComplaintRecord, SurfaceEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,complaint_map_sync=debug";

const CATEGORIES: [&str; 5] = ["pothole", "streetlight", "garbage", "water-leak", "encroachment"];
const STATUSES: [&str; 3] = ["open", "in-progress", "resolved"];

/// Installs the global subscriber. Engine logs arrive through the `log` bridge.
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Text => builder.compact().try_init(),
    };
    if let Err(e) = installed {
        eprintln!("Tracing subscriber already installed: {e}");
    }
}

/// Synthetic complaints scattered around the default city center.
///
/// Roughly one row in fifty is malformed, to exercise validation.
pub fn synthetic_records(count: usize, rng: &mut impl Rng) -> Vec<RawComplaintRecord> {
    let center = CameraConfig::default().default_center;
    (0..count)
        .map(|i| {
            let id = format!("CMP-{:05}", i + 1);
            let latitude = center.latitude + rng.gen_range(-0.12..0.12);
            let longitude = center.longitude + rng.gen_range(-0.12..0.12);
            let record = match rng.gen_range(0..50) {
                0 => RawComplaintRecord::new(id, "unknown", longitude),
                1 => RawComplaintRecord::new("", latitude, longitude),
                // Some sources send coordinates as strings.
                2..=9 => RawComplaintRecord::new(
                    id,
                    latitude.to_string().as_str(),
                    longitude.to_string().as_str(),
                ),
                _ => RawComplaintRecord::new(id, latitude, longitude),
            };
            record
                .with_field("category", CATEGORIES[rng.gen_range(0..CATEGORIES.len())])
                .with_field("status", STATUSES[rng.gen_range(0..STATUSES.len())])
        })
        .collect()
}

/// Collaborators and the orchestrator for one simulated map screen.
pub struct Simulation {
    pub orchestrator: Arc<MapSyncOrchestrator>,
    pub surface: Arc<InMemorySurface>,
    pub source: Arc<StaticRecordSource>,
    pub feed: Arc<ScriptedFeed>,
    record_count: usize,
}

pub fn build_simulation(config: &Config) -> Simulation {
    let mut rng = StdRng::from_entropy();
    let camera = CameraConfig::default();
    let surface = Arc::new(InMemorySurface::new(CameraState {
        center: camera.default_center,
        zoom: camera.default_zoom,
        bearing: 0.0,
        pitch: 0.0,
    }));
    let source = Arc::new(StaticRecordSource::new(synthetic_records(
        config.record_count,
        &mut rng,
    )));
    let feed = Arc::new(ScriptedFeed::new());
    let orchestrator = MapSyncOrchestrator::new(
        config.map_sync_config(),
        surface.clone(),
        source.clone(),
        feed.clone(),
    );

    Simulation {
        orchestrator,
        surface,
        source,
        feed,
        record_count: config.record_count,
    }
}

impl Simulation {
    /// Logs every map event until the bus closes.
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut events = self.orchestrator.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event logger lagged, skipped {} events", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Emits ~60 fps frame timings with occasional slow stretches.
    pub fn spawn_frames(&self) -> JoinHandle<()> {
        let surface = Arc::clone(&self.surface);
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(Duration::from_millis(16));
            let mut frame: u64 = 0;
            loop {
                ticker.tick().await;
                frame += 1;
                // Every ~10 s, render slowly for ~3 s.
                let slow = frame % 600 > 420;
                let millis = if slow {
                    rng.gen_range(28..40)
                } else {
                    rng.gen_range(12..18)
                };
                if !surface.emit(SurfaceEvent::FrameRendered(Duration::from_millis(millis))) {
                    break;
                }
            }
        })
    }

    /// Pinch gestures: bursts of camera changes every couple of seconds.
    pub fn spawn_gestures(&self) -> JoinHandle<()> {
        let surface = Arc::clone(&self.surface);
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            loop {
                tokio::time::sleep(Duration::from_secs(2)).await;
                let start = surface.current_camera().zoom;
                let target = rng.gen_range(9.0..19.0);
                for step in 1..=12 {
                    let zoom = start + (target - start) * step as f64 / 12.0;
                    if !surface.emit(SurfaceEvent::CameraChanged { zoom }) {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(16)).await;
                }
            }
        })
    }

    /// Taps random markers and steps through them like a user would.
    pub fn spawn_user(&self) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let surface = Arc::clone(&self.surface);
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut round: u32 = 0;
            while !orchestrator.is_disposed() {
                tokio::time::sleep(Duration::from_secs(3)).await;
                round += 1;

                let markers = orchestrator.markers();
                if markers.is_empty() {
                    continue;
                }
                let pick = &markers[rng.gen_range(0..markers.len())];
                if let Some(handle) = orchestrator.annotations().handle_for(&pick.complaint_id) {
                    surface.emit(SurfaceEvent::AnnotationTapped(handle));
                }

                match round % 4 {
                    0 => {
                        orchestrator.navigate(Navigation::Next).await;
                    }
                    1 => orchestrator.rotate_right().await,
                    2 => orchestrator.increase_pitch().await,
                    _ => orchestrator.reset_view().await,
                }
            }
        })
    }

    /// Live feed traffic: snapshots, change notifications and abnormal closures.
    pub fn spawn_feed(&self) -> JoinHandle<()> {
        let feed = Arc::clone(&self.feed);
        let source = Arc::clone(&self.source);
        let record_count = self.record_count;
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut tick: u32 = 0;
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                tick += 1;

                let count = rng.gen_range(record_count * 9 / 10..=record_count * 11 / 10);
                let records = synthetic_records(count, &mut rng);
                match tick % 3 {
                    0 => {
                        // Every other drop, the first reconnect attempt fails too.
                        if tick % 2 == 0 {
                            feed.push_outcome(SubscribeOutcome::Reject(
                                "network unreachable".to_string(),
                            ));
                        }
                        tracing::info!("Simulated network drop");
                        feed.close_abnormally();
                    }
                    1 => {
                        feed.send(FeedEvent::Snapshot(records));
                    }
                    _ => {
                        source.set_records(records);
                        feed.send(FeedEvent::Changed);
                    }
                }
            }
        })
    }
}

fn log_event(event: &MapEvent) {
    match serde_json::to_string(event) {
        Ok(json) => tracing::info!(target: "map_events", "{}", json),
        Err(e) => tracing::warn!("Could not serialize map event {:?}: {}", event, e),
    }
}
