//! End-to-end flows through the orchestrator against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use complaint_map_sync::collaborators::memory::{InMemorySurface, ScriptedFeed, StaticRecordSource};
use complaint_map_sync::{
    CameraConfig, CameraState, ConnectionState, FeedEvent, GeoPoint, MapEvent, MapSyncConfig,
    MapSyncOrchestrator, Navigation, PerformanceMode, RawComplaintRecord, SurfaceEvent, UserNotice,
};
use tokio::sync::broadcast;

struct Harness {
    orchestrator: Arc<MapSyncOrchestrator>,
    surface: Arc<InMemorySurface>,
    source: Arc<StaticRecordSource>,
    feed: Arc<ScriptedFeed>,
    events: broadcast::Receiver<MapEvent>,
}

fn records(count: usize) -> Vec<RawComplaintRecord> {
    (0..count)
        .map(|i| {
            RawComplaintRecord::new(
                format!("c-{i}"),
                12.90 + (i % 100) as f64 * 0.001,
                77.55 + (i / 100) as f64 * 0.001,
            )
            .with_field("category", "pothole")
        })
        .collect()
}

fn harness_with(config: MapSyncConfig, rows: Vec<RawComplaintRecord>) -> Harness {
    let surface = Arc::new(InMemorySurface::new(CameraState {
        center: GeoPoint::new(12.97, 77.59).unwrap(),
        zoom: 11.0,
        bearing: 0.0,
        pitch: 0.0,
    }));
    let source = Arc::new(StaticRecordSource::new(rows));
    let feed = Arc::new(ScriptedFeed::new());
    let orchestrator =
        MapSyncOrchestrator::new(config, surface.clone(), source.clone(), feed.clone());
    let events = orchestrator.subscribe();

    Harness {
        orchestrator,
        surface,
        source,
        feed,
        events,
    }
}

fn harness(rows: Vec<RawComplaintRecord>) -> Harness {
    harness_with(MapSyncConfig::default(), rows)
}

fn drain(events: &mut broadcast::Receiver<MapEvent>) -> Vec<MapEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_initial_load_materializes_and_frames_markers() {
    let mut h = harness(records(40));
    h.orchestrator.start().await.unwrap();
    settle().await;

    assert_eq!(h.surface.annotation_count(), 40);
    assert_eq!(h.orchestrator.markers().len(), 40);
    assert!(h.surface.listeners_attached());

    let index = h.orchestrator.annotations().index();
    assert_eq!(index.len(), 40);
    assert!(index.is_consistent());
    for marker in h.orchestrator.markers().iter() {
        let handle = index.handle_for(&marker.complaint_id).unwrap();
        assert_eq!(index.complaint_for(handle), Some(&marker.complaint_id));
    }

    // Framed on the record bounds, not the default center.
    let camera = h.surface.current_camera();
    assert!((camera.center.latitude - 12.9195).abs() < 1e-6);

    let events = drain(&mut h.events);
    assert!(events.contains(&MapEvent::MarkersUpdated {
        count: 40,
        dropped: 0
    }));
    assert!(events.contains(&MapEvent::ConnectionStateChanged {
        state: ConnectionState::Connected
    }));
    assert_eq!(h.orchestrator.connection_state(), ConnectionState::Connected);

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_camera_burst_coalesces_into_one_resize() {
    let h = harness(records(10));
    h.orchestrator.start().await.unwrap();
    settle().await;
    assert_eq!(h.surface.counts().update_calls, 0);

    for step in 0..10 {
        assert!(h.surface.emit(SurfaceEvent::CameraChanged {
            zoom: 14.0 + step as f64 * 0.1
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.surface.counts().update_calls, 1);
    let handle = h.orchestrator.annotations().handle_for("c-0").unwrap();
    let expected = h.orchestrator.annotations().sizing().size_for_zoom(14.9);
    assert_eq!(h.surface.size_history(handle), vec![expected]);

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_double_tap_runs_one_bounce() {
    let mut h = harness(records(5));
    h.orchestrator.start().await.unwrap();
    settle().await;
    drain(&mut h.events);

    let handle = h.orchestrator.annotations().handle_for("c-3").unwrap();
    assert!(h.surface.emit(SurfaceEvent::AnnotationTapped(handle)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.surface.emit(SurfaceEvent::AnnotationTapped(handle)));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.surface.size_history(handle).len(), 2);
    let taps: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, MapEvent::MarkerTapped { .. }))
        .collect();
    assert_eq!(
        taps,
        vec![
            MapEvent::MarkerTapped {
                complaint_id: "c-3".to_string()
            };
            2
        ]
    );
    assert_eq!(h.orchestrator.selected().as_deref(), Some("c-3"));

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_falls_back_to_default_view() {
    let mut h = harness(records(5));
    h.source.fail_with("network unreachable");

    h.orchestrator.start().await.unwrap();
    settle().await;

    assert_eq!(h.surface.annotation_count(), 0);
    assert_eq!(
        h.surface.camera_log().last().copied(),
        Some(CameraConfig::default().default_camera())
    );
    let events = drain(&mut h.events);
    assert!(events.iter().any(|e| matches!(
        e,
        MapEvent::Notice(UserNotice::FetchFailed { message }) if message.contains("network unreachable")
    )));
    assert!(events.contains(&MapEvent::LoadingStateChanged { loading: false }));

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_total_materialize_failure_falls_back_to_default_view() {
    let mut h = harness(records(5));
    h.surface.reject_all_creates(true);

    h.orchestrator.start().await.unwrap();
    settle().await;

    assert_eq!(
        h.surface.camera_log().last().copied(),
        Some(CameraConfig::default().default_camera())
    );
    let events = drain(&mut h.events);
    assert!(events.contains(&MapEvent::MarkersUpdated {
        count: 0,
        dropped: 5
    }));

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_dispose_mid_materialize_stops_annotation_calls() {
    let h = harness(records(2000));
    h.surface.set_create_latency(Duration::from_millis(100));

    let start = {
        let orchestrator = Arc::clone(&h.orchestrator);
        tokio::spawn(async move { orchestrator.start().await })
    };
    while h.surface.counts().create_calls == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.orchestrator.dispose().await;
    let creates_at_dispose = h.surface.counts().create_calls;
    assert!(creates_at_dispose < 4);

    assert!(start.await.unwrap().is_ok());
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(h.surface.counts().create_calls, creates_at_dispose);
    // The partial set was deleted by teardown, before the surface let go of it.
    assert_eq!(h.surface.counts().delete_calls, 1);
    assert_eq!(h.surface.annotation_count(), 0);
    assert!(h.surface.is_released());
    assert!(!h.feed.is_subscribed());
}

#[tokio::test(start_paused = true)]
async fn test_feed_snapshot_rebuilds_markers() {
    let mut h = harness(records(3));
    h.orchestrator.start().await.unwrap();
    settle().await;
    drain(&mut h.events);

    assert!(h.feed.send(FeedEvent::Snapshot(records(7))));
    settle().await;

    assert_eq!(h.surface.annotation_count(), 7);
    assert_eq!(h.orchestrator.markers().len(), 7);
    assert!(drain(&mut h.events).contains(&MapEvent::MarkersUpdated {
        count: 7,
        dropped: 0
    }));

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_feed_change_triggers_refetch() {
    let h = harness(records(3));
    h.orchestrator.start().await.unwrap();
    settle().await;
    assert_eq!(h.source.fetch_count(), 1);

    h.source.set_records(records(12));
    assert!(h.feed.send(FeedEvent::Changed));
    settle().await;

    assert_eq!(h.source.fetch_count(), 2);
    assert_eq!(h.surface.annotation_count(), 12);

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_closure_reconnects_with_backoff() {
    let mut h = harness(records(3));
    h.orchestrator.start().await.unwrap();
    settle().await;
    drain(&mut h.events);

    assert!(h.feed.close_abnormally());
    settle().await;
    assert_eq!(
        h.orchestrator.connection_state(),
        ConnectionState::retrying(1, Duration::from_secs(2))
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.orchestrator.connection_state(), ConnectionState::Connected);
    assert_eq!(h.feed.subscribe_count(), 2);

    let states: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            MapEvent::ConnectionStateChanged { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(states.first(), Some(&ConnectionState::retrying(1, Duration::from_secs(2))));
    assert_eq!(states.last(), Some(&ConnectionState::Connected));

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_selection_survives_refresh() {
    let h = harness(records(4));
    h.orchestrator.start().await.unwrap();
    settle().await;

    assert_eq!(
        h.orchestrator.navigate(Navigation::Next).await.as_deref(),
        Some("c-0")
    );
    assert_eq!(
        h.orchestrator.navigate(Navigation::Next).await.as_deref(),
        Some("c-1")
    );

    h.source.set_records(records(6));
    h.orchestrator.refresh().await.unwrap();
    assert_eq!(h.orchestrator.selected().as_deref(), Some("c-1"));
    assert_eq!(
        h.orchestrator.navigate(Navigation::Next).await.as_deref(),
        Some("c-2")
    );

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_frames_enter_degraded_mode() {
    let mut h = harness(records(2));
    h.orchestrator.start().await.unwrap();
    settle().await;
    drain(&mut h.events);

    for _ in 0..40 {
        h.surface
            .emit(SurfaceEvent::FrameRendered(Duration::from_millis(40)));
    }
    settle().await;

    assert_eq!(h.orchestrator.performance_mode(), PerformanceMode::Degraded);
    assert!(drain(&mut h.events).contains(&MapEvent::PerformanceModeChanged {
        mode: PerformanceMode::Degraded
    }));

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_view_frames_current_markers() {
    let h = harness(records(30));
    h.orchestrator.start().await.unwrap();
    settle().await;

    h.orchestrator.zoom_in().await;
    h.orchestrator.rotate_right().await;
    let moved = h.surface.current_camera();
    assert_eq!(moved.bearing, 45.0);

    h.orchestrator.reset_view().await;
    let camera = h.surface.current_camera();
    assert_ne!(camera.zoom, moved.zoom);
    assert!((camera.center.latitude - 12.9145).abs() < 1e-6);

    h.orchestrator.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_view_failure_emits_notice() {
    let mut h = harness(records(3));
    h.orchestrator.start().await.unwrap();
    settle().await;
    drain(&mut h.events);

    h.surface.fail_camera(true);
    h.orchestrator.reset_view().await;

    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, MapEvent::Notice(UserNotice::ResetViewFailed { .. }))));

    h.orchestrator.dispose().await;
}
