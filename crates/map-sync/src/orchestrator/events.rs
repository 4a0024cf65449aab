use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{ComplaintId, ConnectionState};
use crate::performance::PerformanceMode;

/// Transient message for a banner or snackbar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserNotice {
    /// Records could not be loaded; the map shows the default view.
    FetchFailed { message: String },
    /// No marker could be placed on the map; the map shows the default view.
    MarkersUnavailable { message: String },
    /// The camera could not be reset to the marker bounds.
    ResetViewFailed { message: String },
    /// The live feed gave up reconnecting; a manual reconnect is required.
    LiveUpdatesUnavailable,
}

/// Events the orchestrator exposes to the UI layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MapEvent {
    MarkerTapped { complaint_id: ComplaintId },
    ConnectionStateChanged { state: ConnectionState },
    LoadingStateChanged { loading: bool },
    MarkersUpdated { count: usize, dropped: usize },
    PerformanceModeChanged { mode: PerformanceMode },
    Notice(UserNotice),
}

/// Broadcast bus fanning map events out to every listener.
#[derive(Clone)]
pub struct MapEventBus {
    sender: broadcast::Sender<MapEvent>,
}

impl MapEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: MapEvent) {
        // No listener or a lagging listener never blocks the engine.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = MapEvent::MarkerTapped {
            complaint_id: "c-7".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "marker_tapped");
        assert_eq!(json["payload"]["complaint_id"], "c-7");

        let event = MapEvent::ConnectionStateChanged {
            state: ConnectionState::Retrying {
                attempt: 2,
                delay_ms: 4000,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["state"]["state"], "retrying");
        assert_eq!(json["payload"]["state"]["delay_ms"], 4000);
    }

    #[tokio::test]
    async fn test_publish_without_listeners_is_harmless() {
        let bus = MapEventBus::new(4);
        bus.publish(MapEvent::LoadingStateChanged { loading: true });

        let mut rx = bus.subscribe();
        bus.publish(MapEvent::LoadingStateChanged { loading: false });
        assert_eq!(
            rx.recv().await.unwrap(),
            MapEvent::LoadingStateChanged { loading: false }
        );
    }
}
