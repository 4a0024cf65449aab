use std::time::Duration;

use serde::Serialize;

/// State of the live-feed connection supervisor.
///
/// ```text
/// Idle -> Connecting -> Connected -> Retrying(attempt, delay) -> Connecting -> Connected
///                                                            \-> PermanentlyFailed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ConnectionState {
    /// Not subscribed.
    Idle,
    /// A subscribe call is in flight.
    Connecting,
    /// The feed is live.
    Connected,
    /// Waiting `delay_ms` before reconnect attempt number `attempt`.
    Retrying { attempt: u32, delay_ms: u64 },
    /// The attempt budget is exhausted. Only a manual reconnect leaves this state.
    PermanentlyFailed,
}

impl ConnectionState {
    pub fn retrying(attempt: u32, delay: Duration) -> Self {
        Self::Retrying {
            attempt,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Backoff delay while retrying.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Retrying { delay_ms, .. } => Some(Duration::from_millis(*delay_ms)),
            _ => None,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            // Stopping is always allowed.
            (_, Idle) => true,
            (Idle | Retrying { .. } | PermanentlyFailed | Connected, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting | Connected | Retrying { .. }, Retrying { .. }) => true,
            (Connecting | Connected | Retrying { .. }, PermanentlyFailed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Retrying { attempt, delay_ms } => {
                write!(f, "retrying (attempt {attempt}, in {delay_ms}ms)")
            }
            Self::PermanentlyFailed => write!(f, "permanently failed"),
        }
    }
}
