//! Error types and recovery classification for the map sync engine.
//!
//! This module provides:
//! - [`MapSyncError`]: The main error enum for all engine operations
//! - [`SurfaceError`]: Failures reported by the rendering surface
//! - [`RecoveryAction`]: Classification for determining how a failure is handled

mod recovery;

pub use recovery::RecoveryAction;

use thiserror::Error;

/// Type alias for Result using [`MapSyncError`].
pub type Result<T> = std::result::Result<T, MapSyncError>;

/// WebSocket-style close code reported by the live feed for an abnormal closure.
pub const ABNORMAL_CLOSURE_CODE: u16 = 1006;

/// Errors reported by a rendering-surface call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// The surface was disposed while the call was in flight.
    #[error("Rendering surface disposed")]
    Disposed,

    /// The surface rejected the geometry of an annotation or camera target.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Any other failure reported by the surface.
    #[error("Surface rejected call: {0}")]
    Rejected(String),
}

/// Errors that can occur while synchronizing markers with the map.
#[derive(Error, Debug)]
pub enum MapSyncError {
    /// The initial or refresh fetch of complaint records failed.
    #[error("Failed to fetch complaint records: {0}")]
    DataFetch(String),

    /// No annotation could be created for a non-empty descriptor set.
    #[error("Failed to materialize markers: none of {requested} created")]
    MarkerMaterialization {
        /// Number of descriptors handed to the lifecycle manager.
        requested: usize,
    },

    /// A camera command failed. The camera state does not change.
    #[error("Camera operation failed: {0}")]
    CameraOperation(String),

    /// The live feed disconnected.
    #[error("Live feed disconnected (code {code:?})")]
    FeedDisconnection {
        /// Close code reported by the feed, if any.
        code: Option<u16>,
    },

    /// A rendering-surface call failed outside of a batch.
    #[error("Rendering surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// The orchestrator was disposed while the operation was running.
    #[error("Map sync disposed")]
    Disposed,
}

impl MapSyncError {
    /// Returns the recovery classification for this error.
    ///
    /// ```
    /// use complaint_map_sync::errors::{MapSyncError, RecoveryAction};
    ///
    /// let error = MapSyncError::DataFetch("timeout".to_string());
    /// assert_eq!(error.recovery_action(), RecoveryAction::FallbackToDefaultView);
    ///
    /// let error = MapSyncError::FeedDisconnection { code: Some(1006) };
    /// assert_eq!(error.recovery_action(), RecoveryAction::Backoff);
    /// ```
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            Self::DataFetch(_) | Self::MarkerMaterialization { .. } => {
                RecoveryAction::FallbackToDefaultView
            }

            Self::FeedDisconnection { .. } => RecoveryAction::Backoff,

            Self::CameraOperation(_) | Self::Surface(_) => RecoveryAction::Ignore,

            Self::Disposed => RecoveryAction::Abort,
        }
    }

    /// Returns true if this error only means the engine was shut down.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed | Self::Surface(SurfaceError::Disposed))
    }
}
