/// How the orchestrator responds to an error.
///
/// # Behavior Summary
///
/// | Action | Surfaced to the user? | Camera affected? |
/// |--------|-----------------------|------------------|
/// | `FallbackToDefaultView` | Yes (transient notice) | Reset to default view |
/// | `Backoff` | Only via connection status | No |
/// | `Ignore` | No | No |
/// | `Abort` | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecoveryAction {
    /// Data could not be loaded or no marker could be created.
    /// Frame the default camera and show a transient notice.
    FallbackToDefaultView,

    /// The live feed dropped. The connection supervisor schedules a
    /// reconnect with exponential backoff.
    Backoff,

    /// Logged and otherwise ignored. Used for camera commands: the camera
    /// simply does not move.
    Ignore,

    /// The orchestrator is disposed. The operation stops without side effects.
    Abort,
}
