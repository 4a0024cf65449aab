//! Session orchestration and the events it exposes to the UI.
//!
//! - `engine` - [`MapSyncOrchestrator`]: initialization, live updates,
//!   debounced resizes, UI commands and disposal
//! - `events` - [`MapEvent`] and the broadcast [`MapEventBus`]

mod engine;
mod events;

pub use engine::{MapSyncOrchestrator, Navigation};
pub use events::{MapEvent, MapEventBus, UserNotice};
