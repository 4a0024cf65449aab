//! Live-feed connection supervision.
//!
//! This module provides:
//! - [`BackoffPolicy`]: Exponential reconnect delays with an optional cap on attempts
//! - [`ConnectionSupervisor`]: The subscribe/reconnect state machine
//! - [`FeedUpdate`]: Record changes forwarded to the orchestrator

mod backoff;
mod supervisor;

pub use backoff::BackoffPolicy;
pub use supervisor::{ConnectionSupervisor, FeedUpdate};
