//! Collaborators the engine consumes.
//!
//! This module contains:
//! - The `RenderingSurface`, `RecordSource` and `LiveFeed` traits the core
//!   talks to
//! - In-memory implementations of all three for tests and the simulator
//!
//! The core never reaches past these traits: tile rendering, gestures and
//! projection math stay behind `RenderingSurface`, transport details stay
//! behind `RecordSource` and `LiveFeed`.

pub mod memory;
mod traits;

pub use traits::{
    AnnotationUpdate, FeedEvent, FeedSubscription, LiveFeed, RecordSource, RenderingSurface,
    SurfaceEvent,
};
