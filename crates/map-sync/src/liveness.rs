//! Terminal flag shared by every component of one map session.
//!
//! Each async operation captures a clone at its start and checks it after
//! every suspension point. Once disposed, the flag never flips back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{MapSyncError, Result};

#[derive(Clone, Debug, Default)]
pub struct Liveness {
    disposed: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        !self.disposed.load(Ordering::Acquire)
    }

    /// Returns `Err(MapSyncError::Disposed)` once the session is disposed.
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(MapSyncError::Disposed)
        }
    }

    /// Sets the terminal flag. Returns true only for the call that flipped it.
    pub fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}
