use serde::{Deserialize, Serialize};

/// Unique identifier of a complaint record.
pub type ComplaintId = String;

/// Opaque handle returned by the rendering surface for a live annotation.
///
/// Handles are only ever stored by the annotation lifecycle manager.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AnnotationHandle(u64);

impl AnnotationHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AnnotationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "annotation#{}", self.0)
    }
}
