use std::collections::HashMap;

use crate::models::{AnnotationHandle, ComplaintId};

/// Bijective complaint id <-> annotation handle maps.
///
/// Both directions are always updated together, so `by_handle` is the exact
/// inverse of `by_id`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HandleIndex {
    by_id: HashMap<ComplaintId, AnnotationHandle>,
    by_handle: HashMap<AnnotationHandle, ComplaintId>,
}

impl HandleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pair, evicting any previous pair that shared the id or the handle.
    pub fn insert(&mut self, id: ComplaintId, handle: AnnotationHandle) {
        if let Some(previous) = self.by_id.remove(&id) {
            self.by_handle.remove(&previous);
        }
        if let Some(previous) = self.by_handle.remove(&handle) {
            self.by_id.remove(&previous);
        }
        self.by_id.insert(id.clone(), handle);
        self.by_handle.insert(handle, id);
    }

    pub fn handle_for(&self, id: &str) -> Option<AnnotationHandle> {
        self.by_id.get(id).copied()
    }

    pub fn complaint_for(&self, handle: AnnotationHandle) -> Option<&ComplaintId> {
        self.by_handle.get(&handle)
    }

    pub fn contains_handle(&self, handle: AnnotationHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    /// All live handles, in ascending order.
    pub fn handles(&self) -> Vec<AnnotationHandle> {
        let mut handles: Vec<_> = self.by_handle.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// True when the two maps are exact inverses of each other.
    pub fn is_consistent(&self) -> bool {
        self.by_id.len() == self.by_handle.len()
            && self
                .by_id
                .iter()
                .all(|(id, handle)| self.by_handle.get(handle) == Some(id))
    }
}
