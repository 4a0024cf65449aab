//! Marker data preparation.
//!
//! Turns raw complaint rows into validated [`MarkerDescriptor`]s plus an
//! id → source index map. Small inputs are prepared inline; larger inputs are
//! moved onto a bounded pool of blocking workers so the event loop never runs
//! CPU-bound work over the threshold.
//!
//! Workers only receive owned copies of their inputs and hand back a single
//! [`PreparedMarkers`] value. Nothing a worker does can fail the caller: a
//! worker that dies yields an empty result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::Semaphore;

use crate::config::PreparerConfig;
use crate::models::{
    ComplaintId, ComplaintRecord, IconImage, MarkerDescriptor, RawComplaintRecord, RecordRejection,
};

/// Diagnostics for one preparation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreparationStats {
    pub total: usize,
    pub accepted: usize,
    pub missing_id: usize,
    pub invalid_coordinates: usize,
    pub duplicate_id: usize,
}

impl PreparationStats {
    /// Number of rows that did not become a descriptor.
    pub fn dropped(&self) -> usize {
        self.total - self.accepted
    }
}

/// Output of a preparation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreparedMarkers {
    /// Descriptors in input order, with dropped rows removed.
    pub descriptors: Vec<MarkerDescriptor>,
    /// Position of each accepted complaint in the input list.
    pub source_index: HashMap<ComplaintId, usize>,
    pub stats: PreparationStats,
}

impl PreparedMarkers {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Prepares marker descriptors, inline or on a worker depending on input size.
pub struct MarkerDataPreparer {
    config: PreparerConfig,
    workers: Arc<Semaphore>,
}

impl MarkerDataPreparer {
    pub fn new(config: PreparerConfig) -> Self {
        let permits = config.max_workers.max(1);
        Self {
            config,
            workers: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Whether an input of `len` rows is routed to a worker.
    pub fn uses_worker(&self, len: usize) -> bool {
        len >= self.config.worker_threshold
    }

    /// Prepare descriptors for `records`, each created with `icon_size`.
    pub async fn prepare(
        &self,
        records: Vec<RawComplaintRecord>,
        icon: &IconImage,
        icon_size: f64,
    ) -> PreparedMarkers {
        if !self.uses_worker(records.len()) {
            return prepare_markers(records, Arc::new(icon.clone()), icon_size);
        }

        let permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Preparation worker pool closed, dropping {} records", records.len());
                return PreparedMarkers::default();
            }
        };

        let icon = icon.clone();
        let total = records.len();
        debug!("Preparing {} records on a worker", total);

        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            prepare_markers(records, Arc::new(icon), icon_size)
        })
        .await;

        match joined {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("Preparation worker failed for {} records: {}", total, e);
                PreparedMarkers {
                    stats: PreparationStats {
                        total,
                        ..PreparationStats::default()
                    },
                    ..PreparedMarkers::default()
                }
            }
        }
    }
}

impl Default for MarkerDataPreparer {
    fn default() -> Self {
        Self::new(PreparerConfig::default())
    }
}

/// The pure transform shared by the inline and worker paths.
pub fn prepare_markers(
    records: Vec<RawComplaintRecord>,
    icon: Arc<IconImage>,
    icon_size: f64,
) -> PreparedMarkers {
    let mut stats = PreparationStats {
        total: records.len(),
        ..PreparationStats::default()
    };
    let mut descriptors = Vec::with_capacity(records.len());
    let mut source_index = HashMap::with_capacity(records.len());
    let mut seen: HashSet<ComplaintId> = HashSet::with_capacity(records.len());

    for (index, raw) in records.into_iter().enumerate() {
        let record = match ComplaintRecord::try_from(raw) {
            Ok(record) => record,
            Err(RecordRejection::MissingId) => {
                stats.missing_id += 1;
                continue;
            }
            Err(RecordRejection::InvalidCoordinates) => {
                stats.invalid_coordinates += 1;
                continue;
            }
        };

        // First occurrence wins.
        if !seen.insert(record.id().to_string()) {
            stats.duplicate_id += 1;
            continue;
        }

        let (complaint_id, location, payload) = record.into_parts();
        source_index.insert(complaint_id.clone(), index);
        descriptors.push(MarkerDescriptor {
            complaint_id,
            location,
            icon_size,
            icon: Arc::clone(&icon),
            payload,
        });
    }

    stats.accepted = descriptors.len();
    if stats.dropped() > 0 {
        warn!(
            "Dropped {} of {} complaint records (missing id: {}, invalid coordinates: {}, duplicate id: {})",
            stats.dropped(),
            stats.total,
            stats.missing_id,
            stats.invalid_coordinates,
            stats.duplicate_id
        );
    }

    PreparedMarkers {
        descriptors,
        source_index,
        stats,
    }
}
