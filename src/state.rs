// MIT License - Copyright (c) 2026 Peter Wright
// Zone and partition state model

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::devices::{ArmingState, Partition, Zone};

/// In-memory zones and partitions, keyed by id.
///
/// Written only by the dispatcher running on the supervisor task; any number
/// of readers may take snapshots concurrently. Locks are never held across an
/// await point or while subscribers are notified.
#[derive(Debug, Default)]
pub struct PanelState {
    zones: RwLock<BTreeMap<u32, Zone>>,
    partitions: RwLock<BTreeMap<u32, Partition>>,
}

impl PanelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone(&self, id: u32) -> Option<Zone> {
        self.zones.read().unwrap_or_else(PoisonError::into_inner).get(&id).copied()
    }

    /// Snapshot of all known zones, ordered by id.
    pub fn zones(&self) -> Vec<Zone> {
        self.zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .copied()
            .collect()
    }

    pub fn partition(&self, id: u32) -> Option<Partition> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot of all known partitions, ordered by id.
    pub fn partitions(&self) -> Vec<Partition> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Set a zone's raw state. Returns `true` if the zone was unseen.
    pub(crate) fn upsert_zone(&self, id: u32, open: bool) -> bool {
        let mut zones = self.zones.write().unwrap_or_else(PoisonError::into_inner);
        match zones.get_mut(&id) {
            Some(zone) => {
                zone.open = open;
                false
            }
            None => {
                zones.insert(id, Zone::new(id, open));
                true
            }
        }
    }

    /// Apply `update` to a partition, creating it from `create` first if it
    /// is unseen. Returns `true` if the partition was created.
    pub(crate) fn upsert_partition(
        &self,
        id: u32,
        create: impl FnOnce() -> Partition,
        update: impl FnOnce(&mut Partition),
    ) -> bool {
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        let mut created = false;
        let partition = partitions.entry(id).or_insert_with(|| {
            created = true;
            create()
        });
        update(partition);
        created
    }

    /// Create a placeholder (disarmed, not ready) partition if none exists.
    /// Returns `true` if it was created.
    pub(crate) fn ensure_partition(&self, id: u32) -> bool {
        self.upsert_partition(id, || Partition::new(id, ArmingState::Disarmed, false), |_| {})
    }
}
