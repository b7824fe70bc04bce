//! Concurrently readable store of the latest health record per cluster.
//!
//! One reader/writer lock guards the whole mapping. Entries are small and
//! writes happen once per cluster per pass, so per-entry locking is not worth
//! it at fleet sizes in the tens-to-low-hundreds of clusters.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
};

use fleet_model::{ClusterId, HealthRecord};

#[derive(Clone, Default)]
pub struct HealthCache {
    inner: Arc<RwLock<HashMap<ClusterId, HealthRecord>>>,
}

impl HealthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the cached record, or a synthesized `Unknown` one.
    pub fn get(&self, cluster: &ClusterId) -> HealthRecord {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(cluster)
            .cloned()
            .unwrap_or_else(|| HealthRecord::unknown(cluster.clone()))
    }

    /// Replaces the record of `record.cluster` wholesale.
    pub fn update(&self, record: HealthRecord) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(record.cluster.clone(), record);
    }

    /// Drops records of clusters not in `known`. Returns how many were removed.
    pub fn retain_known(&self, known: &[ClusterId]) -> usize {
        let known: HashSet<&ClusterId> = known.iter().collect();
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|id, _| known.contains(id));
        before - map.len()
    }

    /// All cached records, sorted by cluster id.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<HealthRecord> = map.values().cloned().collect();
        out.sort_by(|a, b| a.cluster.cmp(&b.cluster));
        out
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
