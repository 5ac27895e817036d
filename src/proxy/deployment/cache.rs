use dashmap::DashMap;

use super::DeploymentRecord;

/// Process-lifetime memo of positive discovery results, keyed by manifest id.
///
/// Inserts are monotonic: entries are never evicted or invalidated. Concurrent
/// first lookups may both insert; the last writer wins and the entry stays whole.
#[derive(Default)]
pub struct DeploymentCache {
    entries: DashMap<String, DeploymentRecord>,
}

impl DeploymentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, manifest_id: &str) -> Option<DeploymentRecord> {
        self.entries.get(manifest_id).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, record: DeploymentRecord) {
        self.entries.insert(record.manifest_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
