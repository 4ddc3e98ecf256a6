use crate::fetcher::NodeRecord;
use crate::node::NodeId;
use crate::storage::traits::{NodeSink, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process sink keeping the latest record per node
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<BTreeMap<NodeId, NodeRecord>>,
    upserts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored record for a node
    pub fn get(&self, id: NodeId) -> Option<NodeRecord> {
        self.records.lock().ok()?.get(&id).cloned()
    }

    /// Number of distinct nodes stored
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of upsert calls, including repeats for the same id
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::Relaxed)
    }

    /// Ids of all stored nodes, ascending
    pub fn ids(&self) -> Vec<NodeId> {
        self.records
            .lock()
            .map(|r| r.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl NodeSink for MemorySink {
    fn upsert(&self, record: NodeRecord) -> StorageResult<()> {
        let mut records = self.records.lock().map_err(|_| StorageError::LockPoisoned)?;
        records.insert(record.id, record);
        self.upserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
