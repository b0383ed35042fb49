use dashmap::DashMap;

use crate::playlist::TransferItem;

/// Batches waiting for a confirmation, one per requester.
///
/// Each `DashMap` operation locks the key's shard, so a listing and a
/// confirmation racing for the same requester never lose an update.
#[derive(Debug, Default)]
pub struct PendingQueue {
    batches: DashMap<String, Vec<TransferItem>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `batch`, replacing any batch already queued for `requester`.
    pub fn put(&self, requester: &str, batch: Vec<TransferItem>) {
        self.batches.insert(requester.to_string(), batch);
    }

    /// Removes and returns the batch queued for `requester`.
    pub fn take(&self, requester: &str) -> Option<Vec<TransferItem>> {
        self.batches.remove(requester).map(|(_, batch)| batch)
    }

    pub fn contains(&self, requester: &str) -> bool {
        self.batches.contains_key(requester)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
