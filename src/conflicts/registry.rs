use dashmap::DashMap;

use super::types::ConflictRecord;

/// Process-local view of every in-flight conflict in the cluster.
///
/// Every node holds a copy of every record; only the owner drives state
/// transitions, peers just mirror them.
pub struct ConflictRegistry {
    items: DashMap<String, ConflictRecord>,
}

impl ConflictRegistry {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Inserts a record unless one with the same id already exists.
    /// Duplicate raises are no-ops.
    pub fn upsert(&self, record: ConflictRecord) {
        if self.items.contains_key(&record.id) {
            return;
        }
        self.items.insert(record.id.clone(), record);
    }

    /// Marks a record resolved. Returns false when the id is unknown here,
    /// which callers treat as a no-op rather than an error.
    pub fn mark_resolved(&self, id: &str) -> bool {
        match self.items.get_mut(id) {
            Some(mut record) => {
                record.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Deletes a record. Returns false when the id is unknown here.
    pub fn remove(&self, id: &str) -> bool {
        self.items.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<ConflictRecord> {
        self.items.get(id).map(|record| record.clone())
    }

    pub fn all(&self) -> Vec<ConflictRecord> {
        self.items.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Unresolved records raised by the named node. The health monitor uses
    /// this to decide whether this node may call itself healthy.
    pub fn own_unresolved(&self, node_name: &str) -> Vec<ConflictRecord> {
        self.items
            .iter()
            .filter(|entry| !entry.value().resolved && entry.value().node_name == node_name)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Resolved records raised by the named node, candidates for cleanup.
    pub fn own_resolved(&self, node_name: &str) -> Vec<ConflictRecord> {
        self.items
            .iter()
            .filter(|entry| entry.value().resolved && entry.value().node_name == node_name)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Default for ConflictRegistry {
    fn default() -> Self {
        Self::new()
    }
}
