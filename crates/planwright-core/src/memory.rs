//! Working memory shared by every step of one plan execution.
//!
//! A single unversioned key/value map. Cloning a `WorkingMemory` yields another
//! handle to the same map. Each write is atomic per key, but there is no
//! ordering between concurrent writers: under the parallel model two steps
//! writing the same key race, and whichever write lands last wins.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    entries: Arc<DashMap<String, Value>>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the one it replaced.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_the_same_map() {
        let memory = WorkingMemory::new();
        let handle = memory.clone();
        handle.set("topic", json!("rust"));
        assert_eq!(memory.get("topic"), Some(json!("rust")));
    }

    #[test]
    fn last_write_wins() {
        let memory = WorkingMemory::new();
        assert_eq!(memory.set("k", json!(1)), None);
        assert_eq!(memory.set("k", json!(2)), Some(json!(1)));
        assert_eq!(memory.get("k"), Some(json!(2)));
    }

    #[test]
    fn snapshot_is_detached() {
        let memory = WorkingMemory::new();
        memory.set("a", json!(true));
        let snap = memory.snapshot();
        memory.set("b", json!(false));
        assert_eq!(snap.len(), 1);
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.remove("a"), Some(json!(true)));
        assert!(!memory.contains("a"));
    }
}
