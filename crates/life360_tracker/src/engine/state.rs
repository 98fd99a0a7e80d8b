use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Entity id -> last written state.
pub type States = BTreeMap<String, serde_json::Value>;

/// Centralized snapshot of every entity's written state.
///
/// This is what the host renders; an entity's state only changes here when
/// the entity accepts an update.
#[derive(Debug, Default)]
pub struct StateStore {
    states: ArcSwap<States>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all states.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn snapshot(&self) -> Arc<States> {
        self.states.load_full()
    }

    pub fn get(&self, entity_id: &str) -> Option<serde_json::Value> {
        self.states.load().get(entity_id).cloned()
    }

    pub fn write(&self, entity_id: &str, state: serde_json::Value) {
        self.states.rcu(|states| {
            let mut states = States::clone(states);
            states.insert(entity_id.to_string(), state.clone());
            states
        });
    }

    pub fn remove(&self, entity_id: &str) {
        self.states.rcu(|states| {
            let mut states = States::clone(states);
            states.remove(entity_id);
            states
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_write_and_remove() {
        let store = StateStore::new();
        let before = store.snapshot();

        store.write("device_tracker.al", json!({"latitude": 1.0}));
        assert_eq!(store.get("device_tracker.al").unwrap()["latitude"], 1.0);
        assert!(before.is_empty());

        store.write("device_tracker.al", json!({"latitude": 2.0}));
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.get("device_tracker.al").unwrap()["latitude"], 2.0);

        store.remove("device_tracker.al");
        assert!(store.get("device_tracker.al").is_none());
    }
}
