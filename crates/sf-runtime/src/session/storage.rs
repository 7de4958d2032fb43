use std::collections::BTreeMap;

use serde_json::Value;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq)]
struct StoredEntry {
    value: Value,
    clear_after_read: bool,
}

/// Namespaced key/value area, separate from the free-form `data` tier.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    namespaces: BTreeMap<String, BTreeMap<String, StoredEntry>>,
}

impl SessionStorage {
    pub fn write(&mut self, namespace: &str, key: &str, value: Value, clear_after_read: bool) {
        self.namespaces.entry(namespace.to_string()).or_default().insert(
            key.to_string(),
            StoredEntry {
                value,
                clear_after_read,
            },
        );
    }

    /// Entries written with `clear_after_read` are removed by their first
    /// read, as is any entry read with `consume`.
    pub fn read(&mut self, namespace: &str, key: &str, consume: bool) -> Option<Value> {
        let entries = self.namespaces.get_mut(namespace)?;
        let entry = entries.get(key)?;
        if consume || entry.clear_after_read {
            let value = entries.remove(key).map(|entry| entry.value);
            if entries.is_empty() {
                self.namespaces.remove(namespace);
            }
            return value;
        }
        Some(entry.value.clone())
    }

    pub fn remove(&mut self, namespace: &str, key: &str) -> Option<Value> {
        self.namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
