use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;
use sf_core::ValueMap;

const CALLBACK_PREFIX: &str = "cb:";

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackEntry {
    pub session_id: String,
    pub graph: Value,
    pub params: ValueMap,
}

/// Inline-choice ids mapped to the graph a button press should run.
///
/// Ids are monotonically increasing integers, so the oldest entries are the
/// smallest keys. When the table is full the oldest half is dropped in one
/// go. This is deliberately simple and not an LRU: a button on an old message
/// may stop working after enough newer buttons were emitted.
#[derive(Debug)]
pub struct CallbackTable {
    capacity: usize,
    inner: Mutex<CallbackSlots>,
}

#[derive(Debug, Default)]
struct CallbackSlots {
    next_id: u64,
    entries: BTreeMap<u64, CallbackEntry>,
}

impl CallbackTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            inner: Mutex::new(CallbackSlots::default()),
        }
    }

    pub fn insert(&self, entry: CallbackEntry) -> String {
        let mut slots = self.lock();
        if slots.entries.len() >= self.capacity {
            let keep_from = slots
                .entries
                .keys()
                .nth(slots.entries.len() / 2)
                .copied()
                .unwrap_or(slots.next_id);
            slots.entries = slots.entries.split_off(&keep_from);
            tracing::debug!(
                remaining = slots.entries.len(),
                "callback table full, dropped oldest half"
            );
        }
        let id = slots.next_id;
        slots.next_id += 1;
        slots.entries.insert(id, entry);
        format!("{}{}", CALLBACK_PREFIX, id)
    }

    pub fn get(&self, callback_id: &str) -> Option<CallbackEntry> {
        let id = parse_callback_id(callback_id)?;
        self.lock().entries.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CallbackSlots> {
        // A poisoned table only means a panic happened mid-insert; the map
        // itself is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_callback_id(raw: &str) -> Option<u64> {
    raw.strip_prefix(CALLBACK_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod callbacks_tests {
    use super::*;
    use serde_json::json;

    fn entry(tag: i64) -> CallbackEntry {
        CallbackEntry {
            session_id: "s".to_string(),
            graph: json!({"action": "EmitOutput", "text": tag}),
            params: ValueMap::new(),
        }
    }

    #[test]
    fn ids_are_stable_and_resolvable() {
        let table = CallbackTable::new(10);
        let first = table.insert(entry(1));
        let second = table.insert(entry(2));
        assert_eq!(first, "cb:0");
        assert_eq!(second, "cb:1");
        assert_eq!(table.get(&second), Some(entry(2)));
        assert_eq!(table.get("cb:99"), None);
        assert_eq!(table.get("garbage"), None);
    }

    #[test]
    fn full_table_drops_oldest_half() {
        let table = CallbackTable::new(4);
        let ids: Vec<String> = (0..4).map(|tag| table.insert(entry(tag))).collect();
        let fifth = table.insert(entry(4));
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&ids[0]), None);
        assert_eq!(table.get(&ids[1]), None);
        assert_eq!(table.get(&ids[2]), Some(entry(2)));
        assert_eq!(table.get(&fifth), Some(entry(4)));
    }
}
