mod awaiting;
mod navigation;
mod storage;
mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sf_core::{assign_path, lookup_in_map, parse_path, remove_path, MessageRef, ValueMap};
use tokio::time::Instant;

pub use awaiting::{AwaitingInput, InputMatch, PendingInput};
pub use navigation::{BackOutcome, NavigationState, BACK_STACK_CAP};
pub use storage::{SessionStorage, DEFAULT_NAMESPACE};
pub use store::{SessionHandle, SessionStore};

/// Everything durable about one end user's conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub data: ValueMap,
    pub navigation: NavigationState,
    pub awaiting: AwaitingInput,
    pub storage: SessionStorage,
    pub last_message: Option<MessageRef>,
    pub messages: BTreeMap<String, MessageRef>,
    pub created_at: DateTime<Utc>,
    last_activity: Instant,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: ValueMap::new(),
            navigation: NavigationState::default(),
            awaiting: AwaitingInput::default(),
            storage: SessionStorage::default(),
            last_message: None,
            messages: BTreeMap::new(),
            created_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn get_data(&self, path: &str) -> Option<&Value> {
        lookup_in_map(&self.data, &parse_path(path))
    }

    pub fn set_data(&mut self, path: &str, value: Value) -> Result<(), String> {
        assign_path(&mut self.data, &parse_path(path), value)
    }

    pub fn remove_data(&mut self, path: &str) -> Option<Value> {
        remove_path(&mut self.data, &parse_path(path))
    }

    pub fn remember_message(&mut self, name: Option<&str>, message: MessageRef) {
        if let Some(name) = name {
            self.messages.insert(name.to_string(), message.clone());
        }
        self.last_message = Some(message);
    }

    pub fn forget_message(&mut self, message: &MessageRef) {
        self.messages.retain(|_, stored| stored != message);
        if self.last_message.as_ref() == Some(message) {
            self.last_message = None;
        }
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_paths_write_and_remove_nested_values() {
        let mut session = Session::new("s");
        session.set_data("profile.name", json!("Ann")).expect("set");
        assert_eq!(session.get_data("profile.name"), Some(&json!("Ann")));
        assert_eq!(session.remove_data("profile.name"), Some(json!("Ann")));
        assert_eq!(session.get_data("profile"), Some(&json!({})));
    }

    #[test]
    fn message_registry_tracks_named_and_last_refs() {
        let mut session = Session::new("s");
        session.remember_message(Some("menu"), MessageRef::new("1"));
        session.remember_message(None, MessageRef::new("2"));
        assert_eq!(session.messages.get("menu"), Some(&MessageRef::new("1")));
        assert_eq!(session.last_message, Some(MessageRef::new("2")));

        session.forget_message(&MessageRef::new("2"));
        assert_eq!(session.last_message, None);
        session.forget_message(&MessageRef::new("1"));
        assert!(session.messages.is_empty());
    }
}
