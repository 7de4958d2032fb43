use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::Session;

pub type SessionHandle = Arc<Mutex<Session>>;

/// Owns every live session. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `id`, creating it lazily. The flag is true
    /// when this call created it.
    pub fn get_or_create(&self, id: &str) -> (SessionHandle, bool) {
        if let Some(handle) = self.get(id) {
            return (handle, false);
        }
        let mut sessions = self.write_map();
        if let Some(handle) = sessions.get(id) {
            return (Arc::clone(handle), false);
        }
        let handle = Arc::new(Mutex::new(Session::new(id)));
        sessions.insert(id.to_string(), Arc::clone(&handle));
        tracing::debug!(session_id = id, "session created");
        (handle, true)
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.read_map().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.write_map().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_map().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drops sessions idle for at least `idle`. A session whose lock is held
    /// is mid-dispatch and therefore never idle.
    pub fn evict_idle(&self, idle: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut sessions = self.write_map();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| match handle.try_lock() {
                Ok(session) => now.duration_since(session.last_activity()) >= idle,
                Err(_) => false,
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(evicted = expired.len(), "evicted idle sessions");
        }
        expired
    }

    pub fn spawn_sweeper(&self, idle: Duration, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.evict_idle(idle);
            }
        })
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
