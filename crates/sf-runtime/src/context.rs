use chrono::Utc;
use serde_json::{json, Value};
use sf_core::ValueMap;
use tokio::sync::OwnedMutexGuard;

use crate::scope::ScopeStack;
use crate::session::{Session, SessionHandle};

/// Per-dispatch state. Holding it means holding the session lock, so one
/// session never runs two graphs at once.
pub struct ExecutionContext {
    session: OwnedMutexGuard<Session>,
    pub(crate) env: ValueMap,
    pub(crate) params: ValueMap,
    pub(crate) scope: ScopeStack,
    pub(crate) pending_effects: Vec<Value>,
}

impl ExecutionContext {
    pub fn new(session: OwnedMutexGuard<Session>, version: &str) -> Self {
        let env = build_env(&session.id, version);
        Self {
            session,
            env,
            params: ValueMap::new(),
            scope: ScopeStack::new(),
            pending_effects: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The shared handle this context holds the lock of.
    pub(crate) fn session_handle(&self) -> &SessionHandle {
        OwnedMutexGuard::mutex(&self.session)
    }

    pub fn session_id(&self) -> String {
        self.session.id.clone()
    }

    pub fn env(&self) -> &ValueMap {
        &self.env
    }

    pub fn params(&self) -> &ValueMap {
        &self.params
    }

    /// Swaps the `params` tier, returning the previous one for restoring.
    pub fn replace_params(&mut self, params: ValueMap) -> ValueMap {
        std::mem::replace(&mut self.params, params)
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut ScopeStack {
        &mut self.scope
    }

    pub fn set_local(&mut self, name: &str, value: Value) {
        self.scope.set_variable(name, value);
    }
}

fn build_env(session_id: &str, version: &str) -> ValueMap {
    let now = Utc::now();
    let env = json!({
        "timestamp": now.timestamp_millis(),
        "version": version,
        "date": now.format("%Y-%m-%d").to_string(),
        "time": now.format("%H:%M:%S").to_string(),
        "sessionId": session_id,
    });
    match env {
        Value::Object(map) => map,
        _ => ValueMap::new(),
    }
}
