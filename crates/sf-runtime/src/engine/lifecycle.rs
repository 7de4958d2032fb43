use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sf_core::{graph_items, is_action_descriptor, is_function_descriptor, Scenario, ScenarioError};
use tokio::task::JoinHandle;

use crate::actions::ActionRegistry;
use crate::callbacks::CallbackTable;
use crate::config::EngineConfig;
use crate::functions::FunctionRegistry;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::session::{PendingInput, SessionHandle, SessionStore};
use crate::transport::Transport;

pub const ENGINE_INVALID_GRAPH: &str = "ENGINE_INVALID_GRAPH";

/// Notified when a pending input expires. Runs outside the session lock.
pub trait InputTimeoutHook: Send + Sync {
    fn on_input_timeout(&self, session_id: &str, pending: &PendingInput);
}

#[derive(Clone)]
pub struct EngineOptions {
    pub scenario: Scenario,
    pub transport: Arc<dyn Transport>,
    pub functions: Option<Arc<FunctionRegistry>>,
    pub actions: Option<Arc<ActionRegistry>>,
    pub http: Option<Arc<dyn HttpClient>>,
    pub config: Option<EngineConfig>,
    pub input_timeout_hook: Option<Arc<dyn InputTimeoutHook>>,
}

impl EngineOptions {
    pub fn new(scenario: Scenario, transport: Arc<dyn Transport>) -> Self {
        Self {
            scenario,
            transport,
            functions: None,
            actions: None,
            http: None,
            config: None,
            input_timeout_hook: None,
        }
    }
}

/// Interprets one scenario for every session. Cloning shares all state.
#[derive(Clone)]
pub struct Engine {
    pub(crate) scenario: Arc<Scenario>,
    pub(crate) functions: Arc<FunctionRegistry>,
    pub(crate) actions: Arc<ActionRegistry>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) http: Arc<dyn HttpClient>,
    pub(crate) callbacks: Arc<CallbackTable>,
    pub(crate) sessions: SessionStore,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) input_timeout_hook: Option<Arc<dyn InputTimeoutHook>>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Result<Self, ScenarioError> {
        let scenario = options.scenario;
        validate_graph("startActions", &scenario.start_actions)?;
        for (name, item) in &scenario.menu_items {
            validate_graph(&format!("menuItems.{}.onNavigation", name), &item.on_navigation)?;
        }
        for (command, graph) in &scenario.commands {
            validate_graph(&format!("commands.{}", command), graph)?;
        }

        let functions = options
            .functions
            .unwrap_or_else(|| Arc::new(FunctionRegistry::with_builtins()));
        for name in scenario.functions.keys() {
            if functions.contains(name) {
                tracing::warn!(
                    function = name.as_str(),
                    "scenario function is shadowed by a registered function"
                );
            }
        }

        let config = options.config.unwrap_or_default();
        Ok(Self {
            scenario: Arc::new(scenario),
            functions,
            actions: options
                .actions
                .unwrap_or_else(|| Arc::new(ActionRegistry::with_builtins())),
            transport: options.transport,
            http: options
                .http
                .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new())),
            callbacks: Arc::new(CallbackTable::new(config.callback_capacity)),
            sessions: SessionStore::new(),
            config: Arc::new(config),
            input_timeout_hook: options.input_timeout_hook,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts the periodic idle-session sweep. Needs a running tokio runtime.
    pub fn spawn_session_sweeper(&self) -> JoinHandle<()> {
        self.sessions
            .spawn_sweeper(self.config.idle_timeout(), self.config.sweep_interval())
    }

    /// Clears the wait armed as `generation` once `timeout` elapses, unless a
    /// newer wait replaced it first. The timer is tied to `session` itself:
    /// once that session is evicted, a session later created under the same
    /// id is never touched.
    pub(crate) fn schedule_input_timeout(
        &self,
        session: &SessionHandle,
        generation: u64,
        timeout: Duration,
    ) {
        let sessions = self.sessions.clone();
        let hook = self.input_timeout_hook.clone();
        let armed = Arc::downgrade(session);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(handle) = armed.upgrade() else {
                return;
            };
            let session_id = handle.lock().await.id.clone();
            let still_registered = sessions
                .get(&session_id)
                .is_some_and(|current| Arc::ptr_eq(&current, &handle));
            if !still_registered {
                tracing::debug!(
                    session_id = session_id.as_str(),
                    "input timer outlived its session"
                );
                return;
            }
            let expired = handle.lock().await.awaiting.expire(generation);
            if let Some(pending) = expired {
                tracing::info!(
                    session_id = session_id.as_str(),
                    key = pending.key.as_str(),
                    "input wait timed out"
                );
                if let Some(hook) = hook {
                    hook.on_input_timeout(&session_id, &pending);
                }
            }
        });
    }

    pub(crate) fn notify_input_timeout(&self, session_id: &str, pending: &PendingInput) {
        tracing::info!(session_id, key = pending.key.as_str(), "input wait timed out");
        if let Some(hook) = &self.input_timeout_hook {
            hook.on_input_timeout(session_id, pending);
        }
    }
}

fn validate_graph(location: &str, graph: &Value) -> Result<(), ScenarioError> {
    let well_formed = match graph {
        Value::Null => true,
        Value::Object(_) | Value::Array(_) => graph_items(graph)
            .iter()
            .all(|item| is_action_descriptor(item) || is_function_descriptor(item)),
        _ => false,
    };
    if well_formed {
        return Ok(());
    }
    Err(ScenarioError::evaluation(
        ENGINE_INVALID_GRAPH,
        format!(
            "\"{}\" must be an action descriptor or a list of them.",
            location
        ),
    ))
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use crate::test_support::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    #[test]
    fn new_rejects_malformed_graphs() {
        let result = Engine::new(EngineOptions::new(
            scenario(json!({"menuItems": {"A": {"onNavigation": "EmitOutput"}}})),
            Arc::new(MemoryTransport::new()),
        ));
        let error = result.err().expect("string graph should fail");
        assert_eq!(error.code, ENGINE_INVALID_GRAPH);
        assert!(error.message.contains("menuItems.A.onNavigation"));

        let result = Engine::new(EngineOptions::new(
            scenario(json!({"startActions": [{"action": "EmitOutput"}, {"text": "x"}]})),
            Arc::new(MemoryTransport::new()),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn new_applies_config_and_default_registries() {
        let engine = Engine::new(EngineOptions {
            config: Some(EngineConfig {
                version: "9.9.9".to_string(),
                ..EngineConfig::default()
            }),
            ..EngineOptions::new(scenario(json!({})), Arc::new(MemoryTransport::new()))
        })
        .expect("engine should build");
        assert_eq!(engine.config().version, "9.9.9");
        assert!(engine.functions().contains("Plus"));
        assert!(engine.actions().contains("EmitOutput"));
        let ctx = context_for(&engine, "u1");
        assert_eq!(ctx.env().get("version"), Some(&json!("9.9.9")));
        assert_eq!(ctx.env().get("sessionId"), Some(&json!("u1")));
    }

    struct RecordingHook(std::sync::Mutex<Vec<String>>);

    impl InputTimeoutHook for RecordingHook {
        fn on_input_timeout(&self, session_id: &str, pending: &PendingInput) {
            self.0
                .lock()
                .expect("hook lock")
                .push(format!("{}:{}", session_id, pending.key));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_never_clears_a_newer_wait() {
        let hook = Arc::new(RecordingHook(std::sync::Mutex::new(Vec::new())));
        let engine = Engine::new(EngineOptions {
            input_timeout_hook: Some(hook.clone()),
            ..EngineOptions::new(scenario(json!({})), Arc::new(MemoryTransport::new()))
        })
        .expect("engine should build");
        let (handle, _) = engine.sessions().get_or_create("u1");

        let first = handle.lock().await.awaiting.arm(PendingInput::new(
            "first",
            sf_core::InputKind::Text,
            Value::Null,
        ));
        engine.schedule_input_timeout(&handle, first.0, Duration::from_secs(5));
        let second = handle.lock().await.awaiting.arm(PendingInput::new(
            "second",
            sf_core::InputKind::Text,
            Value::Null,
        ));
        engine.schedule_input_timeout(&handle, second.0, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            handle.lock().await.awaiting.pending().map(|p| p.key.clone()),
            Some("second".to_string())
        );
        assert!(hook.0.lock().expect("hook lock").is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.lock().await.awaiting.is_waiting());
        assert_eq!(*hook.0.lock().expect("hook lock"), vec!["u1:second".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_from_an_evicted_session_spares_its_successor() {
        let hook = Arc::new(RecordingHook(std::sync::Mutex::new(Vec::new())));
        let engine = Engine::new(EngineOptions {
            input_timeout_hook: Some(hook.clone()),
            ..EngineOptions::new(scenario(json!({})), Arc::new(MemoryTransport::new()))
        })
        .expect("engine should build");

        let (old, _) = engine.sessions().get_or_create("u1");
        let (generation, _) = old.lock().await.awaiting.arm(PendingInput::new(
            "old",
            sf_core::InputKind::Text,
            Value::Null,
        ));
        engine.schedule_input_timeout(&old, generation, Duration::from_secs(100));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            engine.sessions().evict_idle(Duration::from_secs(60)),
            vec!["u1".to_string()]
        );
        drop(old);

        let (fresh, created) = engine.sessions().get_or_create("u1");
        assert!(created);
        let (generation, _) = fresh.lock().await.awaiting.arm(PendingInput::new(
            "fresh",
            sf_core::InputKind::Text,
            Value::Null,
        ));
        assert_eq!(generation, 1);
        engine.schedule_input_timeout(&fresh, generation, Duration::from_secs(100));

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(fresh.lock().await.awaiting.is_waiting());
        assert!(hook.0.lock().expect("hook lock").is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!fresh.lock().await.awaiting.is_waiting());
        assert_eq!(*hook.0.lock().expect("hook lock"), vec!["u1:fresh".to_string()]);
    }
}
