pub mod actions;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod engine;
pub mod functions;
pub mod http;
mod registry;
pub mod scope;
pub mod session;
pub mod transport;

pub use actions::{ActionProcessor, ActionRegistry, ProcessorFactory};
pub use callbacks::{CallbackEntry, CallbackTable};
pub use config::{EngineConfig, DEFAULT_ENGINE_VERSION};
pub use context::ExecutionContext;
pub use engine::{Engine, EngineOptions, InputTimeoutHook};
pub use functions::{FunctionExecutor, FunctionRegistry};
pub use http::{EndpointRequest, EndpointResponse, HttpClient, ReqwestHttpClient};
pub use registry::{RegisterOptions, REGISTRY_DUPLICATE};
pub use scope::{ScopeMark, ScopeStack};
pub use session::{
    AwaitingInput, BackOutcome, NavigationState, PendingInput, Session, SessionHandle,
    SessionStore, BACK_STACK_CAP,
};
pub use transport::{MemoryTransport, OutboundRecord, Transport, TRANSPORT_MESSAGE_GONE};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use sf_core::{Scenario, ScenarioError, ValueMap};

    use crate::context::ExecutionContext;
    use crate::engine::{Engine, EngineOptions};
    use crate::http::{EndpointRequest, EndpointResponse, HttpClient};
    use crate::transport::MemoryTransport;

    pub(crate) fn scenario(value: Value) -> Scenario {
        serde_json::from_value(value).expect("scenario fixture should parse")
    }

    pub(crate) fn params(value: Value) -> ValueMap {
        value.as_object().cloned().unwrap_or_default()
    }

    pub(crate) fn with_function(name: &str, args: Value) -> Value {
        let mut fields = params(args);
        fields.insert("function".to_string(), Value::String(name.to_string()));
        Value::Object(fields)
    }

    pub(crate) fn test_engine(scenario: Scenario) -> Engine {
        test_engine_with(scenario, Arc::new(ScriptedHttpClient::default())).0
    }

    pub(crate) fn test_engine_with(
        scenario: Scenario,
        http: Arc<dyn HttpClient>,
    ) -> (Engine, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let engine = Engine::new(EngineOptions {
            http: Some(http),
            ..EngineOptions::new(scenario, transport.clone())
        })
        .expect("engine should build");
        (engine, transport)
    }

    pub(crate) fn context_for(engine: &Engine, session_id: &str) -> ExecutionContext {
        let (handle, _) = engine.sessions().get_or_create(session_id);
        let guard = handle
            .try_lock_owned()
            .expect("test session should be unlocked");
        ExecutionContext::new(guard, &engine.config().version)
    }

    /// Replays queued responses in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedHttpClient {
        responses: Mutex<VecDeque<Result<EndpointResponse, ScenarioError>>>,
        requests: Mutex<Vec<EndpointRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedHttpClient {
        pub(crate) fn delayed(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub(crate) fn push(&self, response: Result<EndpointResponse, ScenarioError>) {
            self.responses
                .lock()
                .expect("responses lock")
                .push_back(response);
        }

        pub(crate) fn requests(&self) -> Vec<EndpointRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn execute(
            &self,
            request: EndpointRequest,
        ) -> Result<EndpointResponse, ScenarioError> {
            self.requests.lock().expect("requests lock").push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.responses.lock().expect("responses lock").pop_front();
            next.unwrap_or_else(|| {
                Err(ScenarioError::evaluation(
                    "ENDPOINT_REQUEST",
                    "no scripted response",
                ))
            })
        }
    }
}
