use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use sf_core::{graph_items, Scenario, ScenarioError};
use sf_runtime::{
    ActionRegistry, Engine, EngineConfig, EngineOptions, FunctionRegistry, HttpClient,
    InputTimeoutHook, Transport,
};

pub use sf_loader::{load_scenario, parse_scenario};

pub const API_CONFIG_READ: &str = "API_CONFIG_READ";
pub const API_CONFIG_INVALID: &str = "API_CONFIG_INVALID";

#[derive(Clone)]
pub struct CreateEngineOptions {
    pub scenario: Scenario,
    pub transport: Arc<dyn Transport>,
    pub config: Option<EngineConfig>,
    pub functions: Option<Arc<FunctionRegistry>>,
    pub actions: Option<Arc<ActionRegistry>>,
    pub http: Option<Arc<dyn HttpClient>>,
    pub input_timeout_hook: Option<Arc<dyn InputTimeoutHook>>,
}

impl CreateEngineOptions {
    pub fn new(scenario: Scenario, transport: Arc<dyn Transport>) -> Self {
        Self {
            scenario,
            transport,
            config: None,
            functions: None,
            actions: None,
            http: None,
            input_timeout_hook: None,
        }
    }
}

/// What `check` reports about a loaded scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub start_actions: usize,
    pub menus: Vec<String>,
    pub functions: Vec<String>,
    pub commands: Vec<String>,
    pub modules: Vec<String>,
}

pub fn create_engine(options: CreateEngineOptions) -> Result<Engine, ScenarioError> {
    let engine = Engine::new(EngineOptions {
        scenario: options.scenario,
        transport: options.transport,
        functions: options.functions,
        actions: options.actions,
        http: options.http,
        config: options.config,
        input_timeout_hook: options.input_timeout_hook,
    })?;
    tracing::info!(
        version = engine.config().version.as_str(),
        menus = engine.scenario().menu_items.len(),
        "engine ready"
    );
    Ok(engine)
}

pub fn create_engine_from_path(
    path: impl AsRef<Path>,
    transport: Arc<dyn Transport>,
    config: Option<EngineConfig>,
) -> Result<Engine, ScenarioError> {
    let scenario = load_scenario(path)?;
    create_engine(CreateEngineOptions {
        config,
        ..CreateEngineOptions::new(scenario, transport)
    })
}

/// Reads an `EngineConfig` JSON object; missing fields keep their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ScenarioError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|error| {
        ScenarioError::evaluation(
            API_CONFIG_READ,
            format!("cannot read config {}: {}", path.display(), error),
        )
    })?;
    let invalid = |reason: String| {
        ScenarioError::evaluation(
            API_CONFIG_INVALID,
            format!("invalid config {}: {}", path.display(), reason),
        )
    };
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|error| invalid(error.to_string()))?;
    if !value.is_object() {
        return Err(invalid("expected a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|error| invalid(error.to_string()))
}

pub fn summarize_scenario(scenario: &Scenario) -> ScenarioSummary {
    ScenarioSummary {
        start_actions: graph_items(&scenario.start_actions).len(),
        menus: scenario.menu_items.keys().cloned().collect(),
        functions: scenario.functions.keys().cloned().collect(),
        commands: scenario.commands.keys().cloned().collect(),
        modules: scenario.modules.clone(),
    }
}
