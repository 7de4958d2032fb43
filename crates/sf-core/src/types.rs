use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::ValueMap;

pub const ACTION_KEY: &str = "action";
pub const FUNCTION_KEY: &str = "function";
pub const START_COMMAND: &str = "/start";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(default)]
    pub on_navigation: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioFunction {
    #[serde(default)]
    pub params: ValueMap,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub start_actions: Value,
    #[serde(default)]
    pub menu_items: BTreeMap<String, MenuItem>,
    #[serde(default)]
    pub functions: BTreeMap<String, ScenarioFunction>,
    #[serde(default)]
    pub data: ValueMap,
    #[serde(default)]
    pub commands: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<String>,
}

/// A partial scenario merged into an entry scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioModule {
    #[serde(default)]
    pub menu_items: BTreeMap<String, MenuItem>,
    #[serde(default)]
    pub functions: BTreeMap<String, ScenarioFunction>,
    #[serde(default)]
    pub data: ValueMap,
    #[serde(default)]
    pub commands: BTreeMap<String, Value>,
}

impl Scenario {
    /// Shallow union; entries of `module` replace existing keys.
    pub fn merge_module(&mut self, module: ScenarioModule) {
        self.menu_items.extend(module.menu_items);
        self.functions.extend(module.functions);
        self.data.extend(module.data);
        self.commands.extend(module.commands);
    }

    pub fn menu_graph(&self, name: &str) -> Option<&Value> {
        self.menu_items.get(name).map(|item| &item.on_navigation)
    }

    pub fn command_graph(&self, command: &str) -> Option<&Value> {
        self.commands.get(command)
    }
}

/// Normalizes a graph field: one descriptor, an ordered list, or nothing.
pub fn graph_items(graph: &Value) -> Vec<&Value> {
    match graph {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![graph],
        _ => Vec::new(),
    }
}

pub fn is_action_descriptor(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|fields| fields.get(ACTION_KEY))
        .map(Value::is_string)
        .unwrap_or(false)
}

pub fn is_function_descriptor(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|fields| fields.get(FUNCTION_KEY))
        .map(Value::is_string)
        .unwrap_or(false)
}

pub fn descriptor_name<'a>(fields: &'a ValueMap, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}
