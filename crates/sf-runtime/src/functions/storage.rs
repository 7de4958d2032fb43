use std::sync::Arc;

use serde_json::Value;
use sf_core::{coerce_bool, ScenarioError, ValueMap};

use super::{required, text_param, FunctionExecutor, FunctionRegistry};
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::session::DEFAULT_NAMESPACE;

/// Reads the session storage area; a missing entry yields `fallback`.
struct ReadStorage;

impl FunctionExecutor for ReadStorage {
    fn execute(
        &self,
        _engine: &Engine,
        ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let key = sf_core::value_to_text(required(&params, "key", "ReadStorage")?);
        let namespace =
            text_param(&params, "namespace").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let consume = params.get("consume").map(coerce_bool).unwrap_or(false);
        let stored = ctx
            .session_mut()
            .storage
            .read(&namespace, &key, consume);
        Ok(stored
            .or_else(|| params.get("fallback").cloned())
            .unwrap_or(Value::Null))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["key", "namespace", "fallback", "consume"]
    }
}

pub(super) fn register(registry: &FunctionRegistry) {
    registry.install("ReadStorage", Arc::new(ReadStorage));
}
