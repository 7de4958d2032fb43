mod endpoint;
mod input;
mod navigation;
mod output;
mod storage;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sf_core::{coerce_bool, coerce_number, value_to_text, ScenarioError, ValueMap};

use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::registry::{RegisterOptions, Registry};

pub use endpoint::{ENDPOINT_STATUS, ENDPOINT_TIMEOUT};

pub const ACTION_MISSING_FIELD: &str = "ACTION_MISSING_FIELD";
pub const ACTION_INVALID_FIELD: &str = "ACTION_INVALID_FIELD";
pub const WILDCARD_ACTION: &str = "*";

/// Performs one action type. `fields` are the raw descriptor fields; the
/// processor interpolates the ones it reads.
#[async_trait]
pub trait ActionProcessor: Send + Sync {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError>;
}

type FactoryFn = dyn Fn() -> Box<dyn ActionProcessor> + Send + Sync;

/// Builds a fresh processor for each dispatch.
pub type ProcessorFactory = Arc<FactoryFn>;

/// Custom handlers are kept apart from built-ins so a custom registration
/// for a built-in type takes precedence without replacing it.
pub struct ActionRegistry {
    builtins: Registry<FactoryFn>,
    custom: Registry<FactoryFn>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            builtins: Registry::new("Built-in action"),
            custom: Registry::new("Action"),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        output::register(&registry);
        navigation::register(&registry);
        input::register(&registry);
        storage::register(&registry);
        endpoint::register(&registry);
        registry
    }

    pub fn register_action(
        &self,
        action: &str,
        factory: ProcessorFactory,
        options: RegisterOptions,
    ) -> Result<(), ScenarioError> {
        self.custom.register(action, factory, options)
    }

    /// Custom exact match, then built-in exact match, then the `*` catch-all.
    pub fn resolve(&self, action: &str) -> Option<Box<dyn ActionProcessor>> {
        self.custom
            .get(action)
            .or_else(|| self.builtins.get(action))
            .or_else(|| self.custom.get(WILDCARD_ACTION))
            .map(|factory| factory())
    }

    pub fn contains(&self, action: &str) -> bool {
        self.custom.contains(action) || self.builtins.contains(action)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.builtins.names();
        names.extend(self.custom.names());
        names.sort();
        names.dedup();
        names
    }

    fn install<P>(&self, action: &str)
    where
        P: ActionProcessor + Default + 'static,
    {
        let factory: ProcessorFactory = Arc::new(|| Box::new(P::default()) as Box<dyn ActionProcessor>);
        if let Err(error) = self
            .builtins
            .register(action, factory, RegisterOptions::overwrite())
        {
            tracing::error!(action, %error, "builtin registration failed");
        }
    }
}

pub(crate) async fn field(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    name: &str,
) -> Result<Value, ScenarioError> {
    match fields.get(name) {
        Some(raw) => engine.resolve(ctx, raw).await,
        None => Ok(Value::Null),
    }
}

pub(crate) async fn text_field(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    name: &str,
) -> Result<Option<String>, ScenarioError> {
    let value = field(engine, ctx, fields, name).await?;
    Ok((!value.is_null()).then(|| value_to_text(&value)))
}

pub(crate) async fn required_text(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    name: &str,
    action: &str,
) -> Result<String, ScenarioError> {
    match text_field(engine, ctx, fields, name).await? {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ScenarioError::evaluation(
            ACTION_MISSING_FIELD,
            format!("{} requires field \"{}\".", action, name),
        )),
    }
}

pub(crate) async fn bool_field(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    name: &str,
    default: bool,
) -> Result<bool, ScenarioError> {
    let value = field(engine, ctx, fields, name).await?;
    Ok(if value.is_null() {
        default
    } else {
        coerce_bool(&value)
    })
}

/// Seconds as a number or numeric string; absent yields `None`. Negative,
/// non-finite and out-of-range values are rejected.
pub(crate) async fn seconds_field(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    name: &str,
    action: &str,
) -> Result<Option<std::time::Duration>, ScenarioError> {
    let value = field(engine, ctx, fields, name).await?;
    if value.is_null() {
        return Ok(None);
    }
    match coerce_number(&value).map(std::time::Duration::try_from_secs_f64) {
        Some(Ok(duration)) => Ok(Some(duration)),
        _ => Err(ScenarioError::evaluation(
            ACTION_INVALID_FIELD,
            format!(
                "{} field \"{}\" must be a non-negative number of seconds.",
                action, name
            ),
        )),
    }
}

pub(crate) async fn object_field(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    name: &str,
    action: &str,
) -> Result<ValueMap, ScenarioError> {
    match field(engine, ctx, fields, name).await? {
        Value::Null => Ok(ValueMap::new()),
        Value::Object(map) => Ok(map),
        _ => Err(ScenarioError::evaluation(
            ACTION_INVALID_FIELD,
            format!("{} field \"{}\" must be an object.", action, name),
        )),
    }
}

/// Raw graph field, never interpolated ahead of its own dispatch.
pub(crate) fn graph_field(fields: &ValueMap, name: &str) -> Value {
    fields.get(name).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod actions_tests {
    use super::*;

    #[test]
    fn builtins_cover_documented_types() {
        let registry = ActionRegistry::with_builtins();
        for action in [
            "EmitOutput",
            "EditOutput",
            "DeleteOutput",
            "Navigate",
            "Back",
            "RequestInput",
            "CancelAwaitingInput",
            "Store",
            "ReadStorage",
            "CallExternalEndpoint",
        ] {
            assert!(registry.contains(action), "missing builtin {}", action);
        }
        assert!(registry.resolve("Unknown").is_none());
    }

    #[test]
    fn custom_registration_needs_overwrite_only_against_custom_entries() {
        struct Nothing;

        #[async_trait]
        impl ActionProcessor for Nothing {
            async fn process(
                &self,
                _engine: &Engine,
                _ctx: &mut ExecutionContext,
                _fields: &ValueMap,
            ) -> Result<(), ScenarioError> {
                Ok(())
            }
        }

        let registry = ActionRegistry::with_builtins();
        let factory: ProcessorFactory = Arc::new(|| Box::new(Nothing) as Box<dyn ActionProcessor>);
        registry
            .register_action("EmitOutput", factory.clone(), RegisterOptions::default())
            .expect("custom may shadow a builtin");
        let error = registry
            .register_action("EmitOutput", factory.clone(), RegisterOptions::default())
            .expect_err("second custom registration");
        assert_eq!(error.code, crate::registry::REGISTRY_DUPLICATE);
        registry
            .register_action(
                "EmitOutput",
                factory,
                RegisterOptions {
                    overwrite: true,
                    verbose: true,
                },
            )
            .expect("overwrite");
        assert_eq!(
            registry.names().iter().filter(|name| *name == "EmitOutput").count(),
            1
        );
    }
}
