mod arithmetic;
mod collections;
mod dates;
mod logic;
mod storage;

use std::sync::Arc;

use serde_json::Value;
use sf_core::{coerce_number, number_value, type_name, value_to_text, ScenarioError, ValueMap};

use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::registry::{RegisterOptions, Registry};

pub const FUNCTION_NOT_FOUND: &str = "FUNCTION_NOT_FOUND";
pub const FUNCTION_MISSING_PARAM: &str = "FUNCTION_MISSING_PARAM";
pub const FUNCTION_NOT_A_NUMBER: &str = "FUNCTION_NOT_A_NUMBER";
pub const FUNCTION_DIVISION_BY_ZERO: &str = "FUNCTION_DIVISION_BY_ZERO";
pub const FUNCTION_NOT_AN_ARRAY: &str = "FUNCTION_NOT_AN_ARRAY";
pub const FUNCTION_INVALID_DATE: &str = "FUNCTION_INVALID_DATE";
pub const FUNCTION_INVALID_ARGUMENT: &str = "FUNCTION_INVALID_ARGUMENT";

/// A named computation. Executors receive parameters already interpolated,
/// except the ones listed in [`FunctionExecutor::deferred_params`].
pub trait FunctionExecutor: Send + Sync {
    fn execute(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError>;

    /// Keyword names understood by the `{{Name:key:value}}` shorthand.
    fn keywords(&self) -> &'static [&'static str] {
        &[]
    }

    /// Parameters evaluated by the executor itself (branches, templates).
    fn deferred_params(&self) -> &'static [&'static str] {
        &[]
    }
}

struct ClosureExecutor<F> {
    run: F,
    keywords: &'static [&'static str],
}

impl<F> FunctionExecutor for ClosureExecutor<F>
where
    F: Fn(&mut ExecutionContext, ValueMap) -> Result<Value, ScenarioError> + Send + Sync,
{
    fn execute(
        &self,
        _engine: &Engine,
        ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        (self.run)(ctx, params)
    }

    fn keywords(&self) -> &'static [&'static str] {
        self.keywords
    }
}

pub struct FunctionRegistry {
    entries: Registry<dyn FunctionExecutor>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Registry::new("Function"),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        arithmetic::register(&registry);
        logic::register(&registry);
        collections::register(&registry);
        storage::register(&registry);
        dates::register(&registry);
        registry
    }

    pub fn register(
        &self,
        name: &str,
        executor: Arc<dyn FunctionExecutor>,
        options: RegisterOptions,
    ) -> Result<(), ScenarioError> {
        self.entries.register(name, executor, options)
    }

    /// Registers a plain closure. `keywords` feeds the shorthand parser.
    pub fn register_fn<F>(
        &self,
        name: &str,
        keywords: &'static [&'static str],
        run: F,
        options: RegisterOptions,
    ) -> Result<(), ScenarioError>
    where
        F: Fn(&mut ExecutionContext, ValueMap) -> Result<Value, ScenarioError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, Arc::new(ClosureExecutor { run, keywords }), options)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FunctionExecutor>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.names()
    }

    fn install(&self, name: &str, executor: Arc<dyn FunctionExecutor>) {
        if let Err(error) = self.register(name, executor, RegisterOptions::overwrite()) {
            tracing::error!(function = name, %error, "builtin registration failed");
        }
    }
}

pub(crate) fn required<'a>(
    params: &'a ValueMap,
    name: &str,
    function: &str,
) -> Result<&'a Value, ScenarioError> {
    params.get(name).filter(|value| !value.is_null()).ok_or_else(|| {
        ScenarioError::evaluation(
            FUNCTION_MISSING_PARAM,
            format!("{} requires parameter \"{}\".", function, name),
        )
    })
}

pub(crate) fn to_number(value: &Value, function: &str) -> Result<f64, ScenarioError> {
    coerce_number(value).ok_or_else(|| {
        ScenarioError::evaluation(
            FUNCTION_NOT_A_NUMBER,
            format!(
                "{} expects numeric operands, got {} \"{}\".",
                function,
                type_name(value),
                value_to_text(value)
            ),
        )
    })
}

pub(crate) fn finish_number(number: f64, function: &str) -> Result<Value, ScenarioError> {
    number_value(number).ok_or_else(|| {
        ScenarioError::evaluation(
            FUNCTION_NOT_A_NUMBER,
            format!("{} produced a non-finite result.", function),
        )
    })
}

pub(crate) fn text_param(params: &ValueMap, name: &str) -> Option<String> {
    params
        .get(name)
        .filter(|value| !value.is_null())
        .map(value_to_text)
}

/// Accepts a list, or a single value as a one-element list.
pub(crate) fn list_param(params: &ValueMap, name: &str) -> Vec<Value> {
    match params.get(name) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}
