use std::sync::Arc;

use serde_json::Value;
use sf_core::{value_to_text, values_equal, ScenarioError, ValueMap};

use super::{
    list_param, required, to_number, FunctionExecutor, FunctionRegistry,
    FUNCTION_INVALID_ARGUMENT,
};
use crate::context::ExecutionContext;
use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    More,
    MoreOrEqual,
    Equal,
    Less,
    LessOrEqual,
}

impl Comparison {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "more" | ">" => Some(Self::More),
            "moreThanOrEquals" | ">=" => Some(Self::MoreOrEqual),
            "equals" | "==" | "=" => Some(Self::Equal),
            "less" | "<" => Some(Self::Less),
            "lessThanOrEquals" | "<=" => Some(Self::LessOrEqual),
            _ => None,
        }
    }

    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Self::More => left > right,
            Self::MoreOrEqual => left >= right,
            Self::Equal => left == right,
            Self::Less => left < right,
            Self::LessOrEqual => left <= right,
        }
    }
}

struct Compare;

impl FunctionExecutor for Compare {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let left = to_number(required(&params, "left", "Compare")?, "Compare")?;
        let right = to_number(required(&params, "right", "Compare")?, "Compare")?;
        let raw_operator = value_to_text(required(&params, "operator", "Compare")?);
        let operator = Comparison::parse(&raw_operator).ok_or_else(|| {
            ScenarioError::evaluation(
                FUNCTION_INVALID_ARGUMENT,
                format!("Compare does not know operator \"{}\".", raw_operator),
            )
        })?;
        Ok(Value::Bool(operator.holds(left, right)))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["left", "right", "operator"]
    }
}

/// First structurally equal `match` wins; cases are not ranked.
struct Switch;

impl FunctionExecutor for Switch {
    fn execute(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        for case in list_param(&params, "cases") {
            let Some(case) = case.as_object() else {
                continue;
            };
            let candidate = engine.interpolate(ctx, case.get("match").unwrap_or(&Value::Null))?;
            if values_equal(&candidate, &value) {
                return engine.interpolate(ctx, case.get("result").unwrap_or(&Value::Null));
            }
        }
        match params.get("defaultResult") {
            Some(default) => engine.interpolate(ctx, default),
            None => Ok(Value::Null),
        }
    }

    fn deferred_params(&self) -> &'static [&'static str] {
        &["cases", "defaultResult"]
    }
}

struct Equals;

impl FunctionExecutor for Equals {
    fn execute(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let values = list_param(&params, "values");
        let all_equal = match values.split_first() {
            Some((first, rest)) => rest.iter().all(|value| values_equal(first, value)),
            None => true,
        };
        let branch = if all_equal { "trueResult" } else { "falseResult" };
        match params.get(branch) {
            Some(expression) => engine.interpolate(ctx, expression),
            None => Ok(Value::Bool(all_equal)),
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["values"]
    }

    fn deferred_params(&self) -> &'static [&'static str] {
        &["trueResult", "falseResult"]
    }
}

pub(super) fn register(registry: &FunctionRegistry) {
    registry.install("Compare", Arc::new(Compare));
    registry.install("Switch", Arc::new(Switch));
    registry.install("Equals", Arc::new(Equals));
}
