use std::sync::Arc;

use serde_json::{json, Value};
use sf_core::{is_blank, type_name, value_to_text, ScenarioError, ValueMap};

use super::{
    list_param, required, text_param, FunctionExecutor, FunctionRegistry, FUNCTION_NOT_AN_ARRAY,
};
use crate::context::ExecutionContext;
use crate::engine::Engine;

fn expect_array<'a>(value: &'a Value, function: &str) -> Result<&'a Vec<Value>, ScenarioError> {
    value.as_array().ok_or_else(|| {
        ScenarioError::evaluation(
            FUNCTION_NOT_AN_ARRAY,
            format!("{} expects an array, got {}.", function, type_name(value)),
        )
    })
}

struct JoinToString;

impl FunctionExecutor for JoinToString {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let separator = text_param(&params, "separator").unwrap_or_else(|| ", ".to_string());
        let prefix = text_param(&params, "prefix").unwrap_or_default();
        let suffix = text_param(&params, "suffix").unwrap_or_default();
        let parts: Vec<String> = list_param(&params, "values")
            .iter()
            .filter(|value| !is_blank(value))
            .map(value_to_text)
            .collect();
        Ok(Value::String(format!(
            "{}{}{}",
            prefix,
            parts.join(&separator),
            suffix
        )))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["values", "separator", "prefix", "suffix"]
    }
}

struct CombineArrays;

impl FunctionExecutor for CombineArrays {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let mut combined = Vec::new();
        for entry in list_param(&params, "arrays") {
            if let Value::Array(items) = entry {
                combined.extend(items);
            }
        }
        Ok(Value::Array(combined))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["arrays"]
    }
}

struct ArraySize;

impl FunctionExecutor for ArraySize {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let items = expect_array(required(&params, "array", "ArraySize")?, "ArraySize")?;
        Ok(json!(items.len()))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["array"]
    }
}

/// Interpolates `template` once per element with `it` and `index` bound in a
/// fresh frame.
struct MapArray;

impl FunctionExecutor for MapArray {
    fn execute(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let items = expect_array(required(&params, "array", "Map")?, "Map")?;
        let template = params.get("template").cloned().unwrap_or(Value::Null);
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut frame = ValueMap::new();
            frame.insert("it".to_string(), item.clone());
            frame.insert("index".to_string(), json!(index));
            let mark = ctx.scope.create_scope(frame);
            let result = engine.interpolate(ctx, &template);
            ctx.scope.restore(mark);
            results.push(result?);
        }
        Ok(Value::Array(results))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["array"]
    }

    fn deferred_params(&self) -> &'static [&'static str] {
        &["template"]
    }
}

pub(super) fn register(registry: &FunctionRegistry) {
    registry.install("JoinToString", Arc::new(JoinToString));
    registry.install("CombineArrays", Arc::new(CombineArrays));
    registry.install("ArraySize", Arc::new(ArraySize));
    registry.install("Map", Arc::new(MapArray));
}

#[cfg(test)]
mod collections_tests {
    use super::*;
    use crate::test_support::*;

    fn call(name: &str, args: Value) -> Result<Value, ScenarioError> {
        let engine = test_engine(scenario(json!({"data": {"fruits": ["apple", "pear"]}})));
        let mut ctx = context_for(&engine, "collections");
        engine.evaluate_function_sync(&mut ctx, &with_function(name, args))
    }

    #[test]
    fn join_to_string_drops_null_and_empty_entries() {
        let result = call(
            "JoinToString",
            json!({"values": ["a", null, "", 3, "b"], "separator": "|", "prefix": "[", "suffix": "]"}),
        )
        .expect("join");
        assert_eq!(result, json!("[a|3|b]"));
        let result = call("JoinToString", json!({"values": "{{data.fruits}}"})).expect("join");
        assert_eq!(result, json!("apple, pear"));
    }

    #[test]
    fn combine_arrays_skips_non_arrays() {
        let result = call(
            "CombineArrays",
            json!({"arrays": [[1, 2], "x", "{{data.fruits}}", null, [3]]}),
        )
        .expect("combine");
        assert_eq!(result, json!([1, 2, "apple", "pear", 3]));
    }

    #[test]
    fn array_size_requires_array() {
        assert_eq!(
            call("ArraySize", json!({"array": "{{data.fruits}}"})).expect("size"),
            json!(2)
        );
        let error = call("ArraySize", json!({"array": "nope"})).expect_err("not array");
        assert_eq!(error.code, FUNCTION_NOT_AN_ARRAY);
    }

    #[test]
    fn map_binds_it_and_index_per_element_and_pops_scope() {
        let engine = test_engine(scenario(json!({"data": {"fruits": ["apple", "pear"]}})));
        let mut ctx = context_for(&engine, "map");
        let result = engine
            .evaluate_function_sync(
                &mut ctx,
                &json!({
                    "function": "Map",
                    "array": "{{data.fruits}}",
                    "template": {"label": "{{index}}: {{it}}", "raw": "{{it}}"}
                }),
            )
            .expect("map");
        assert_eq!(
            result,
            json!([
                {"label": "0: apple", "raw": "apple"},
                {"label": "1: pear", "raw": "pear"}
            ])
        );
        assert!(ctx.scope().is_empty());
    }

    #[test]
    fn map_pops_scope_when_template_fails() {
        let engine = test_engine(scenario(json!({})));
        let mut ctx = context_for(&engine, "map");
        let error = engine
            .evaluate_function_sync(
                &mut ctx,
                &json!({
                    "function": "Map",
                    "array": [0],
                    "template": {"function": "Divide", "values": [1, "{{it}}"]}
                }),
            )
            .expect_err("divide by zero inside template");
        assert_eq!(error.code, super::super::FUNCTION_DIVISION_BY_ZERO);
        assert!(ctx.scope().is_empty());
    }
}
