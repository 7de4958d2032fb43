use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use sf_core::{
    descriptor_name, is_action_descriptor, is_function_descriptor, lookup_in_map, parse_path,
    value_to_text, ScenarioError, ValueMap, FUNCTION_KEY,
};

use super::Engine;
use crate::context::ExecutionContext;
use crate::functions::FUNCTION_NOT_FOUND;

const VALUES_KEYWORD: &str = "values";

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("token regex must compile"))
}

fn identifier_regex() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$")
            .expect("identifier regex must compile")
    })
}

fn function_name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("name regex must compile"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Local,
    Params,
    Data,
    Env,
}

impl Source {
    const PRIORITY: [Source; 4] = [Source::Local, Source::Params, Source::Data, Source::Env];

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "local" => Some(Self::Local),
            "params" => Some(Self::Params),
            "data" => Some(Self::Data),
            "env" => Some(Self::Env),
            _ => None,
        }
    }
}

impl Engine {
    /// Walks `value` and substitutes `{{...}}` tokens. Function descriptors
    /// are evaluated in place; action descriptors are left for their
    /// processor.
    pub fn interpolate(
        &self,
        ctx: &mut ExecutionContext,
        value: &Value,
    ) -> Result<Value, ScenarioError> {
        match value {
            Value::String(text) => self.interpolate_text(ctx, text),
            Value::Array(items) => items
                .iter()
                .map(|item| self.interpolate(ctx, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(_) if is_action_descriptor(value) => Ok(value.clone()),
            Value::Object(_) if is_function_descriptor(value) => {
                match self.evaluate_function_sync(ctx, value) {
                    Err(error) if error.is_resolution() => {
                        tracing::warn!(code = error.code.as_str(), %error, "function left unevaluated");
                        Ok(value.clone())
                    }
                    other => other,
                }
            }
            Value::Object(fields) => self.interpolate_fields(ctx, fields).map(Value::Object),
            _ => Ok(value.clone()),
        }
    }

    /// Interpolates each field of a map, including an action descriptor's own
    /// fields, without descending into nested action descriptors.
    pub(crate) fn interpolate_fields(
        &self,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<ValueMap, ScenarioError> {
        let mut out = ValueMap::new();
        for (key, field) in fields {
            out.insert(key.clone(), self.interpolate(ctx, field)?);
        }
        Ok(out)
    }

    fn interpolate_text(
        &self,
        ctx: &mut ExecutionContext,
        text: &str,
    ) -> Result<Value, ScenarioError> {
        let regex = token_regex();
        if let Some(captures) = regex.captures(text) {
            let (Some(full), Some(expr)) = (captures.get(0), captures.get(1)) else {
                return Ok(Value::String(text.to_string()));
            };
            if full.start() == 0 && full.end() == text.len() {
                return Ok(self
                    .resolve_token(ctx, expr.as_str())?
                    .unwrap_or_else(|| Value::String(text.to_string())));
            }
        } else {
            return Ok(Value::String(text.to_string()));
        }

        let mut output = String::new();
        let mut last_index = 0usize;
        for captures in regex.captures_iter(text) {
            let (Some(full), Some(expr)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            output.push_str(&text[last_index..full.start()]);
            match self.resolve_token(ctx, expr.as_str())? {
                Some(resolved) => output.push_str(&value_to_text(&resolved)),
                None => output.push_str(full.as_str()),
            }
            last_index = full.end();
        }
        output.push_str(&text[last_index..]);
        Ok(Value::String(output))
    }

    /// `None` means unresolved; the caller keeps the literal token.
    fn resolve_token(
        &self,
        ctx: &mut ExecutionContext,
        expr: &str,
    ) -> Result<Option<Value>, ScenarioError> {
        if let Some((name, rest)) = expr.split_once(':') {
            let name = name.trim();
            if function_name_regex().is_match(name) {
                return self.call_shorthand(ctx, name, rest);
            }
        }
        Ok(self.lookup_variable(ctx, expr))
    }

    /// Resolves a dotted path. An explicit `local.`/`params.`/`data.`/`env.`
    /// prefix pins the source; otherwise local > params > data > env.
    pub fn lookup_variable(&self, ctx: &ExecutionContext, path: &str) -> Option<Value> {
        let parts = parse_path(path);
        let (root, rest) = parts.split_first()?;
        if let Some(source) = Source::from_prefix(root) {
            if rest.is_empty() {
                return self.source_root(ctx, source);
            }
            return self.lookup_in(ctx, source, rest);
        }
        Source::PRIORITY
            .iter()
            .find_map(|source| self.lookup_in(ctx, *source, &parts))
    }

    fn lookup_in(&self, ctx: &ExecutionContext, source: Source, parts: &[String]) -> Option<Value> {
        match source {
            Source::Local => ctx.scope().find_variable(&parts.join(".")).cloned(),
            Source::Params => lookup_in_map(ctx.params(), parts).cloned(),
            Source::Data => lookup_in_map(&ctx.session().data, parts)
                .or_else(|| lookup_in_map(&self.scenario.data, parts))
                .cloned(),
            Source::Env => lookup_in_map(ctx.env(), parts).cloned(),
        }
    }

    fn source_root(&self, ctx: &ExecutionContext, source: Source) -> Option<Value> {
        match source {
            Source::Local => None,
            Source::Params => Some(Value::Object(ctx.params().clone())),
            Source::Data => {
                let mut merged = self.scenario.data.clone();
                merged.extend(ctx.session().data.clone());
                Some(Value::Object(merged))
            }
            Source::Env => Some(Value::Object(ctx.env().clone())),
        }
    }

    /// `Name:key:value:values:a:b:c` shorthand. Unknown names stay literal.
    fn call_shorthand(
        &self,
        ctx: &mut ExecutionContext,
        name: &str,
        args: &str,
    ) -> Result<Option<Value>, ScenarioError> {
        let keywords: Vec<String> = match self.functions.get(name) {
            Some(executor) => executor.keywords().iter().map(|k| k.to_string()).collect(),
            None => match self.scenario.functions.get(name) {
                Some(function) => function.params.keys().cloned().collect(),
                None => {
                    tracing::warn!(function = name, "unknown function in shorthand token");
                    return Ok(None);
                }
            },
        };
        let is_keyword = |part: &str| part == VALUES_KEYWORD || keywords.iter().any(|k| k == part);

        let parts: Vec<&str> = args.split(':').map(str::trim).collect();
        let mut params = ValueMap::new();
        let mut index = 0usize;
        while index < parts.len() {
            let key = parts[index];
            index += 1;
            if key == VALUES_KEYWORD {
                let mut values = Vec::new();
                while index < parts.len() && !is_keyword(parts[index]) {
                    values.push(self.shorthand_argument(ctx, parts[index]));
                    index += 1;
                }
                params.insert(VALUES_KEYWORD.to_string(), Value::Array(values));
                continue;
            }
            let value = match parts.get(index) {
                Some(raw) => self.shorthand_argument(ctx, raw),
                None => Value::Null,
            };
            index += 1;
            params.insert(key.to_string(), value);
        }

        params.insert(FUNCTION_KEY.to_string(), Value::String(name.to_string()));
        match self.evaluate_function_sync(ctx, &Value::Object(params)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.is_resolution() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Identifier-shaped arguments are variable references; anything else
    /// is read as JSON, falling back to the raw text.
    fn shorthand_argument(&self, ctx: &ExecutionContext, raw: &str) -> Value {
        if identifier_regex().is_match(raw) {
            if let Some(value) = self.lookup_variable(ctx, raw) {
                return value;
            }
        }
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }

    /// Evaluates a function descriptor synchronously. Action descriptors
    /// produced by scenario functions are queued on the context.
    pub fn evaluate_function_sync(
        &self,
        ctx: &mut ExecutionContext,
        descriptor: &Value,
    ) -> Result<Value, ScenarioError> {
        let fields = descriptor.as_object().ok_or_else(|| {
            ScenarioError::evaluation(
                "FUNCTION_INVALID_DESCRIPTOR",
                "function descriptor must be an object",
            )
        })?;
        let name = descriptor_name(fields, FUNCTION_KEY).ok_or_else(|| {
            ScenarioError::evaluation(
                "FUNCTION_INVALID_DESCRIPTOR",
                "function descriptor needs a string \"function\" field",
            )
        })?;
        let mut params = fields.clone();
        params.remove(FUNCTION_KEY);

        if let Some(executor) = self.functions.get(name) {
            let deferred = executor.deferred_params();
            for (key, value) in params.iter_mut() {
                if !deferred.contains(&key.as_str()) {
                    *value = self.interpolate(ctx, value)?;
                }
            }
            return executor.execute(self, ctx, params);
        }

        let Some(function) = self.scenario.functions.get(name) else {
            return Err(ScenarioError::resolution(
                FUNCTION_NOT_FOUND,
                format!("Function \"{}\" is not registered or declared.", name),
            ));
        };

        let mut arguments = function.params.clone();
        arguments.extend(params);
        let arguments = self.interpolate_fields(ctx, &arguments)?;

        let previous = ctx.replace_params(arguments.clone());
        let mark = ctx.scope.create_scope(arguments);
        let result = match &function.result {
            Value::Object(fields) if is_action_descriptor(&function.result) => {
                self.interpolate_fields(ctx, fields).map(Value::Object)
            }
            other => self.interpolate(ctx, other),
        };
        ctx.scope.restore(mark);
        ctx.replace_params(previous);

        let result = result?;
        if is_action_descriptor(&result) {
            ctx.pending_effects.push(result.clone());
        }
        Ok(result)
    }

    /// Interpolates `value`, then dispatches any action descriptors queued by
    /// scenario functions along the way.
    pub async fn resolve(
        &self,
        ctx: &mut ExecutionContext,
        value: &Value,
    ) -> Result<Value, ScenarioError> {
        let resolved = self.interpolate(ctx, value);
        self.flush_effects(ctx, resolved).await
    }

    pub async fn evaluate_function(
        &self,
        ctx: &mut ExecutionContext,
        descriptor: &Value,
    ) -> Result<Value, ScenarioError> {
        let evaluated = self.evaluate_function_sync(ctx, descriptor);
        self.flush_effects(ctx, evaluated).await
    }

    async fn flush_effects(
        &self,
        ctx: &mut ExecutionContext,
        outcome: Result<Value, ScenarioError>,
    ) -> Result<Value, ScenarioError> {
        let effects = std::mem::take(&mut ctx.pending_effects);
        let value = outcome?;
        for effect in &effects {
            self.run_action(ctx, effect).await?;
        }
        Ok(value)
    }
}
