use async_trait::async_trait;
use serde_json::{json, Value};
use sf_core::{value_to_text, ScenarioError, ValueMap};

use super::{
    field, graph_field, object_field, required_text, seconds_field, text_field, ActionProcessor,
    ActionRegistry, ACTION_INVALID_FIELD,
};
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::http::{EndpointRequest, EndpointResponse};

pub const ENDPOINT_TIMEOUT: &str = "ENDPOINT_TIMEOUT";
pub const ENDPOINT_STATUS: &str = "ENDPOINT_STATUS";

fn pairs(map: ValueMap) -> Vec<(String, String)> {
    map.into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name, value_to_text(&value)))
        .collect()
}

fn error_value(error: &ScenarioError, status: Option<u16>) -> Value {
    let mut value = json!({"code": error.code, "message": error.message});
    if let (Some(status), Some(map)) = (status, value.as_object_mut()) {
        map.insert("status".to_string(), json!(status));
    }
    value
}

/// One outbound request under a hard deadline. The outcome is exposed to
/// `onSuccess` as local `response` and to `onFailure` as local `error`.
#[derive(Default)]
struct CallExternalEndpoint;

impl CallExternalEndpoint {
    async fn build_request(
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<EndpointRequest, ScenarioError> {
        let method = text_field(engine, ctx, fields, "method")
            .await?
            .filter(|method| !method.trim().is_empty())
            .unwrap_or_else(|| "GET".to_string())
            .to_ascii_uppercase();
        let url = required_text(engine, ctx, fields, "url", "CallExternalEndpoint").await?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ScenarioError::evaluation(
                ACTION_INVALID_FIELD,
                format!("CallExternalEndpoint url \"{}\" is not http(s).", url),
            ));
        }
        let query = pairs(object_field(engine, ctx, fields, "params", "CallExternalEndpoint").await?);
        let headers =
            pairs(object_field(engine, ctx, fields, "headers", "CallExternalEndpoint").await?);
        let body = Some(field(engine, ctx, fields, "body").await?).filter(|body| !body.is_null());
        Ok(EndpointRequest {
            method,
            url,
            query,
            headers,
            body,
        })
    }
}

#[async_trait]
impl ActionProcessor for CallExternalEndpoint {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let request = Self::build_request(engine, ctx, fields).await?;
        let deadline = seconds_field(engine, ctx, fields, "timeout", "CallExternalEndpoint")
            .await?
            .unwrap_or_else(|| engine.config().endpoint_timeout());
        let response_key = text_field(engine, ctx, fields, "responseKey").await?;
        let save_to = text_field(engine, ctx, fields, "saveTo").await?;

        engine.run_graph(ctx, &graph_field(fields, "onStart")).await?;

        let method = request.method.clone();
        let url = request.url.clone();
        tracing::debug!(method = method.as_str(), url = url.as_str(), "endpoint call");
        let outcome = match tokio::time::timeout(deadline, engine.http().execute(request)).await {
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => {
                let error = ScenarioError::evaluation(
                    ENDPOINT_STATUS,
                    format!("{} {} answered with status {}.", method, url, response.status),
                );
                Err((error, Some(response)))
            }
            Ok(Err(error)) => Err((error, None)),
            Err(_) => Err((
                ScenarioError::timeout(
                    ENDPOINT_TIMEOUT,
                    format!("{} {} exceeded {:?}.", method, url, deadline),
                ),
                None,
            )),
        };

        match outcome {
            Ok(response) => on_success(engine, ctx, fields, response, response_key, save_to).await,
            Err((error, response)) => on_failure(engine, ctx, fields, error, response).await,
        }
    }
}

async fn on_success(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    response: EndpointResponse,
    response_key: Option<String>,
    save_to: Option<String>,
) -> Result<(), ScenarioError> {
    if let Some(save_to) = save_to.filter(|path| !path.is_empty()) {
        ctx.session_mut()
            .set_data(&save_to, response.body.clone())
            .map_err(|message| {
                ScenarioError::evaluation(
                    ACTION_INVALID_FIELD,
                    format!("CallExternalEndpoint cannot save to \"{}\": {}", save_to, message),
                )
            })?;
    }
    let value = response.to_value();
    let mut locals = ValueMap::new();
    if let Some(alias) = response_key.filter(|alias| !alias.is_empty()) {
        locals.insert(alias, value.clone());
    }
    locals.insert("response".to_string(), value);
    engine
        .run_graph_with_locals(ctx, &graph_field(fields, "onSuccess"), locals)
        .await
}

async fn on_failure(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    error: ScenarioError,
    response: Option<EndpointResponse>,
) -> Result<(), ScenarioError> {
    let on_failure = graph_field(fields, "onFailure");
    if on_failure.is_null() {
        tracing::warn!(
            session_id = ctx.session().id.as_str(),
            code = error.code.as_str(),
            %error,
            "endpoint call failed without onFailure"
        );
        return Ok(());
    }
    let mut locals = ValueMap::new();
    locals.insert(
        "error".to_string(),
        error_value(&error, response.as_ref().map(|response| response.status)),
    );
    if let Some(response) = response {
        locals.insert("response".to_string(), response.to_value());
    }
    engine.run_graph_with_locals(ctx, &on_failure, locals).await
}

pub(super) fn register(registry: &ActionRegistry) {
    registry.install::<CallExternalEndpoint>("CallExternalEndpoint");
}
