use async_trait::async_trait;
use serde_json::Value;
use sf_core::{ScenarioError, ValueMap};

use super::{
    bool_field, field, required_text, text_field, ActionProcessor, ActionRegistry,
    ACTION_INVALID_FIELD,
};
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::session::DEFAULT_NAMESPACE;

async fn namespace_field(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
) -> Result<String, ScenarioError> {
    Ok(text_field(engine, ctx, fields, "namespace")
        .await?
        .filter(|namespace| !namespace.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
}

#[derive(Default)]
struct Store;

#[async_trait]
impl ActionProcessor for Store {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let namespace = namespace_field(engine, ctx, fields).await?;
        let key = required_text(engine, ctx, fields, "key", "Store").await?;
        let value = field(engine, ctx, fields, "value").await?;
        let clear_after_read = bool_field(engine, ctx, fields, "clearAfterRead", false).await?;
        ctx.session_mut()
            .storage
            .write(&namespace, &key, value, clear_after_read);
        Ok(())
    }
}

/// Copies a storage entry into session data under `saveTo`.
#[derive(Default)]
struct ReadStorage;

#[async_trait]
impl ActionProcessor for ReadStorage {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let namespace = namespace_field(engine, ctx, fields).await?;
        let key = required_text(engine, ctx, fields, "key", "ReadStorage").await?;
        let save_to = required_text(engine, ctx, fields, "saveTo", "ReadStorage").await?;
        let consume = bool_field(engine, ctx, fields, "consume", false).await?;
        let fallback = field(engine, ctx, fields, "fallback").await?;

        let value = ctx
            .session_mut()
            .storage
            .read(&namespace, &key, consume)
            .unwrap_or(fallback);
        if value == Value::Null {
            ctx.session_mut().remove_data(&save_to);
            return Ok(());
        }
        ctx.session_mut().set_data(&save_to, value).map_err(|message| {
            ScenarioError::evaluation(
                ACTION_INVALID_FIELD,
                format!("ReadStorage cannot save to \"{}\": {}", save_to, message),
            )
        })
    }
}

pub(super) fn register(registry: &ActionRegistry) {
    registry.install::<Store>("Store");
    registry.install::<ReadStorage>("ReadStorage");
}
