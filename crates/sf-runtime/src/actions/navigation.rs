use async_trait::async_trait;
use sf_core::{ScenarioError, ValueMap};

use super::output::delete_message;
use super::{bool_field, object_field, required_text, ActionProcessor, ActionRegistry};
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::session::BackOutcome;

/// Enters a menu. An unknown target resets navigation and restarts.
#[derive(Default)]
struct Navigate;

#[async_trait]
impl ActionProcessor for Navigate {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let target = required_text(engine, ctx, fields, "target", "Navigate").await?;
        let add_to_back_stack = bool_field(engine, ctx, fields, "addToBackStack", true).await?;
        let unique_in_stack = bool_field(engine, ctx, fields, "uniqueInStack", false).await?;
        let params = object_field(engine, ctx, fields, "params", "Navigate").await?;

        let Some(graph) = engine.scenario().menu_graph(&target) else {
            tracing::warn!(
                session_id = ctx.session().id.as_str(),
                menu = target.as_str(),
                "unknown navigation target, restarting"
            );
            return engine.run_start_actions(ctx).await;
        };
        ctx.session_mut()
            .navigation
            .navigate(&target, add_to_back_stack, unique_in_stack);
        tracing::debug!(session_id = ctx.session().id.as_str(), menu = target.as_str(), "navigate");
        engine.run_graph_with_params(ctx, graph, params).await
    }
}

#[derive(Default)]
struct Back;

#[async_trait]
impl ActionProcessor for Back {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        if bool_field(engine, ctx, fields, "removePreviousMessage", false).await? {
            if let Some(message) = ctx.session().last_message.clone() {
                if let Err(error) = delete_message(engine, ctx, &message).await {
                    tracing::warn!(code = error.code.as_str(), %error, "could not remove previous message");
                }
            }
        }

        match ctx.session_mut().navigation.back() {
            BackOutcome::Menu(menu) => match engine.scenario().menu_graph(&menu) {
                Some(graph) => engine.run_graph(ctx, graph).await,
                None => engine.run_start_actions(ctx).await,
            },
            BackOutcome::Restart => engine.run_start_actions(ctx).await,
        }
    }
}

pub(super) fn register(registry: &ActionRegistry) {
    registry.install::<Navigate>("Navigate");
    registry.install::<Back>("Back");
}
