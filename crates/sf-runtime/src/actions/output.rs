use async_trait::async_trait;
use serde_json::{json, Value};
use sf_core::{value_to_text, Attachment, ChoiceButton, MessageRef, OutputOptions, ScenarioError, ValueMap};

use super::{
    field, graph_field, text_field, ActionProcessor, ActionRegistry, ACTION_INVALID_FIELD,
};
use crate::callbacks::CallbackEntry;
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::transport::TRANSPORT_MESSAGE_GONE;

/// Builds transport options from `buttons`, `attachments` and `parseMode`.
/// Each button's `onClick` graph is parked in the callback table under a
/// fresh id; its `params` become the params tier when it is pressed.
pub(crate) async fn output_options(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
    action: &str,
) -> Result<OutputOptions, ScenarioError> {
    let mut options = OutputOptions {
        parse_mode: text_field(engine, ctx, fields, "parseMode").await?,
        ..OutputOptions::default()
    };

    let rows = match field(engine, ctx, fields, "buttons").await? {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows,
        _ => return Err(invalid(action, "buttons", "a list of rows")),
    };
    let session_id = ctx.session_id();
    for row in rows {
        let buttons = match row {
            Value::Array(buttons) => buttons,
            single @ Value::Object(_) => vec![single],
            _ => return Err(invalid(action, "buttons", "rows of button objects")),
        };
        let mut rendered = Vec::with_capacity(buttons.len());
        for button in buttons {
            let Value::Object(button) = button else {
                return Err(invalid(action, "buttons", "rows of button objects"));
            };
            rendered.push(choice_button(engine, &session_id, &button));
        }
        if !rendered.is_empty() {
            options.buttons.push(rendered);
        }
    }

    match field(engine, ctx, fields, "attachments").await? {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                let attachment: Attachment = serde_json::from_value(item)
                    .map_err(|_| invalid(action, "attachments", "{kind, fileId, fileName?} objects"))?;
                options.attachments.push(attachment);
            }
        }
        _ => return Err(invalid(action, "attachments", "a list")),
    }
    Ok(options)
}

fn choice_button(engine: &Engine, session_id: &str, button: &ValueMap) -> ChoiceButton {
    let text = button.get("text").map(value_to_text).unwrap_or_default();
    if let Some(url) = button.get("url").filter(|url| !url.is_null()) {
        return ChoiceButton {
            text,
            callback_id: None,
            url: Some(value_to_text(url)),
        };
    }
    let params = match button.get("params") {
        Some(Value::Object(params)) => params.clone(),
        _ => ValueMap::new(),
    };
    let callback_id = engine.callbacks().insert(CallbackEntry {
        session_id: session_id.to_string(),
        graph: graph_field(button, "onClick"),
        params,
    });
    ChoiceButton {
        text,
        callback_id: Some(callback_id),
        url: None,
    }
}

fn invalid(action: &str, name: &str, expected: &str) -> ScenarioError {
    ScenarioError::evaluation(
        ACTION_INVALID_FIELD,
        format!("{} field \"{}\" must be {}.", action, name, expected),
    )
}

/// `messageId` names a raw message id, `message` a name given by
/// `saveAs`; otherwise the session's last emitted message.
async fn target_message(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    fields: &ValueMap,
) -> Result<Option<MessageRef>, ScenarioError> {
    if let Some(id) = text_field(engine, ctx, fields, "messageId").await? {
        return Ok(Some(MessageRef::new(id)));
    }
    if let Some(name) = text_field(engine, ctx, fields, "message").await? {
        return Ok(ctx.session().messages.get(&name).cloned());
    }
    Ok(ctx.session().last_message.clone())
}

/// Deletes `message`, treating "already gone" as done.
pub(crate) async fn delete_message(
    engine: &Engine,
    ctx: &mut ExecutionContext,
    message: &MessageRef,
) -> Result<(), ScenarioError> {
    let session_id = ctx.session_id();
    match engine.transport().delete(&session_id, message).await {
        Ok(()) => {}
        Err(error) if error.code == TRANSPORT_MESSAGE_GONE => {
            tracing::warn!(session_id = session_id.as_str(), message = %message, "message already gone");
        }
        Err(error) => return Err(error),
    }
    ctx.session_mut().forget_message(message);
    Ok(())
}

#[derive(Default)]
struct EmitOutput;

#[async_trait]
impl ActionProcessor for EmitOutput {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let text = text_field(engine, ctx, fields, "text")
            .await?
            .unwrap_or_default();
        let options = output_options(engine, ctx, fields, "EmitOutput").await?;
        let save_as = text_field(engine, ctx, fields, "saveAs").await?;

        let session_id = ctx.session_id();
        let message = engine.transport().send(&session_id, &text, &options).await?;
        ctx.session_mut()
            .remember_message(save_as.as_deref(), message.clone());

        let on_success = graph_field(fields, "onSuccess");
        if on_success.is_null() {
            return Ok(());
        }
        let mut locals = ValueMap::new();
        locals.insert("messageId".to_string(), json!(message.as_str()));
        engine
            .run_graph_with_locals(ctx, &on_success, locals)
            .await
    }
}

#[derive(Default)]
struct EditOutput;

#[async_trait]
impl ActionProcessor for EditOutput {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let Some(message) = target_message(engine, ctx, fields).await? else {
            tracing::warn!(session_id = ctx.session().id.as_str(), "nothing to edit");
            return Ok(());
        };
        let text = text_field(engine, ctx, fields, "text")
            .await?
            .unwrap_or_default();
        let options = output_options(engine, ctx, fields, "EditOutput").await?;
        let session_id = ctx.session_id();
        match engine
            .transport()
            .edit(&session_id, &message, &text, &options)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if error.code == TRANSPORT_MESSAGE_GONE => {
                tracing::warn!(session_id = session_id.as_str(), message = %message, "message already gone");
                ctx.session_mut().forget_message(&message);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

#[derive(Default)]
struct DeleteOutput;

#[async_trait]
impl ActionProcessor for DeleteOutput {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        match target_message(engine, ctx, fields).await? {
            Some(message) => delete_message(engine, ctx, &message).await,
            None => {
                tracing::warn!(session_id = ctx.session().id.as_str(), "nothing to delete");
                Ok(())
            }
        }
    }
}

pub(super) fn register(registry: &ActionRegistry) {
    registry.install::<EmitOutput>("EmitOutput");
    registry.install::<EditOutput>("EditOutput");
    registry.install::<DeleteOutput>("DeleteOutput");
}
