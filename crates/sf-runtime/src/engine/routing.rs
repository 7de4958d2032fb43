use serde_json::{json, Value};
use sf_core::{InboundEvent, InboundPayload, ScenarioError, ValueMap, START_COMMAND};
use tokio::time::Instant;

use super::Engine;
use crate::context::ExecutionContext;
use crate::session::InputMatch;

pub const INPUT_STORE_FAILED: &str = "INPUT_STORE_FAILED";

impl Engine {
    /// Entry point for one demultiplexed inbound event. Holds the session
    /// lock for the whole dispatch, so events of one session run one at a
    /// time. Errors are logged here and returned; the session stays usable.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<(), ScenarioError> {
        let (handle, created) = self.sessions.get_or_create(&event.session_id);
        let guard = handle.lock_owned().await;
        let mut ctx = ExecutionContext::new(guard, &self.config.version);
        ctx.session_mut().touch();

        let overdue = ctx.session_mut().awaiting.expire_if_due(Instant::now());
        if let Some(pending) = overdue {
            self.notify_input_timeout(&event.session_id, &pending);
        }

        let result = self.route(&mut ctx, &event, created).await;
        ctx.session_mut().touch();
        if let Err(error) = &result {
            tracing::error!(
                session_id = event.session_id.as_str(),
                code = error.code.as_str(),
                %error,
                "event dispatch failed"
            );
        }
        result
    }

    /// Same as sending `/start`: resets navigation and runs start actions.
    pub async fn start_session(&self, session_id: &str) -> Result<(), ScenarioError> {
        self.handle_event(InboundEvent::text(session_id, START_COMMAND))
            .await
    }

    async fn route(
        &self,
        ctx: &mut ExecutionContext,
        event: &InboundEvent,
        created: bool,
    ) -> Result<(), ScenarioError> {
        if let InboundPayload::Callback { data, message_ref } = &event.payload {
            let mut locals = ValueMap::new();
            if let Some(message) = message_ref {
                locals.insert("messageId".to_string(), json!(message.as_str()));
            }
            return self.route_callback(ctx, data, locals).await;
        }

        let command = match &event.payload {
            InboundPayload::Text { text } => Some(text.trim()),
            _ => None,
        };
        if command == Some(START_COMMAND) {
            if let Some(abandoned) = ctx.session_mut().awaiting.cancel() {
                tracing::debug!(key = abandoned.key.as_str(), "restart discards pending input");
            }
            return self.run_start_actions(ctx).await;
        }

        if self.capture_input(ctx, event).await? {
            return Ok(());
        }

        if let Some(graph) = command.and_then(|command| self.scenario.command_graph(command)) {
            return self.run_graph(ctx, graph).await;
        }
        if created {
            return self.run_start_actions(ctx).await;
        }
        tracing::debug!(
            session_id = event.session_id.as_str(),
            kind = ?event.kind(),
            "event not routed"
        );
        Ok(())
    }

    async fn route_callback(
        &self,
        ctx: &mut ExecutionContext,
        callback_id: &str,
        locals: ValueMap,
    ) -> Result<(), ScenarioError> {
        let Some(entry) = self.callbacks.get(callback_id) else {
            tracing::debug!(callback_id, "unknown or evicted callback");
            return Ok(());
        };
        if entry.session_id != ctx.session().id {
            tracing::warn!(
                callback_id,
                owner = entry.session_id.as_str(),
                "callback belongs to another session, ignored"
            );
            return Ok(());
        }
        let previous = ctx.replace_params(entry.params);
        let mark = ctx.scope.create_scope(locals);
        let result = self.run_graph(ctx, &entry.graph).await;
        ctx.scope.restore(mark);
        ctx.replace_params(previous);
        result
    }

    /// Offers the event to the awaiting-input machine. Returns true when a
    /// pending wait consumed it.
    async fn capture_input(
        &self,
        ctx: &mut ExecutionContext,
        event: &InboundEvent,
    ) -> Result<bool, ScenarioError> {
        let pending = match ctx.session_mut().awaiting.offer(event.kind()) {
            InputMatch::Idle => return Ok(false),
            InputMatch::Mismatch => {
                tracing::debug!(
                    session_id = event.session_id.as_str(),
                    kind = ?event.kind(),
                    "input kind does not match the pending wait"
                );
                return Ok(false);
            }
            InputMatch::Matched(pending) => pending,
        };

        let value = captured_value(&event.payload);
        let attachments_key = format!("{}_attachments", pending.key);
        store(ctx, &pending.key, value.clone())?;
        if pending.allow_attachments {
            if let InboundPayload::Document { attachment, .. } = &event.payload {
                store(ctx, &attachments_key, json!([attachment.to_value()]))?;
            }
        }

        let mut locals = ValueMap::new();
        locals.insert("value".to_string(), value);
        let result = self
            .run_graph_with_locals(ctx, &pending.on_done, locals)
            .await;

        if pending.clear_after {
            ctx.session_mut().remove_data(&pending.key);
            ctx.session_mut().remove_data(&attachments_key);
        }
        result.map(|()| true)
    }
}

fn store(ctx: &mut ExecutionContext, key: &str, value: Value) -> Result<(), ScenarioError> {
    ctx.session_mut().set_data(key, value).map_err(|message| {
        ScenarioError::evaluation(
            INPUT_STORE_FAILED,
            format!("Cannot store input under \"{}\": {}", key, message),
        )
    })
}

fn captured_value(payload: &InboundPayload) -> Value {
    match payload {
        InboundPayload::Text { text } => Value::String(text.clone()),
        InboundPayload::Document {
            attachment,
            caption,
        } => Value::String(
            caption
                .clone()
                .filter(|caption| !caption.is_empty())
                .or_else(|| attachment.file_name.clone())
                .unwrap_or_else(|| attachment.file_id.clone()),
        ),
        InboundPayload::Contact { contact } => json!({
            "phone": contact.phone,
            "firstName": contact.first_name,
            "lastName": contact.last_name,
        }),
        InboundPayload::Callback { data, .. } => Value::String(data.clone()),
    }
}
