use async_trait::async_trait;
use serde_json::json;
use sf_core::{ChoiceButton, InputKind, ScenarioError, ValueMap};

use super::output::output_options;
use super::{
    bool_field, graph_field, required_text, seconds_field, text_field, ActionProcessor,
    ActionRegistry, ACTION_INVALID_FIELD,
};
use crate::callbacks::CallbackEntry;
use crate::context::ExecutionContext;
use crate::engine::Engine;
use crate::session::PendingInput;

/// Arms the session's input wait and renders the prompt. Arming replaces
/// any wait already pending; the replaced wait's graphs never run.
#[derive(Default)]
struct RequestInput;

#[async_trait]
impl ActionProcessor for RequestInput {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let key = required_text(engine, ctx, fields, "key", "RequestInput").await?;
        let input_kind = match text_field(engine, ctx, fields, "inputType").await? {
            None => InputKind::default(),
            Some(raw) => InputKind::parse(&raw).ok_or_else(|| {
                ScenarioError::evaluation(
                    ACTION_INVALID_FIELD,
                    format!("RequestInput does not know inputType \"{}\".", raw),
                )
            })?,
        };
        let prompt = match text_field(engine, ctx, fields, "text").await? {
            Some(text) => Some(text),
            None => text_field(engine, ctx, fields, "hint").await?,
        };
        let cancel_text = text_field(engine, ctx, fields, "cancelText").await?;

        let mut pending = PendingInput::new(key, input_kind, graph_field(fields, "onDone"));
        pending.on_cancel = graph_field(fields, "onCancel");
        pending.allow_attachments = bool_field(engine, ctx, fields, "allowAttachments", false).await?;
        pending.clear_after = bool_field(engine, ctx, fields, "clearAfter", false).await?;
        pending.timeout = seconds_field(engine, ctx, fields, "timeout", "RequestInput").await?;
        let timeout = pending.timeout;

        let session_id = ctx.session_id();
        let (generation, abandoned) = ctx.session_mut().awaiting.arm(pending);
        if let Some(abandoned) = abandoned {
            tracing::warn!(
                session_id = session_id.as_str(),
                abandoned = abandoned.key.as_str(),
                "input re-armed, previous wait abandoned"
            );
        }
        if let Some(timeout) = timeout {
            engine.schedule_input_timeout(ctx.session_handle(), generation, timeout);
        }

        let Some(prompt) = prompt else {
            return Ok(());
        };
        let mut options = output_options(engine, ctx, fields, "RequestInput").await?;
        if let Some(cancel_text) = cancel_text {
            let callback_id = engine.callbacks().insert(CallbackEntry {
                session_id: session_id.clone(),
                graph: json!({"action": "CancelAwaitingInput"}),
                params: ValueMap::new(),
            });
            options.buttons.push(vec![ChoiceButton {
                text: cancel_text,
                callback_id: Some(callback_id),
                url: None,
            }]);
        }
        let message = engine.transport().send(&session_id, &prompt, &options).await?;
        ctx.session_mut().remember_message(None, message);
        Ok(())
    }
}

#[derive(Default)]
struct CancelAwaitingInput;

#[async_trait]
impl ActionProcessor for CancelAwaitingInput {
    async fn process(
        &self,
        engine: &Engine,
        ctx: &mut ExecutionContext,
        _fields: &ValueMap,
    ) -> Result<(), ScenarioError> {
        let Some(pending) = ctx.session_mut().awaiting.cancel() else {
            tracing::debug!(session_id = ctx.session().id.as_str(), "no pending input to cancel");
            return Ok(());
        };
        engine.run_graph(ctx, &pending.on_cancel).await
    }
}

pub(super) fn register(registry: &ActionRegistry) {
    registry.install::<RequestInput>("RequestInput");
    registry.install::<CancelAwaitingInput>("CancelAwaitingInput");
}

#[cfg(test)]
mod input_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};
    use sf_core::{Attachment, Contact, InboundEvent};

    use super::*;
    use crate::test_support::*;
    use crate::transport::MemoryTransport;

    fn input_engine(start: Value) -> (Engine, Arc<MemoryTransport>) {
        test_engine_with(
            scenario(json!({"startActions": start})),
            Arc::new(ScriptedHttpClient::default()),
        )
    }

    fn data(engine: &Engine, session_id: &str, key: &str) -> Option<Value> {
        let handle = engine.sessions().get(session_id).expect("session");
        let session = handle.try_lock().expect("unlocked");
        session.get_data(key).cloned()
    }

    #[tokio::test]
    async fn matching_text_is_stored_and_completion_sees_value() {
        let (engine, transport) = input_engine(json!({
            "action": "RequestInput",
            "key": "profile.name",
            "text": "Your name?",
            "onDone": {"action": "EmitOutput", "text": "Hi {{value}} / {{profile.name}}"}
        }));
        engine.start_session("u1").await.expect("start");
        assert_eq!(transport.sent_texts(), vec!["Your name?".to_string()]);

        engine
            .handle_event(InboundEvent::text("u1", "Ann"))
            .await
            .expect("input");
        assert_eq!(transport.sent_texts().last().map(String::as_str), Some("Hi Ann / Ann"));
        assert_eq!(data(&engine, "u1", "profile.name"), Some(json!("Ann")));
    }

    #[tokio::test]
    async fn mismatched_kind_keeps_waiting() {
        let (engine, transport) = input_engine(json!({
            "action": "RequestInput",
            "key": "phone",
            "inputType": "contact",
            "onDone": {"action": "EmitOutput", "text": "got {{value.phone}}"}
        }));
        engine.start_session("u1").await.expect("start");
        engine
            .handle_event(InboundEvent::text("u1", "not a contact"))
            .await
            .expect("ignored");
        assert!(transport.sent_texts().is_empty());

        engine
            .handle_event(InboundEvent::contact(
                "u1",
                Contact {
                    phone: "+100".to_string(),
                    first_name: "Ann".to_string(),
                    last_name: String::new(),
                },
            ))
            .await
            .expect("contact");
        assert_eq!(transport.sent_texts(), vec!["got +100".to_string()]);
        assert_eq!(
            data(&engine, "u1", "phone"),
            Some(json!({"phone": "+100", "firstName": "Ann", "lastName": ""}))
        );
    }

    #[tokio::test]
    async fn rearming_abandons_the_first_wait_by_design() {
        // Last writer wins: the first wait's graphs never run.
        let (engine, transport) = input_engine(json!([
            {
                "action": "RequestInput",
                "key": "first",
                "onDone": {"action": "EmitOutput", "text": "first done"},
                "onCancel": {"action": "EmitOutput", "text": "first cancelled"}
            },
            {
                "action": "RequestInput",
                "key": "second",
                "onDone": {"action": "EmitOutput", "text": "second done {{value}}"}
            }
        ]));
        engine.start_session("u1").await.expect("start");
        engine
            .handle_event(InboundEvent::text("u1", "x"))
            .await
            .expect("input");
        assert_eq!(transport.sent_texts(), vec!["second done x".to_string()]);
        assert_eq!(data(&engine, "u1", "first"), None);
        assert_eq!(data(&engine, "u1", "second"), Some(json!("x")));
    }

    #[tokio::test]
    async fn cancel_button_runs_cancel_graph() {
        let (engine, transport) = input_engine(json!({
            "action": "RequestInput",
            "key": "city",
            "text": "City?",
            "cancelText": "Never mind",
            "onDone": {"action": "EmitOutput", "text": "done"},
            "onCancel": {"action": "EmitOutput", "text": "cancelled"}
        }));
        engine.start_session("u1").await.expect("start");
        let (_, _, options) = transport.last_sent().expect("prompt");
        assert_eq!(options.buttons[0][0].text, "Never mind");
        let callback_id = options.buttons[0][0].callback_id.clone().expect("id");

        engine
            .handle_event(InboundEvent::callback("u1", callback_id))
            .await
            .expect("cancel");
        assert_eq!(transport.sent_texts().last().map(String::as_str), Some("cancelled"));
        engine
            .handle_event(InboundEvent::text("u1", "Paris"))
            .await
            .expect("no longer waiting");
        assert_eq!(data(&engine, "u1", "city"), None);
    }

    #[tokio::test]
    async fn attachments_and_clear_after() {
        let (engine, transport) = input_engine(json!({
            "action": "RequestInput",
            "key": "doc",
            "allowAttachments": true,
            "clearAfter": true,
            "onDone": {"action": "EmitOutput", "text": "{{value}} {{doc_attachments}}"}
        }));
        engine.start_session("u1").await.expect("start");
        engine
            .handle_event(InboundEvent::document(
                "u1",
                Attachment {
                    kind: "document".to_string(),
                    file_id: "f-1".to_string(),
                    file_name: Some("cv.pdf".to_string()),
                },
                None,
            ))
            .await
            .expect("document");
        assert_eq!(
            transport.sent_texts(),
            vec![
                "cv.pdf [{\"fileId\":\"f-1\",\"fileName\":\"cv.pdf\",\"kind\":\"document\"}]"
                    .to_string()
            ]
        );
        assert_eq!(data(&engine, "u1", "doc"), None);
        assert_eq!(data(&engine, "u1", "doc_attachments"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_clears_the_wait() {
        let (engine, transport) = input_engine(json!({
            "action": "RequestInput",
            "key": "code",
            "timeout": 30,
            "onDone": {"action": "EmitOutput", "text": "code {{value}}"}
        }));
        engine.start_session("u1").await.expect("start");
        tokio::time::sleep(Duration::from_secs(31)).await;
        engine
            .handle_event(InboundEvent::text("u1", "1234"))
            .await
            .expect("late input");
        assert!(transport.sent_texts().is_empty());
        assert_eq!(data(&engine, "u1", "code"), None);
    }

    #[tokio::test]
    async fn completion_actions_read_value_from_the_captured_input() {
        let (engine, transport) = input_engine(json!({
            "action": "RequestInput",
            "key": "answer",
            "onDone": [
                {"action": "Store", "key": "saved", "value": "{{value}}"},
                {"action": "EmitOutput", "text": "{{key}}={{value}}"}
            ]
        }));
        engine.start_session("u1").await.expect("start");
        engine
            .handle_event(InboundEvent::text("u1", "Ann"))
            .await
            .expect("input");

        let handle = engine.sessions().get("u1").expect("session");
        let stored = handle
            .try_lock()
            .expect("unlocked")
            .storage
            .read(crate::session::DEFAULT_NAMESPACE, "saved", false);
        assert_eq!(stored, Some(json!("Ann")));
        assert_eq!(transport.sent_texts(), vec!["{{key}}=Ann".to_string()]);
    }

    #[tokio::test]
    async fn oversized_timeout_is_rejected_and_large_one_arms() {
        let engine = test_engine(scenario(json!({})));
        let mut ctx = context_for(&engine, "u1");
        let error = engine
            .run_graph(
                &mut ctx,
                &json!({"action": "RequestInput", "key": "k", "timeout": 1e20}),
            )
            .await
            .expect_err("beyond Duration range");
        assert_eq!(error.code, ACTION_INVALID_FIELD);
        assert!(!ctx.session().awaiting.is_waiting());

        engine
            .run_graph(
                &mut ctx,
                &json!({"action": "RequestInput", "key": "k", "timeout": 1e15}),
            )
            .await
            .expect("large but representable");
        assert!(ctx.session().awaiting.is_waiting());
    }

    #[tokio::test]
    async fn unknown_input_type_is_an_error() {
        let engine = test_engine(scenario(json!({})));
        let mut ctx = context_for(&engine, "u1");
        let error = engine
            .run_graph(
                &mut ctx,
                &json!({"action": "RequestInput", "key": "k", "inputType": "video"}),
            )
            .await
            .expect_err("bad type");
        assert_eq!(error.code, ACTION_INVALID_FIELD);
        assert!(!ctx.session().awaiting.is_waiting());
    }
}
