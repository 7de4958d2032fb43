use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use sf_core::{
    descriptor_name, graph_items, is_function_descriptor, ScenarioError, ValueMap, ACTION_KEY,
};

use super::Engine;
use crate::context::ExecutionContext;

pub type GraphFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ScenarioError>> + Send + 'a>>;

impl Engine {
    /// Runs one descriptor or an ordered list of them. Each entry finishes,
    /// nested effects included, before the next starts; the first error
    /// stops the rest.
    pub fn run_graph<'a>(&'a self, ctx: &'a mut ExecutionContext, graph: &'a Value) -> GraphFuture<'a> {
        Box::pin(async move {
            for item in graph_items(graph) {
                self.run_action(ctx, item).await?;
            }
            Ok(())
        })
    }

    /// Dispatches a single action descriptor. The processor runs inside a
    /// frame seeded with the descriptor's fields, popped on every exit path.
    /// The processor's own field templates never see that frame; graphs it
    /// runs do. Transport failures are logged and absorbed here.
    pub fn run_action<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        descriptor: &'a Value,
    ) -> GraphFuture<'a> {
        Box::pin(async move {
            let Some(fields) = descriptor.as_object() else {
                tracing::warn!("skipping non-object entry in action graph");
                return Ok(());
            };
            let Some(action) = descriptor_name(fields, ACTION_KEY) else {
                if is_function_descriptor(descriptor) {
                    self.evaluate_function(ctx, descriptor).await?;
                } else {
                    tracing::warn!("skipping descriptor without an action type");
                }
                return Ok(());
            };
            let Some(processor) = self.actions.resolve(action) else {
                tracing::warn!(
                    session_id = ctx.session().id.as_str(),
                    action,
                    "unknown action type, skipping"
                );
                return Ok(());
            };

            let mut seed: ValueMap = fields.clone();
            seed.remove(ACTION_KEY);
            let mark = ctx.scope.create_action_scope(seed);
            let result = processor.process(self, ctx, fields).await;
            ctx.scope.restore(mark);

            match result {
                Err(error) if error.is_transport() => {
                    tracing::warn!(
                        session_id = ctx.session().id.as_str(),
                        action,
                        code = error.code.as_str(),
                        %error,
                        "transport failure absorbed"
                    );
                    Ok(())
                }
                other => other,
            }
        })
    }

    /// Resets navigation and runs the scenario's start actions.
    pub async fn run_start_actions(&self, ctx: &mut ExecutionContext) -> Result<(), ScenarioError> {
        ctx.session_mut().navigation.reset();
        self.run_graph(ctx, &self.scenario.start_actions).await
    }

    /// Runs `graph` with `params` as the params tier, restoring the caller's
    /// tier afterwards.
    pub(crate) async fn run_graph_with_params(
        &self,
        ctx: &mut ExecutionContext,
        graph: &Value,
        params: ValueMap,
    ) -> Result<(), ScenarioError> {
        let previous = ctx.replace_params(params);
        let result = self.run_graph(ctx, graph).await;
        ctx.replace_params(previous);
        result
    }

    /// Runs `graph` inside an extra frame holding `locals`.
    pub(crate) async fn run_graph_with_locals(
        &self,
        ctx: &mut ExecutionContext,
        graph: &Value,
        locals: ValueMap,
    ) -> Result<(), ScenarioError> {
        let mark = ctx.scope.create_scope(locals);
        let result = self.run_graph(ctx, graph).await;
        ctx.scope.restore(mark);
        result
    }
}

#[cfg(test)]
mod dispatch_tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::actions::{ActionProcessor, ProcessorFactory};
    use crate::registry::RegisterOptions;
    use crate::test_support::*;

    /// Appends its `label` to a shared log; `fail: true` raises an
    /// evaluation error, `transport: true` a transport error.
    struct Probe {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ActionProcessor for Probe {
        async fn process(
            &self,
            engine: &Engine,
            ctx: &mut ExecutionContext,
            fields: &ValueMap,
        ) -> Result<(), ScenarioError> {
            let label = engine
                .resolve(ctx, fields.get("label").unwrap_or(&Value::Null))
                .await?;
            self.log
                .lock()
                .expect("log lock")
                .push(sf_core::value_to_text(&label));
            if fields.get("fail") == Some(&json!(true)) {
                return Err(ScenarioError::evaluation("PROBE_FAILED", "probe failed"));
            }
            if fields.get("transport") == Some(&json!(true)) {
                return Err(ScenarioError::transport("PROBE_SEND", "send failed"));
            }
            Ok(())
        }
    }

    fn probe_engine(extra: serde_json::Value) -> (Engine, Arc<Mutex<Vec<String>>>) {
        let engine = test_engine(scenario(extra));
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&log);
        let factory: ProcessorFactory = Arc::new(move || {
            Box::new(Probe {
                log: Arc::clone(&shared),
            }) as Box<dyn ActionProcessor>
        });
        engine
            .actions()
            .register_action("Probe", factory, RegisterOptions::default())
            .expect("register probe");
        (engine, log)
    }

    fn logged(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().expect("log lock").clone()
    }

    #[tokio::test]
    async fn error_in_the_middle_stops_later_siblings() {
        let (engine, log) = probe_engine(json!({}));
        let mut ctx = context_for(&engine, "s");
        let graph = json!([
            {"action": "Probe", "label": "A"},
            {"action": "Probe", "label": "B", "fail": true},
            {"action": "Probe", "label": "C"}
        ]);
        let error = engine.run_graph(&mut ctx, &graph).await.expect_err("B fails");
        assert_eq!(error.code, "PROBE_FAILED");
        assert_eq!(logged(&log), vec!["A".to_string(), "B".to_string()]);
        assert!(ctx.scope().is_empty());
    }

    #[tokio::test]
    async fn transport_errors_do_not_abort_siblings() {
        let (engine, log) = probe_engine(json!({}));
        let mut ctx = context_for(&engine, "s");
        let graph = json!([
            {"action": "Probe", "label": "A", "transport": true},
            {"action": "Probe", "label": "B"}
        ]);
        engine.run_graph(&mut ctx, &graph).await.expect("absorbed");
        assert_eq!(logged(&log), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn unknown_actions_are_skipped_and_fields_resolve_outside_their_frame() {
        let (engine, log) = probe_engine(json!({}));
        let mut ctx = context_for(&engine, "s");
        ctx.set_local("label", json!("outer"));
        let graph = json!([
            {"action": "DoesNotExist"},
            {"action": "Probe", "label": "{{label}}!", "extra": 1},
            {"action": "Probe", "label": "{{extra}}"}
        ]);
        engine.run_graph(&mut ctx, &graph).await.expect("no-op");
        assert_eq!(
            logged(&log),
            vec!["outer!".to_string(), "{{extra}}".to_string()]
        );
        assert_eq!(ctx.scope().depth(), 1);
    }

    #[tokio::test]
    async fn custom_handler_beats_builtin_and_wildcard_catches_the_rest() {
        let (engine, log) = probe_engine(json!({}));
        let shared = Arc::clone(&log);
        let wildcard: ProcessorFactory = Arc::new(move || {
            Box::new(Probe {
                log: Arc::clone(&shared),
            }) as Box<dyn ActionProcessor>
        });
        engine
            .actions()
            .register_action("*", wildcard, RegisterOptions::default())
            .expect("wildcard");
        let shared = Arc::clone(&log);
        let custom: ProcessorFactory = Arc::new(move || {
            Box::new(Probe {
                log: Arc::clone(&shared),
            }) as Box<dyn ActionProcessor>
        });
        engine
            .actions()
            .register_action("EmitOutput", custom, RegisterOptions::default())
            .expect("custom EmitOutput");

        let mut ctx = context_for(&engine, "s");
        let graph = json!([
            {"action": "EmitOutput", "label": "custom"},
            {"action": "Whatever", "label": "wild"}
        ]);
        engine.run_graph(&mut ctx, &graph).await.expect("run");
        assert_eq!(logged(&log), vec!["custom".to_string(), "wild".to_string()]);
    }

    #[tokio::test]
    async fn single_descriptor_and_function_entries_are_accepted() {
        let (engine, log) = probe_engine(json!({
            "functions": {"ping": {"result": {"action": "Probe", "label": "from function"}}}
        }));
        let mut ctx = context_for(&engine, "s");
        engine
            .run_graph(&mut ctx, &json!({"action": "Probe", "label": "single"}))
            .await
            .expect("single");
        engine
            .run_graph(&mut ctx, &json!([{"function": "ping"}]))
            .await
            .expect("function entry");
        assert_eq!(
            logged(&log),
            vec!["single".to_string(), "from function".to_string()]
        );
    }
}
