//! EventBus facade: drive machines through bus messages.
//!
//! For a registered definition `<id>`, three consumers are bound:
//!
//! - `statemachine.<id>.create` - payload `{"initial_data": {...}?}`,
//!   replies `{"instance_id", "current_state"}`.
//! - `statemachine.<id>.event` - payload `{"instance_id", "event",
//!   "data": {...}?}`, replies `{"instance_id", "current_state", "status"}`.
//! - `statemachine.<id>.query` - payload `{"instance_id"}`, replies with
//!   the full execution context.
//!
//! Failures reply `{"error": ...}`. Committed transitions are additionally
//! published on `statemachine.<id>.transition.completed`.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use futures::future::BoxFuture;
use serde_json::{json, Value};

// Layer 3: Internal module imports
use crate::engine::{Engine, StateChange, StateChangeListener};
use crate::errors::FsmError;
use crate::event::FsmEvent;
use crate::ids::InstanceId;
use fluxor_rt::bus::{ConsumerHandle, Delivery, EventBus, Message};
use fluxor_rt::context::FluxorContext;

/// Bind the facade consumers for one registered definition.
///
/// Returns the consumer handles; dropping them keeps the loops running,
/// call [`ConsumerHandle::unregister`] to tear one down.
pub async fn bind_definition(
    engine: &Engine,
    ctx: &FluxorContext,
    machine_id: &str,
) -> Result<Vec<ConsumerHandle>, FsmError> {
    if engine.definition(machine_id).is_none() {
        return Err(FsmError::DefinitionNotFound(machine_id.to_string()));
    }

    let mut handles = Vec::with_capacity(3);

    // create
    let create_engine = engine.clone();
    let create_machine = machine_id.to_string();
    let consumer = ctx.consumer(&format!("statemachine.{machine_id}.create"))?;
    handles.push(consumer.handler(move |delivery| {
        let engine = create_engine.clone();
        let machine_id = create_machine.clone();
        async move {
            let initial_data = delivery.body().get("initial_data").cloned();
            match engine.create_instance(&machine_id, initial_data).await {
                Ok(instance_id) => match engine.snapshot(&instance_id).await {
                    Ok(exec) => {
                        reply_ok(
                            &delivery,
                            json!({
                                "instance_id": instance_id,
                                "current_state": exec.current_state,
                            }),
                        )
                        .await;
                    }
                    Err(error) => reply_error(&delivery, &error).await,
                },
                Err(error) => reply_error(&delivery, &error).await,
            }
        }
    }));

    // event
    let event_engine = engine.clone();
    let consumer = ctx.consumer(&format!("statemachine.{machine_id}.event"))?;
    handles.push(consumer.handler(move |delivery| {
        let engine = event_engine.clone();
        async move {
            let (instance_id, event) = match parse_event_payload(delivery.body()) {
                Ok(parsed) => parsed,
                Err(error) => {
                    reply_error(&delivery, &error).await;
                    return;
                }
            };
            match engine.send_event(&instance_id, event).await {
                Ok(_outcome) => match engine.snapshot(&instance_id).await {
                    Ok(exec) => {
                        reply_ok(
                            &delivery,
                            json!({
                                "instance_id": instance_id,
                                "current_state": exec.current_state,
                                "status": exec.status,
                            }),
                        )
                        .await;
                    }
                    Err(error) => reply_error(&delivery, &error).await,
                },
                Err(error) => reply_error(&delivery, &error).await,
            }
        }
    }));

    // query
    let query_engine = engine.clone();
    let consumer = ctx.consumer(&format!("statemachine.{machine_id}.query"))?;
    handles.push(consumer.handler(move |delivery| {
        let engine = query_engine.clone();
        async move {
            let instance_id = match parse_instance_id(delivery.body()) {
                Ok(id) => id,
                Err(error) => {
                    reply_error(&delivery, &error).await;
                    return;
                }
            };
            match engine.snapshot(&instance_id).await {
                Ok(exec) => {
                    let payload = serde_json::to_value(&exec).unwrap_or(Value::Null);
                    reply_ok(&delivery, payload).await;
                }
                Err(error) => reply_error(&delivery, &error).await,
            }
        }
    }));

    // transition.completed publications
    engine.add_listener(Arc::new(TransitionPublisher {
        bus: ctx.bus(),
        machine_id: machine_id.to_string(),
    }));

    tracing::info!(machine = %machine_id, "bus facade bound");
    Ok(handles)
}

async fn reply_ok(delivery: &Delivery, payload: Value) {
    if let Err(error) = delivery.reply(payload).await {
        tracing::warn!(%error, "facade reply failed");
    }
}

async fn reply_error(delivery: &Delivery, error: &FsmError) {
    tracing::debug!(%error, "facade request failed");
    if let Err(reply_error) = delivery.reply(json!({"error": error.to_string()})).await {
        tracing::warn!(error = %reply_error, "facade error reply failed");
    }
}

fn parse_instance_id(body: &Value) -> Result<InstanceId, FsmError> {
    body.get("instance_id")
        .and_then(Value::as_str)
        .ok_or_else(|| FsmError::Payload("missing instance_id".to_string()))?
        .parse()
        .map_err(|_| FsmError::Payload("instance_id is not a valid UUID".to_string()))
}

fn parse_event_payload(body: &Value) -> Result<(InstanceId, FsmEvent), FsmError> {
    let instance_id = parse_instance_id(body)?;
    let name = body
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| FsmError::Payload("missing event".to_string()))?;
    let data = body.get("data").cloned().unwrap_or(Value::Null);
    Ok((instance_id, FsmEvent::with_data(name, data)))
}

/// Publishes committed transitions of one machine onto the bus.
struct TransitionPublisher {
    bus: Arc<dyn EventBus>,
    machine_id: String,
}

impl StateChangeListener for TransitionPublisher {
    fn on_transition(&self, change: StateChange) -> BoxFuture<'static, ()> {
        // Creation notifications (from = None) are not transitions.
        if change.machine_id != self.machine_id || change.from.is_none() {
            return Box::pin(async {});
        }
        let bus = Arc::clone(&self.bus);
        Box::pin(async move {
            let address = format!(
                "statemachine.{}.transition.completed",
                change.machine_id
            );
            let payload = json!({
                "machine_id": change.machine_id,
                "instance_id": change.instance_id,
                "from": change.from,
                "to": change.to,
                "event": change.event,
            });
            if let Err(error) = bus.publish(Message::new(address, payload)).await {
                tracing::warn!(%error, "failed to publish transition.completed");
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::definition::{DefinitionBuilder, State, Transition};
    use fluxor_rt::bus::LocalBus;
    use fluxor_rt::config::ConfigMap;
    use fluxor_rt::executor::WorkerPool;
    use fluxor_rt::runtime::WeakVertx;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Engine, FluxorContext, Arc<LocalBus>) {
        let bus = Arc::new(LocalBus::new());
        let ctx = FluxorContext::new(
            CancellationToken::new(),
            bus.clone(),
            WeakVertx::detached(),
            ConfigMap::empty(),
        );
        let engine = Engine::builder(Arc::new(WorkerPool::new(2, 16))).build();

        let definition = DefinitionBuilder::new("order")
            .initial_state("pending")
            .state(State::new("pending"))
            .state(State::new("done").terminal())
            .transition(Transition::new("pending", "done", "finish"))
            .build()
            .unwrap();
        engine.register(definition).unwrap();

        (engine, ctx, bus)
    }

    #[tokio::test]
    async fn test_create_event_query_roundtrip() {
        let (engine, ctx, _bus) = setup();
        let _handles = bind_definition(&engine, &ctx, "order").await.unwrap();

        // create
        let reply = ctx
            .request(
                "statemachine.order.create",
                json!({"initial_data": {"amount": 3}}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        let instance_id = reply.body["instance_id"].as_str().unwrap().to_string();
        assert_eq!(reply.body["current_state"], "pending");

        // event
        let reply = ctx
            .request(
                "statemachine.order.event",
                json!({"instance_id": instance_id, "event": "finish"}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(reply.body["current_state"], "done");
        assert_eq!(reply.body["status"], "completed");

        // query
        let reply = ctx
            .request(
                "statemachine.order.query",
                json!({"instance_id": instance_id}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(reply.body["machine_id"], "order");
        assert_eq!(reply.body["data"]["amount"], 3);
        assert_eq!(reply.body["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transition_completed_published() {
        let (engine, ctx, bus) = setup();
        let _handles = bind_definition(&engine, &ctx, "order").await.unwrap();

        let completed = bus
            .subscribe("statemachine.order.transition.completed", 8)
            .unwrap();

        let reply = ctx
            .request(
                "statemachine.order.create",
                json!({}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        let instance_id = reply.body["instance_id"].as_str().unwrap().to_string();

        ctx.request(
            "statemachine.order.event",
            json!({"instance_id": instance_id, "event": "finish"}),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let token = CancellationToken::new();
        let published = tokio::time::timeout(
            Duration::from_secs(1),
            completed.recv(&token),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(published.body["from"], "pending");
        assert_eq!(published.body["to"], "done");
        assert_eq!(published.body["event"], "finish");
    }

    #[tokio::test]
    async fn test_error_replies() {
        let (engine, ctx, _bus) = setup();
        let _handles = bind_definition(&engine, &ctx, "order").await.unwrap();

        // Malformed payload.
        let reply = ctx
            .request(
                "statemachine.order.event",
                json!({"event": "finish"}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(reply.body["error"]
            .as_str()
            .unwrap()
            .contains("instance_id"));

        // Unknown instance.
        let reply = ctx
            .request(
                "statemachine.order.query",
                json!({"instance_id": InstanceId::new()}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(reply.body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_bind_unknown_machine_fails() {
        let (engine, ctx, _bus) = setup();
        let result = bind_definition(&engine, &ctx, "ghost").await;
        assert!(matches!(result, Err(FsmError::DefinitionNotFound(_))));
    }
}
