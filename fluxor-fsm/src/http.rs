//! REST adapter: manage machines and instances over the fluxor-net router.
//!
//! Routes:
//!
//! | Method | Path | Effect |
//! |--------|------|--------|
//! | POST | `/machines` | register a definition document |
//! | GET | `/machines` | list registered machine ids |
//! | POST | `/machines/:id/instances` | create an instance |
//! | GET | `/machines/:id/instances` | list instances of a machine |
//! | GET | `/instances/:id` | full execution context |
//! | POST | `/instances/:id/events` | send an event |
//! | GET | `/instances/:id/history` | transition history |
//!
//! Registration is declarative (closures do not serialize): states and
//! transitions come from a JSON document, and guards are picked from a
//! small named table of predicates over the instance data.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

// Layer 3: Internal module imports
use crate::definition::{guard, DefinitionBuilder, GuardFn, State, Transition};
use crate::engine::Engine;
use crate::errors::FsmError;
use crate::event::FsmEvent;
use crate::ids::InstanceId;
use fluxor_net::http::{HttpResponse, RequestContext, Router};

/// Declarative machine document accepted by `POST /machines`.
#[derive(Debug, Deserialize)]
struct DefinitionDoc {
    id: String,
    #[serde(default)]
    version: Option<String>,
    initial_state: String,
    states: Vec<StateDoc>,
    #[serde(default)]
    transitions: Vec<TransitionDoc>,
}

#[derive(Debug, Deserialize)]
struct StateDoc {
    id: String,
    #[serde(default, rename = "final")]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct TransitionDoc {
    from: String,
    to: String,
    event: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    guard: Option<GuardDoc>,
}

/// Named guard table for declarative registrations.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GuardDoc {
    /// Always passes
    Always,
    /// `data[key] > value`
    Gt { key: String, value: f64 },
    /// `data[key] >= value`
    Gte { key: String, value: f64 },
    /// `data[key] < value`
    Lt { key: String, value: f64 },
    /// `data[key] <= value`
    Lte { key: String, value: f64 },
    /// `data[key] == value`
    Eq { key: String, value: Value },
}

fn guard_from_doc(doc: GuardDoc) -> GuardFn {
    match doc {
        GuardDoc::Always => guard(|_, _| Ok(true)),
        GuardDoc::Gt { key, value } => guard(move |_, exec| {
            Ok(exec.data_number(&key).is_some_and(|n| n > value))
        }),
        GuardDoc::Gte { key, value } => guard(move |_, exec| {
            Ok(exec.data_number(&key).is_some_and(|n| n >= value))
        }),
        GuardDoc::Lt { key, value } => guard(move |_, exec| {
            Ok(exec.data_number(&key).is_some_and(|n| n < value))
        }),
        GuardDoc::Lte { key, value } => guard(move |_, exec| {
            Ok(exec.data_number(&key).is_some_and(|n| n <= value))
        }),
        GuardDoc::Eq { key, value } => {
            guard(move |_, exec| Ok(exec.get_data(&key) == Some(&value)))
        }
    }
}

fn build_from_doc(doc: DefinitionDoc) -> Result<crate::definition::MachineDefinition, FsmError> {
    let mut builder = DefinitionBuilder::new(doc.id).initial_state(doc.initial_state);
    if let Some(version) = doc.version {
        builder = builder.version(version);
    }
    for state in doc.states {
        let mut built = State::new(state.id);
        if state.is_final {
            built = built.terminal();
        }
        builder = builder.state(built);
    }
    for transition in doc.transitions {
        let mut built = Transition::new(transition.from, transition.to, transition.event)
            .with_priority(transition.priority);
        if let Some(guard_doc) = transition.guard {
            built = built.guarded(guard_from_doc(guard_doc));
        }
        builder = builder.transition(built);
    }
    builder.build()
}

fn error_response(error: &FsmError) -> HttpResponse {
    let status = match error {
        FsmError::DefinitionNotFound(_) | FsmError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
        FsmError::DuplicateDefinition(_) => StatusCode::CONFLICT,
        FsmError::Validation { .. } | FsmError::Payload(_) => StatusCode::BAD_REQUEST,
        FsmError::InstanceNotRunning { .. }
        | FsmError::GuardFailed { .. }
        | FsmError::ExitActionFailed { .. }
        | FsmError::TransitionActionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::json(status, &json!({"error": error.to_string()}))
}

fn parse_path_instance_id(req: &RequestContext) -> Result<InstanceId, FsmError> {
    req.param("id")
        .ok_or_else(|| FsmError::Payload("missing instance id".to_string()))?
        .parse()
        .map_err(|_| FsmError::Payload("instance id is not a valid UUID".to_string()))
}

/// Build the adapter routes over `engine`.
///
/// Mount as-is or merge into a larger router before serving.
pub fn machine_routes(engine: Engine) -> Router {
    let register_engine = engine.clone();
    let list_engine = engine.clone();
    let create_engine = engine.clone();
    let list_instances_engine = engine.clone();
    let inspect_engine = engine.clone();
    let events_engine = engine.clone();
    let history_engine = engine;

    Router::new()
        .post("/machines", move |req| {
            let engine = register_engine.clone();
            async move {
                let doc: DefinitionDoc = match req.json() {
                    Ok(doc) => doc,
                    Err(_) => return HttpResponse::bad_request("body must be a machine document"),
                };
                let definition = match build_from_doc(doc) {
                    Ok(definition) => definition,
                    Err(error) => return error_response(&error),
                };
                let id = definition.id().to_string();
                match engine.register(definition) {
                    Ok(()) => HttpResponse::json(StatusCode::CREATED, &json!({"id": id})),
                    Err(error) => error_response(&error),
                }
            }
        })
        .get("/machines", move |_req| {
            let engine = list_engine.clone();
            async move {
                let mut machines = engine.definition_ids();
                machines.sort();
                HttpResponse::ok_json(&json!({"machines": machines}))
            }
        })
        .post("/machines/:id/instances", move |req| {
            let engine = create_engine.clone();
            async move {
                let machine_id = req.param("id").unwrap_or("").to_string();
                let initial_data = if req.body().is_empty() {
                    None
                } else {
                    match req.json::<Value>() {
                        Ok(body) => body.get("initial_data").cloned(),
                        Err(_) => return HttpResponse::bad_request("body must be JSON"),
                    }
                };
                match engine.create_instance(&machine_id, initial_data).await {
                    Ok(instance_id) => match engine.snapshot(&instance_id).await {
                        Ok(exec) => HttpResponse::json(
                            StatusCode::CREATED,
                            &json!({
                                "instance_id": instance_id,
                                "current_state": exec.current_state,
                            }),
                        ),
                        Err(error) => error_response(&error),
                    },
                    Err(error) => error_response(&error),
                }
            }
        })
        .get("/machines/:id/instances", move |req| {
            let engine = list_instances_engine.clone();
            async move {
                let machine_id = req.param("id").unwrap_or("").to_string();
                if engine.definition(&machine_id).is_none() {
                    return error_response(&FsmError::DefinitionNotFound(machine_id));
                }
                let mut instances = Vec::new();
                for instance_id in engine.instances_of(&machine_id) {
                    if let Ok(exec) = engine.snapshot(&instance_id).await {
                        instances.push(json!({
                            "instance_id": instance_id,
                            "current_state": exec.current_state,
                            "status": exec.status,
                        }));
                    }
                }
                HttpResponse::ok_json(&json!({"instances": instances}))
            }
        })
        .get("/instances/:id", move |req| {
            let engine = inspect_engine.clone();
            async move {
                let instance_id = match parse_path_instance_id(&req) {
                    Ok(id) => id,
                    Err(error) => return error_response(&error),
                };
                match engine.snapshot(&instance_id).await {
                    Ok(exec) => HttpResponse::ok_json(&exec),
                    Err(error) => error_response(&error),
                }
            }
        })
        .post("/instances/:id/events", move |req| {
            let engine = events_engine.clone();
            async move {
                let instance_id = match parse_path_instance_id(&req) {
                    Ok(id) => id,
                    Err(error) => return error_response(&error),
                };
                let body: Value = match req.json() {
                    Ok(body) => body,
                    Err(_) => return HttpResponse::bad_request("body must be JSON"),
                };
                let Some(event_name) = body.get("event").and_then(Value::as_str) else {
                    return HttpResponse::bad_request("missing event");
                };
                let data = body.get("data").cloned().unwrap_or(Value::Null);

                match engine
                    .send_event(&instance_id, FsmEvent::with_data(event_name, data))
                    .await
                {
                    Ok(outcome) => match engine.snapshot(&instance_id).await {
                        Ok(exec) => HttpResponse::ok_json(&json!({
                            "instance_id": instance_id,
                            "current_state": exec.current_state,
                            "status": exec.status,
                            "outcome": match outcome {
                                crate::engine::EventOutcome::Transitioned { .. } => "transitioned",
                                crate::engine::EventOutcome::NoTransition => "no_transition",
                            },
                        })),
                        Err(error) => error_response(&error),
                    },
                    Err(error) => error_response(&error),
                }
            }
        })
        .get("/instances/:id/history", move |req| {
            let engine = history_engine.clone();
            async move {
                let instance_id = match parse_path_instance_id(&req) {
                    Ok(id) => id,
                    Err(error) => return error_response(&error),
                };
                match engine.snapshot(&instance_id).await {
                    Ok(exec) => HttpResponse::ok_json(&json!({
                        "instance_id": instance_id,
                        "history": exec.history,
                    })),
                    Err(error) => error_response(&error),
                }
            }
        })
}
