//! # fluxor-fsm - State-Machine Engine
//!
//! Finite state machines hosted on the Fluxor runtime: immutable
//! definitions built fluently and validated up front, mutable instances
//! driven by guarded, prioritized transitions, with entry/exit actions,
//! per-instance history, asynchronous listeners, optional file persistence,
//! and an [`EventBus`](fluxor_rt::bus::EventBus) facade plus a REST adapter.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fluxor_fsm::prelude::*;
//!
//! let definition = DefinitionBuilder::new("order")
//!     .initial_state("pending")
//!     .state(State::new("pending"))
//!     .state(State::new("validating"))
//!     .state(State::new("completed").terminal())
//!     .transition(
//!         Transition::new("pending", "validating", "validate")
//!             .guarded(guard(|_event, exec| {
//!                 Ok(exec.data_number("amount").unwrap_or(0.0) > 0.0)
//!             })),
//!     )
//!     .transition(Transition::new("validating", "completed", "complete"))
//!     .build()?;
//!
//! let engine = Engine::builder(pool).build();
//! engine.register(definition)?;
//! let id = engine.create_instance("order", Some(json!({"amount": 150}))).await?;
//! engine.send_event(&id, FsmEvent::new("validate")).await?;
//! ```
//!
//! # Transition semantics
//!
//! For an event, candidate transitions from the current state are evaluated
//! in priority order (descending, definition-order-stable ties). A guard
//! returning `false` skips the candidate; a guard error aborts the whole
//! event with the state unchanged. Exit actions and transition actions run
//! before the commit point and abort on error (state unchanged); entry
//! actions run after the commit and their errors are logged, never rolled
//! back.

pub mod definition;
pub mod engine;
pub mod errors;
pub mod event;
pub mod facade;
pub mod http;
pub mod ids;
pub mod instance;
pub mod persist;

pub use definition::{
    action, guard, sync_action, ActionFn, DefinitionBuilder, GuardFn, MachineDefinition, State,
    Transition,
};
pub use engine::{listener_fn, Engine, EngineBuilder, EventOutcome, StateChange, StateChangeListener};
pub use errors::{ActionError, FsmError};
pub use event::{FsmEvent, INIT_EVENT};
pub use facade::bind_definition;
pub use http::machine_routes;
pub use ids::InstanceId;
pub use instance::{ExecutionContext, HistoryEntry, InstanceStatus};
pub use persist::{FileStore, InstanceStore};

/// Convenience prelude for machine authors.
pub mod prelude {
    pub use crate::definition::{
        action, guard, sync_action, DefinitionBuilder, MachineDefinition, State, Transition,
    };
    pub use crate::engine::{Engine, EventOutcome};
    pub use crate::errors::{ActionError, FsmError};
    pub use crate::event::FsmEvent;
    pub use crate::ids::InstanceId;
    pub use crate::instance::{ExecutionContext, InstanceStatus};
}
