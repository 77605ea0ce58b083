//! Machine definitions: states, transitions, guards, actions, and the
//! validating builder.

mod builder;
mod types;

pub use builder::DefinitionBuilder;
pub use types::{action, guard, sync_action, ActionFn, GuardFn, MachineDefinition, State, Transition};
