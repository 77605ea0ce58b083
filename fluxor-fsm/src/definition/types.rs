// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use futures::future::BoxFuture;
use serde_json::Value;

// Layer 3: Internal module imports
use crate::errors::ActionError;
use crate::event::FsmEvent;
use crate::instance::ExecutionContext;

/// A pure predicate deciding whether a transition applies.
///
/// Guards must not mutate the instance; an `Err` aborts the whole event
/// (state unchanged), `Ok(false)` merely skips the candidate.
pub type GuardFn = Arc<dyn Fn(&FsmEvent, &ExecutionContext) -> Result<bool, ActionError> + Send + Sync>;

/// A side-effecting procedure run during a transition.
///
/// Actions run under the instance's transition lock and may mutate the
/// instance data and variables.
pub type ActionFn = Arc<
    dyn for<'a> Fn(&'a FsmEvent, &'a mut ExecutionContext) -> BoxFuture<'a, Result<(), ActionError>>
        + Send
        + Sync,
>;

/// Wrap a closure as a [`GuardFn`].
pub fn guard<F>(f: F) -> GuardFn
where
    F: Fn(&FsmEvent, &ExecutionContext) -> Result<bool, ActionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as an [`ActionFn`].
pub fn action<F>(f: F) -> ActionFn
where
    F: for<'a> Fn(&'a FsmEvent, &'a mut ExecutionContext) -> BoxFuture<'a, Result<(), ActionError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a synchronous closure as an [`ActionFn`].
pub fn sync_action<F>(f: F) -> ActionFn
where
    F: Fn(&FsmEvent, &mut ExecutionContext) -> Result<(), ActionError> + Send + Sync + 'static,
{
    Arc::new(move |event, exec| {
        let result = f(event, exec);
        Box::pin(async move { result })
    })
}

/// A node in the machine graph.
pub struct State {
    /// State id, unique within a definition
    pub id: String,

    /// Final states flip the instance status to `Completed` on entry
    pub is_final: bool,

    pub(crate) on_enter: Vec<ActionFn>,
    pub(crate) on_exit: Vec<ActionFn>,

    /// Free-form metadata carried on the definition
    pub metadata: HashMap<String, Value>,
}

impl State {
    /// Create a non-final state.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_final: false,
            on_enter: Vec::new(),
            on_exit: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Mark this state final.
    pub fn terminal(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Append an entry action.
    pub fn on_enter(mut self, action: ActionFn) -> Self {
        self.on_enter.push(action);
        self
    }

    /// Append an exit action.
    pub fn on_exit(mut self, action: ActionFn) -> Self {
        self.on_exit.push(action);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("is_final", &self.is_final)
            .field("on_enter", &self.on_enter.len())
            .field("on_exit", &self.on_exit.len())
            .finish_non_exhaustive()
    }
}

/// An edge in the machine graph.
pub struct Transition {
    /// Source state id
    pub from: String,

    /// Target state id
    pub to: String,

    /// Triggering event name
    pub event: String,

    pub(crate) guard: Option<GuardFn>,
    pub(crate) actions: Vec<ActionFn>,

    /// Within one (state, event) pair, higher priority is evaluated first;
    /// ties keep definition order
    pub priority: i32,
}

impl Transition {
    /// Create an unguarded transition with priority 0.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            event: event.into(),
            guard: None,
            actions: Vec::new(),
            priority: 0,
        }
    }

    /// Attach a guard.
    pub fn guarded(mut self, guard: GuardFn) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Append a transition action.
    pub fn action(mut self, action: ActionFn) -> Self {
        self.actions.push(action);
        self
    }

    /// Set the evaluation priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("event", &self.event)
            .field("guarded", &self.guard.is_some())
            .field("actions", &self.actions.len())
            .field("priority", &self.priority)
            .finish()
    }
}

/// An immutable, validated machine definition.
///
/// Built by [`DefinitionBuilder`](super::DefinitionBuilder); never mutated
/// after build.
pub struct MachineDefinition {
    pub(crate) id: String,
    pub(crate) version: String,
    pub(crate) initial_state: String,
    pub(crate) states: HashMap<String, State>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) metadata: HashMap<String, Value>,
}

impl MachineDefinition {
    /// The definition id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The definition version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The initial state id.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// Look up a state.
    pub fn state(&self, id: &str) -> Option<&State> {
        self.states.get(id)
    }

    /// Number of states.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// All transitions, in definition order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Definition metadata.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Candidate transitions for (state, event), priority descending with
    /// definition-order-stable ties.
    pub(crate) fn candidates(&self, from: &str, event: &str) -> Vec<&Transition> {
        let mut matching: Vec<&Transition> = self
            .transitions
            .iter()
            .filter(|t| t.from == from && t.event == event)
            .collect();
        // Vec::sort_by is stable, so equal priorities keep definition order.
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));
        matching
    }
}

impl fmt::Debug for MachineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("initial_state", &self.initial_state)
            .field("states", &self.states.len())
            .field("transitions", &self.transitions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::definition::DefinitionBuilder;

    fn branching_definition() -> MachineDefinition {
        DefinitionBuilder::new("m")
            .initial_state("s")
            .state(State::new("s"))
            .state(State::new("a"))
            .state(State::new("b"))
            .transition(Transition::new("s", "a", "go").with_priority(1))
            .transition(Transition::new("s", "b", "go").with_priority(10))
            .transition(Transition::new("s", "a", "other"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_candidates_priority_order() {
        let definition = branching_definition();
        let candidates = definition.candidates("s", "go");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].to, "b"); // priority 10 first
        assert_eq!(candidates[1].to, "a");
    }

    #[test]
    fn test_candidates_stable_on_ties() {
        let definition = DefinitionBuilder::new("m")
            .initial_state("s")
            .state(State::new("s"))
            .state(State::new("a"))
            .state(State::new("b"))
            .transition(Transition::new("s", "a", "go"))
            .transition(Transition::new("s", "b", "go"))
            .build()
            .unwrap();

        let candidates = definition.candidates("s", "go");
        assert_eq!(candidates[0].to, "a"); // definition order on equal priority
        assert_eq!(candidates[1].to, "b");
    }

    #[test]
    fn test_candidates_filter_by_event() {
        let definition = branching_definition();
        assert_eq!(definition.candidates("s", "other").len(), 1);
        assert!(definition.candidates("s", "unknown").is_empty());
        assert!(definition.candidates("a", "go").is_empty());
    }

    #[test]
    fn test_state_builder() {
        let state = State::new("done")
            .terminal()
            .with_metadata("color", serde_json::json!("green"));
        assert!(state.is_final);
        assert_eq!(state.metadata["color"], "green");
    }
}
