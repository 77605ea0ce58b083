// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use super::types::{MachineDefinition, State, Transition};
use crate::errors::FsmError;

/// Fluent, error-accumulating builder for [`MachineDefinition`].
///
/// Validation happens once, at [`build`](DefinitionBuilder::build); every
/// problem found is reported together in
/// [`FsmError::Validation`].
///
/// # Example
///
/// ```rust
/// use fluxor_fsm::definition::{DefinitionBuilder, State, Transition};
///
/// let definition = DefinitionBuilder::new("order")
///     .initial_state("pending")
///     .state(State::new("pending"))
///     .state(State::new("completed").terminal())
///     .transition(Transition::new("pending", "completed", "complete"))
///     .build()
///     .unwrap();
/// assert_eq!(definition.id(), "order");
/// ```
pub struct DefinitionBuilder {
    id: String,
    version: String,
    initial_state: Option<String>,
    states: Vec<State>,
    transitions: Vec<Transition>,
    metadata: HashMap<String, Value>,
}

impl DefinitionBuilder {
    /// Start a definition with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: "1.0.0".to_string(),
            initial_state: None,
            states: Vec::new(),
            transitions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the version string (defaults to `1.0.0`).
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the initial state id.
    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Add a state.
    pub fn state(mut self, state: State) -> Self {
        self.states.push(state);
        self
    }

    /// Add a transition.
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Attach definition metadata.
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Validate and freeze the definition.
    ///
    /// # Errors
    ///
    /// [`FsmError::Validation`] listing every problem: empty id, missing or
    /// unknown initial state, duplicate state ids, transitions referencing
    /// unknown states, empty event names.
    pub fn build(self) -> Result<MachineDefinition, FsmError> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push("definition id must not be empty".to_string());
        }

        let mut states: HashMap<String, State> = HashMap::with_capacity(self.states.len());
        for state in self.states {
            if state.id.is_empty() {
                errors.push("state id must not be empty".to_string());
                continue;
            }
            if states.contains_key(&state.id) {
                errors.push(format!("duplicate state id: {}", state.id));
                continue;
            }
            states.insert(state.id.clone(), state);
        }

        let initial_state = match &self.initial_state {
            Some(initial) if states.contains_key(initial) => initial.clone(),
            Some(initial) => {
                errors.push(format!("initial state '{initial}' is not defined"));
                initial.clone()
            }
            None => {
                errors.push("initial state is not set".to_string());
                String::new()
            }
        };

        for (index, transition) in self.transitions.iter().enumerate() {
            if transition.event.is_empty() {
                errors.push(format!("transition #{index} has an empty event name"));
            }
            if !states.contains_key(&transition.from) {
                errors.push(format!(
                    "transition #{index} references unknown source state '{}'",
                    transition.from
                ));
            }
            if !states.contains_key(&transition.to) {
                errors.push(format!(
                    "transition #{index} references unknown target state '{}'",
                    transition.to
                ));
            }
        }

        if !errors.is_empty() {
            return Err(FsmError::Validation { errors });
        }

        Ok(MachineDefinition {
            id: self.id,
            version: self.version,
            initial_state,
            states,
            transitions: self.transitions,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    #[test]
    fn test_valid_definition_builds() {
        let definition = DefinitionBuilder::new("order")
            .version("2.1.0")
            .initial_state("pending")
            .state(State::new("pending"))
            .state(State::new("done").terminal())
            .transition(Transition::new("pending", "done", "finish"))
            .metadata("owner", serde_json::json!("payments"))
            .build()
            .unwrap();

        assert_eq!(definition.id(), "order");
        assert_eq!(definition.version(), "2.1.0");
        assert_eq!(definition.initial_state(), "pending");
        assert_eq!(definition.state_count(), 2);
        assert_eq!(definition.transitions().len(), 1);
    }

    #[test]
    fn test_empty_id_rejected() {
        let result = DefinitionBuilder::new("")
            .initial_state("s")
            .state(State::new("s"))
            .build();
        match result {
            Err(FsmError::Validation { errors }) => {
                assert!(errors.iter().any(|e| e.contains("id must not be empty")));
            }
            other => {
                assert!(other.is_err(), "expected validation failure");
            }
        }
    }

    #[test]
    fn test_missing_initial_state_rejected() {
        let result = DefinitionBuilder::new("m").state(State::new("s")).build();
        assert!(matches!(result, Err(FsmError::Validation { .. })));
    }

    #[test]
    fn test_unknown_initial_state_rejected() {
        let result = DefinitionBuilder::new("m")
            .initial_state("ghost")
            .state(State::new("s"))
            .build();
        match result {
            Err(FsmError::Validation { errors }) => {
                assert!(errors.iter().any(|e| e.contains("ghost")));
            }
            other => {
                assert!(other.is_err(), "expected validation failure");
            }
        }
    }

    #[test]
    fn test_dangling_transition_rejected() {
        let result = DefinitionBuilder::new("m")
            .initial_state("s")
            .state(State::new("s"))
            .transition(Transition::new("s", "nowhere", "go"))
            .build();
        match result {
            Err(FsmError::Validation { errors }) => {
                assert!(errors.iter().any(|e| e.contains("nowhere")));
            }
            other => {
                assert!(other.is_err(), "expected validation failure");
            }
        }
    }

    #[test]
    fn test_empty_event_rejected() {
        let result = DefinitionBuilder::new("m")
            .initial_state("s")
            .state(State::new("s"))
            .transition(Transition::new("s", "s", ""))
            .build();
        assert!(matches!(result, Err(FsmError::Validation { .. })));
    }

    #[test]
    fn test_errors_accumulate() {
        let result = DefinitionBuilder::new("")
            .transition(Transition::new("a", "b", ""))
            .build();
        match result {
            Err(FsmError::Validation { errors }) => {
                // empty id, missing initial, unknown from, unknown to, empty event
                assert!(errors.len() >= 4, "expected many errors, got {errors:?}");
            }
            other => {
                assert!(other.is_err(), "expected validation failure");
            }
        }
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let result = DefinitionBuilder::new("m")
            .initial_state("s")
            .state(State::new("s"))
            .state(State::new("s"))
            .build();
        match result {
            Err(FsmError::Validation { errors }) => {
                assert!(errors.iter().any(|e| e.contains("duplicate")));
            }
            other => {
                assert!(other.is_err(), "expected validation failure");
            }
        }
    }
}
