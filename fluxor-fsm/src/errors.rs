//! Error types for the state-machine engine.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::ids::InstanceId;
use crate::instance::InstanceStatus;
use fluxor_rt::bus::BusError;

/// Error raised by a guard or action closure.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ActionError(pub String);

impl ActionError {
    /// Create an action error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Errors surfaced by the engine, its facade, and persistence.
#[derive(Debug, Error)]
pub enum FsmError {
    /// No registered definition with the given id
    #[error("machine definition not found: {0}")]
    DefinitionNotFound(String),

    /// A definition with this id is already registered
    #[error("machine definition already registered: {0}")]
    DuplicateDefinition(String),

    /// Definition failed build-time validation
    #[error("invalid machine definition: {}", errors.join("; "))]
    Validation {
        /// Accumulated validation failures
        errors: Vec<String>,
    },

    /// No instance with the given id
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// Events are only accepted while the instance is running
    #[error("instance {instance} is not running (status: {status})")]
    InstanceNotRunning {
        /// The addressed instance
        instance: InstanceId,
        /// Its current status
        status: InstanceStatus,
    },

    /// A guard returned an error (the whole event is aborted)
    #[error("guard failed for event '{event}': {reason}")]
    GuardFailed {
        /// The event being handled
        event: String,
        /// The guard's error
        reason: String,
    },

    /// An exit action failed; the transition is aborted, state unchanged
    #[error("exit action of state '{state}' failed for event '{event}': {reason}")]
    ExitActionFailed {
        /// The state being exited
        state: String,
        /// The event being handled
        event: String,
        /// The action's error
        reason: String,
    },

    /// A transition action failed; the transition is aborted, state unchanged
    #[error("transition action failed for event '{event}': {reason}")]
    TransitionActionFailed {
        /// The event being handled
        event: String,
        /// The action's error
        reason: String,
    },

    /// Malformed facade/adapter payload
    #[error("invalid payload: {0}")]
    Payload(String),

    /// Persistence I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Persistence encoding failure
    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    /// Bus failure in the facade
    #[error(transparent)]
    Bus(#[from] BusError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_joins_errors() {
        let err = FsmError::Validation {
            errors: vec!["id is empty".to_string(), "no initial state".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("id is empty"));
        assert!(msg.contains("; "));
    }

    #[test]
    fn test_action_error_from_str() {
        let err: ActionError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_not_running_display() {
        let id = InstanceId::new();
        let err = FsmError::InstanceNotRunning {
            instance: id,
            status: InstanceStatus::Completed,
        };
        assert!(err.to_string().contains("completed"));
    }
}
