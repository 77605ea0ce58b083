//! Events driving state-machine instances.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
// (none)

/// Synthetic event name used for the initial state's entry actions.
pub const INIT_EVENT: &str = "__init__";

/// A named event with an optional payload.
#[derive(Debug, Clone)]
pub struct FsmEvent {
    /// Event name matched against transition triggers
    pub name: String,

    /// Carrier payload available to guards and actions
    pub data: Value,
}

impl FsmEvent {
    /// Create an event with no payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Value::Null,
        }
    }

    /// Create an event with a payload.
    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub(crate) fn init() -> Self {
        Self::new(INIT_EVENT)
    }
}
