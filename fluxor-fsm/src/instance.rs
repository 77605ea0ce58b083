//! Mutable execution state of a running machine instance.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use crate::ids::InstanceId;

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Accepting events
    Running,
    /// Reached a final state
    Completed,
    /// Marked failed by an operator or action
    Failed,
    /// Paused; events are rejected until resumed
    Suspended,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Suspended => "suspended",
        };
        write!(f, "{label}")
    }
}

/// One committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// State before the transition
    pub from: String,

    /// State after the transition
    pub to: String,

    /// The triggering event name
    pub event: String,

    /// Commit time
    pub timestamp: DateTime<Utc>,

    /// Time spent in `from` before this transition, in milliseconds
    pub duration_in_prev_state_ms: i64,

    /// Copy of the instance data at commit time, when snapshotting is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_snapshot: Option<Value>,
}

/// The full mutable state of one machine instance.
///
/// Owned by the engine; every field mutation happens under the instance's
/// transition lock, so a snapshot taken through the engine is always
/// consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Owning machine definition id
    pub machine_id: String,

    /// This instance's id
    pub instance_id: InstanceId,

    /// Current state id
    pub current_state: String,

    /// State before the last committed transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,

    /// Carrier data visible to guards and actions
    #[serde(default)]
    pub data: HashMap<String, Value>,

    /// Scratch variables written by actions
    #[serde(default)]
    pub variables: HashMap<String, Value>,

    /// Committed transitions, oldest first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,

    /// Lifecycle status
    pub status: InstanceStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last transition (or creation) time
    pub updated_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub(crate) fn new(
        machine_id: impl Into<String>,
        instance_id: InstanceId,
        initial_state: impl Into<String>,
        data: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            machine_id: machine_id.into(),
            instance_id,
            current_state: initial_state.into(),
            previous_state: None,
            data,
            variables: HashMap::new(),
            history: Vec::new(),
            status: InstanceStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a data value.
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Write a data value (actions only; the engine never inspects values).
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Read a data value as a number; convenience for numeric guards.
    pub fn data_number(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    /// Read a scratch variable.
    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Write a scratch variable.
    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }
}
