//! Instance identifier newtype.

// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::str::FromStr;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Unique identifier of a running state-machine instance.
///
/// # Example
/// ```rust
/// use fluxor_fsm::ids::InstanceId;
///
/// let id = InstanceId::new();
/// let parsed: InstanceId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    /// Generate a new random InstanceId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create InstanceId from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(raw)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    #[test]
    fn test_uniqueness() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = InstanceId::new();
        let parsed: InstanceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-uuid".parse::<InstanceId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id = InstanceId::new();
        let raw = serde_json::to_string(&id).unwrap();
        assert_eq!(raw, format!("\"{id}\""));
    }
}
