// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Unique identifier assigned to a verticle deployment.
///
/// # Example
/// ```rust
/// use fluxor_rt::util::DeploymentId;
///
/// let id1 = DeploymentId::new();
/// let id2 = DeploymentId::new();
/// assert_ne!(id1, id2); // Globally unique
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(Uuid);

impl DeploymentId {
    /// Generate a new random DeploymentId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create DeploymentId from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a registered bus consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    /// Generate a new random ConsumerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id threaded through headers, log lines, and bus messages for a
/// single logical request.
///
/// Parsed from inbound `X-Request-ID` headers when present, generated
/// otherwise.
///
/// # Example
/// ```rust
/// use fluxor_rt::util::RequestId;
///
/// let generated = RequestId::new();
/// let parsed = RequestId::from_string("req-abc-123");
/// assert_eq!(parsed.as_str(), "req-abc-123");
/// assert_ne!(generated, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random RequestId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Adopt an externally supplied request id (e.g. an inbound header value)
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
