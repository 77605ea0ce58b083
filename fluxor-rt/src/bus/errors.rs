//! Error types for bus operations.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Errors surfaced by [`EventBus`](super::EventBus) operations.
///
/// Publish is best-effort per consumer and never fails on overflow; `send`
/// and `request` surface addressing and saturation errors to the caller.
#[derive(Debug, Error)]
pub enum BusError {
    /// Addresses must be non-empty strings
    #[error("bus address must not be empty")]
    EmptyAddress,

    /// No consumer is registered at the address
    #[error("no consumer registered at address: {address}")]
    NoConsumer {
        /// The unroutable address
        address: String,
    },

    /// Every consumer mailbox at the address is full
    #[error("all consumers busy at address: {address}")]
    AllConsumersBusy {
        /// The saturated address
        address: String,
    },

    /// No reply arrived within the request deadline
    #[error("request to {address} timed out after {timeout:?}")]
    RequestTimeout {
        /// The requested address
        address: String,
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// The responder answered with an explicit failure envelope
    #[error("request failed with code {code}: {reason}")]
    ReplyFailure {
        /// Application-defined failure code
        code: i64,
        /// Human-readable failure reason
        reason: String,
    },

    /// The bus has been closed
    #[error("event bus is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_consumer_display() {
        let err = BusError::NoConsumer {
            address: "orders.create".to_string(),
        };
        assert!(err.to_string().contains("orders.create"));
    }

    #[test]
    fn test_timeout_display() {
        let err = BusError::RequestTimeout {
            address: "slow".to_string(),
            timeout: Duration::from_millis(100),
        };
        let msg = err.to_string();
        assert!(msg.contains("slow"));
        assert!(msg.contains("100ms"));
    }

    #[test]
    fn test_reply_failure_display() {
        let err = BusError::ReplyFailure {
            code: 404,
            reason: "not found".to_string(),
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("not found"));
    }
}
