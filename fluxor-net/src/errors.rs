//! Error types for the server fronts.

// Layer 1: Standard library imports
use std::io;
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Errors surfaced by the TCP/HTTP server fronts.
#[derive(Debug, Error)]
pub enum NetError {
    /// Binding the listener failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The requested bind address
        addr: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// A per-connection read exceeded its deadline
    #[error("read timed out after {timeout:?}")]
    ReadTimeout {
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// A per-connection write exceeded its deadline
    #[error("write timed out after {timeout:?}")]
    WriteTimeout {
        /// The deadline that elapsed
        timeout: Duration,
    },

    /// Request body was not valid JSON
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// HTTP connection error from the wire driver
    #[error("http connection error: {0}")]
    Hyper(#[from] hyper::Error),

    /// Other I/O failure on the connection
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_display() {
        let err = NetError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: io::Error::other("denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:80"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_timeout_display() {
        let err = NetError::ReadTimeout {
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("5s"));
    }
}
