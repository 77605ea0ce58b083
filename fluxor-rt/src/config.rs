//! Immutable configuration injected into every [`FluxorContext`](crate::context::FluxorContext).
//!
//! A [`ConfigMap`] is loaded once at startup from a JSON or YAML file (or
//! built from a `serde_json::Value`) and shared by cheap clone. Dotted keys
//! (`nats.url`) resolve through nested objects with a flat-key fallback.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Recognized configuration keys.
pub mod keys {
    /// Bind address for HTTP verticles
    pub const HTTP_ADDR: &str = "http_addr";
    /// Bind address for TCP verticles
    pub const TCP_ADDR: &str = "tcp_addr";
    /// Default worker pool size
    pub const WORKERS: &str = "workers";
    /// Default mailbox / task queue capacity
    pub const MAX_QUEUE: &str = "max_queue";
    /// Per-server connection cap (0 = unlimited)
    pub const MAX_CONNS: &str = "max_conns";
    /// Per-connection read deadline in seconds
    pub const READ_TIMEOUT: &str = "read_timeout";
    /// Per-connection write deadline in seconds
    pub const WRITE_TIMEOUT: &str = "write_timeout";
    /// Clustered bus broker URL (when a clustered backend is enabled)
    pub const NATS_URL: &str = "nats.url";
    /// Clustered bus service prefix
    pub const NATS_PREFIX: &str = "nats.prefix";
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file was not valid JSON
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The file was not valid YAML
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document root must be an object/mapping
    #[error("config root must be an object")]
    NotAnObject,

    /// File extension was neither json nor yaml/yml
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}

/// Immutable key/value configuration map.
///
/// # Example
///
/// ```rust
/// use fluxor_rt::config::{keys, ConfigMap};
/// use serde_json::json;
///
/// let config = ConfigMap::from_value(json!({
///     "workers": 8,
///     "nats": { "url": "nats://localhost:4222" },
/// })).unwrap();
///
/// assert_eq!(config.get_u64(keys::WORKERS), Some(8));
/// assert_eq!(config.get_str(keys::NATS_URL), Some("nats://localhost:4222"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    values: Arc<HashMap<String, Value>>,
}

impl ConfigMap {
    /// An empty configuration.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a JSON value; the root must be an object.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => Ok(Self {
                values: Arc::new(map.into_iter().collect()),
            }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    /// Parse a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(raw)?;
        Self::from_value(value)
    }

    /// Load from a file; the format is picked by extension
    /// (`.json`, `.yaml`, `.yml`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Look up a value. Dotted keys (`nats.url`) first try the flat key, then
    /// walk nested objects segment by segment.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.values.get(key) {
            return Some(value);
        }
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.values.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// String accessor.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer accessor.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Boolean accessor.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Duration accessor; the raw value is a number of seconds.
    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }

    /// True when no keys are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Produce a new map with `overrides` layered on top (per-deployment
    /// config snapshots).
    pub fn merged_with(&self, overrides: &ConfigMap) -> ConfigMap {
        let mut merged: HashMap<String, Value> = self.values.as_ref().clone();
        for (key, value) in overrides.values.iter() {
            merged.insert(key.clone(), value.clone());
        }
        ConfigMap {
            values: Arc::new(merged),
        }
    }
}
