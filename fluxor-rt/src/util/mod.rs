//! Shared utilities: identifier newtypes used across the runtime.

mod ids;

pub use ids::{ConsumerId, DeploymentId, RequestId};
