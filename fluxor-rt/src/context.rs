//! Per-call injection point for runtime services.
//!
//! A [`FluxorContext`] is handed to every verticle `start`/`stop` call and
//! every handler. It carries the cancellable context (a child of the Vertx
//! root token), the bus, a weak runtime handle, the immutable config map,
//! and the request id of the logical request being served, if any.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde_json::Value;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use crate::bus::{BusError, Consumer, EventBus, Message};
use crate::config::ConfigMap;
use crate::runtime::{Vertx, WeakVertx};
use crate::util::RequestId;

/// Cheap-clone handle bundling the services a handler may need.
///
/// Cloning derives no new state; use [`FluxorContext::child`] for a child
/// cancellation scope or [`FluxorContext::with_request_id`] to tag a logical
/// request.
#[derive(Clone)]
pub struct FluxorContext {
    token: CancellationToken,
    bus: Arc<dyn EventBus>,
    vertx: WeakVertx,
    config: ConfigMap,
    request_id: Option<RequestId>,
}

impl FluxorContext {
    /// Assemble a context directly.
    ///
    /// Usually obtained from the runtime ([`Vertx::context`]); direct
    /// construction serves tests and embeddings without a full runtime
    /// (pass [`WeakVertx::detached`]).
    pub fn new(
        token: CancellationToken,
        bus: Arc<dyn EventBus>,
        vertx: WeakVertx,
        config: ConfigMap,
    ) -> Self {
        Self {
            token,
            bus,
            vertx,
            config,
            request_id: None,
        }
    }

    /// The cancellation token governing this context.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the owning scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The event bus.
    pub fn bus(&self) -> Arc<dyn EventBus> {
        Arc::clone(&self.bus)
    }

    /// The owning runtime, unless it has already been dropped.
    pub fn vertx(&self) -> Option<Vertx> {
        self.vertx.upgrade()
    }

    /// The immutable configuration snapshot for this deployment.
    pub fn config(&self) -> &ConfigMap {
        &self.config
    }

    /// The request id this context is serving, if any.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Derive a context scoped under a child cancellation token.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            ..self.clone()
        }
    }

    /// Derive a context tagged with a request id; bus traffic sent through
    /// it carries the id.
    pub fn with_request_id(&self, request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            ..self.clone()
        }
    }

    /// Broadcast `body` to every consumer of `address`.
    pub async fn publish(&self, address: &str, body: Value) -> Result<(), BusError> {
        self.bus.publish(self.message(address, body)).await
    }

    /// Deliver `body` to one consumer of `address`.
    pub async fn send(&self, address: &str, body: Value) -> Result<(), BusError> {
        self.bus.send(self.message(address, body)).await
    }

    /// Send `body` and await a reply.
    pub async fn request(
        &self,
        address: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        self.bus.request(self.message(address, body), timeout).await
    }

    /// Register a consumer at `address` with the bus default mailbox
    /// capacity.
    pub fn consumer(&self, address: &str) -> Result<Consumer, BusError> {
        self.consumer_with_capacity(address, 0)
    }

    /// Register a consumer at `address` with an explicit mailbox capacity.
    pub fn consumer_with_capacity(
        &self,
        address: &str,
        capacity: usize,
    ) -> Result<Consumer, BusError> {
        let subscription = self.bus.subscribe(address, capacity)?;
        Ok(Consumer::new(
            subscription,
            Arc::clone(&self.bus),
            self.token.child_token(),
        ))
    }

    fn message(&self, address: &str, body: Value) -> Message {
        let mut message = Message::new(address, body);
        if let Some(request_id) = &self.request_id {
            message.request_id = Some(request_id.as_str().to_string());
        }
        message
    }
}
