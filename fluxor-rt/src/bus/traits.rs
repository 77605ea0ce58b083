//! The bus interface and its clustered extension point.
//!
//! The runtime composes against [`EventBus`] only, never a concrete bus
//! type, so an alternative backend (e.g. one relaying through an external
//! broker) can be slotted in without touching verticle code.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::errors::BusError;
use super::message::Message;
use crate::mailbox::{Mailbox, RecvError};
use crate::util::ConsumerId;

/// Addressable message broker.
///
/// Three delivery modes, all keyed by a non-empty string address:
///
/// - `publish` - broadcast to every registered consumer; best-effort per
///   consumer (a full mailbox drops that consumer's copy), never blocks the
///   caller.
/// - `send` - deliver to exactly one consumer, chosen round-robin per
///   address; surfaces [`BusError::AllConsumersBusy`] when every mailbox is
///   saturated.
/// - `request` - `send` plus a temporary one-shot consumer on a generated
///   reply address; resolves with the reply or [`BusError::RequestTimeout`].
///
/// Ordering: messages sent from a single task to a single consumer arrive in
/// order. There is no ordering across consumers or addresses.
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    /// Broadcast to every consumer of `message.address`.
    async fn publish(&self, message: Message) -> Result<(), BusError>;

    /// Deliver to exactly one consumer of `message.address`.
    async fn send(&self, message: Message) -> Result<(), BusError>;

    /// Send and await a reply on a generated reply address.
    ///
    /// On timeout the temporary reply consumer is unregistered before the
    /// error is returned.
    async fn request(&self, message: Message, timeout: Duration) -> Result<Message, BusError>;

    /// Register a consumer mailbox at `address`.
    ///
    /// `capacity` of zero selects the bus default. The returned
    /// [`Subscription`] unregisters itself on drop.
    fn subscribe(&self, address: &str, capacity: usize) -> Result<Subscription, BusError>;

    /// Close the bus: unregister all consumers and reject further traffic.
    fn close(&self);

    /// True once [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

/// Relay contract for a clustered bus backend.
///
/// A clustered [`EventBus`] implementation serializes message bodies,
/// prefixes addresses with a service prefix (`<prefix>.<address>`), and
/// relays envelopes through an external broker. Only the interface is
/// defined here; no clustered implementation ships with the core.
#[async_trait]
pub trait ClusterTransport: Send + Sync + 'static {
    /// Relay a serialized envelope to `subject` on the external broker.
    async fn relay(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribe to `subject`, feeding received envelopes into `mailbox`.
    async fn subscribe(&self, subject: &str, mailbox: Mailbox<Vec<u8>>) -> Result<(), BusError>;
}

/// A registered consumer mailbox.
///
/// Dropping the subscription unregisters the consumer and closes its
/// mailbox; the registry holds no strong reference back.
pub struct Subscription {
    address: String,
    id: ConsumerId,
    mailbox: Mailbox<Message>,
    overflow: Arc<AtomicU64>,
    unregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Assemble a subscription; used by bus implementations.
    pub fn new(
        address: impl Into<String>,
        id: ConsumerId,
        mailbox: Mailbox<Message>,
        overflow: Arc<AtomicU64>,
        unregister: Box<dyn FnOnce() + Send + Sync>,
    ) -> Self {
        Self {
            address: address.into(),
            id,
            mailbox,
            overflow,
            unregister: Some(unregister),
        }
    }

    /// The subscribed address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The consumer's id.
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// The consumer's mailbox.
    pub fn mailbox(&self) -> &Mailbox<Message> {
        &self.mailbox
    }

    /// Publish copies dropped because this consumer's mailbox was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Await the next message for this consumer.
    pub async fn recv(&self, token: &CancellationToken) -> Result<Message, RecvError> {
        self.mailbox.recv(token).await
    }

    /// Unregister explicitly (equivalent to dropping).
    pub fn unregister(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
        self.mailbox.close();
    }
}

// Manual Debug: the unregister closure is not Debug.
impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("address", &self.address)
            .field("id", &self.id)
            .field("queued", &self.mailbox.len())
            .finish_non_exhaustive()
    }
}
