//! In-process event bus.
//!
//! Registry layout follows the delivery hot path: lookups take the read side
//! of the registry lock only; registration and unregistration take the write
//! side. Per-address round-robin pointers are atomics, so `send` does not
//! write-lock.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// Layer 3: Internal module imports
use super::errors::BusError;
use super::message::Message;
use super::metrics::BusMetrics;
use super::traits::{EventBus, Subscription};
use crate::mailbox::{Mailbox, SendError};
use crate::util::ConsumerId;

/// Default per-consumer mailbox capacity.
pub const DEFAULT_CONSUMER_CAPACITY: usize = 128;

/// Prefix of generated request/reply addresses.
const REPLY_ADDRESS_PREFIX: &str = "__reply.";

/// In-process [`EventBus`] implementation.
///
/// Cheap to clone; all clones share the same registry and counters.
///
/// # Example
///
/// ```rust,ignore
/// use fluxor_rt::bus::{EventBus, LocalBus, Message};
/// use serde_json::json;
///
/// let bus = LocalBus::new();
/// let subscription = bus.subscribe("greetings", 0)?;
/// bus.publish(Message::new("greetings", json!("hello"))).await?;
/// ```
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<LocalBusInner>,
}

struct LocalBusInner {
    registry: RwLock<HashMap<String, AddressEntry>>,
    metrics: BusMetrics,
    default_capacity: usize,
    closed: AtomicBool,
}

struct AddressEntry {
    consumers: Vec<ConsumerSlot>,
    /// Round-robin pointer; taken modulo the consumer count at send time.
    next: AtomicUsize,
}

struct ConsumerSlot {
    id: ConsumerId,
    mailbox: Mailbox<Message>,
    overflow: Arc<AtomicU64>,
}

impl LocalBus {
    /// Create a bus with the default consumer mailbox capacity.
    pub fn new() -> Self {
        Self::with_default_capacity(DEFAULT_CONSUMER_CAPACITY)
    }

    /// Create a bus whose consumers default to `capacity` mailbox slots.
    pub fn with_default_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(LocalBusInner {
                registry: RwLock::new(HashMap::new()),
                metrics: BusMetrics::new(),
                default_capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Bus-level traffic counters.
    pub fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }

    /// Number of consumers registered at `address`.
    pub fn consumer_count(&self, address: &str) -> usize {
        self.inner
            .registry
            .read()
            .get(address)
            .map_or(0, |entry| entry.consumers.len())
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        Ok(())
    }

    fn publish_impl(&self, message: Message) -> Result<(), BusError> {
        self.ensure_open()?;
        if message.address.is_empty() {
            return Err(BusError::EmptyAddress);
        }

        let registry = self.inner.registry.read();
        if let Some(entry) = registry.get(&message.address) {
            for slot in &entry.consumers {
                match slot.mailbox.try_send(message.clone()) {
                    Ok(()) => self.inner.metrics.record_delivered(),
                    Err(SendError::Full { .. }) => {
                        // Best-effort: this consumer's copy is dropped.
                        slot.overflow.fetch_add(1, Ordering::Relaxed);
                        self.inner.metrics.record_dropped();
                        tracing::warn!(
                            address = %message.address,
                            consumer = %slot.id,
                            "publish overflow; dropping consumer copy"
                        );
                    }
                    Err(SendError::Closed { .. }) => {
                        self.inner.metrics.record_dropped();
                    }
                }
            }
        }
        self.inner.metrics.record_published();
        Ok(())
    }

    fn send_impl(&self, message: Message) -> Result<(), BusError> {
        self.ensure_open()?;
        if message.address.is_empty() {
            return Err(BusError::EmptyAddress);
        }

        let address = message.address.clone();
        let registry = self.inner.registry.read();
        let entry = registry
            .get(&address)
            .filter(|entry| !entry.consumers.is_empty())
            .ok_or_else(|| BusError::NoConsumer {
                address: address.clone(),
            })?;

        let count = entry.consumers.len();
        let start = entry.next.fetch_add(1, Ordering::Relaxed) % count;

        let mut message = message;
        for attempt in 0..count {
            let slot = &entry.consumers[(start + attempt) % count];
            match slot.mailbox.try_send(message) {
                Ok(()) => {
                    if attempt > 0 {
                        // Keep the pointer aligned with the consumer that
                        // actually took the message.
                        entry.next.fetch_add(attempt, Ordering::Relaxed);
                    }
                    self.inner.metrics.record_sent();
                    self.inner.metrics.record_delivered();
                    return Ok(());
                }
                Err(err) => {
                    if err.is_full() {
                        slot.overflow.fetch_add(1, Ordering::Relaxed);
                    }
                    message = err.into_message();
                }
            }
        }

        Err(BusError::AllConsumersBusy { address })
    }

    async fn request_impl(
        &self,
        mut message: Message,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        self.ensure_open()?;
        let address = message.address.clone();
        let reply_address = format!("{REPLY_ADDRESS_PREFIX}{}", Uuid::new_v4());

        // One-shot reply consumer; capacity 1 is enough for a single reply.
        let subscription = self.subscribe_impl(&reply_address, 1)?;
        message.reply_address = Some(reply_address);

        self.send_impl(message)?;

        let token = CancellationToken::new();
        match tokio::time::timeout(timeout, subscription.recv(&token)).await {
            Ok(Ok(reply)) => {
                drop(subscription);
                match reply.failure_details() {
                    Some((code, reason)) => Err(BusError::ReplyFailure { code, reason }),
                    None => Ok(reply),
                }
            }
            Ok(Err(_recv)) => {
                drop(subscription);
                Err(BusError::Closed)
            }
            Err(_elapsed) => {
                // Unregister the synthetic reply address before surfacing
                // the timeout.
                drop(subscription);
                Err(BusError::RequestTimeout { address, timeout })
            }
        }
    }

    fn subscribe_impl(&self, address: &str, capacity: usize) -> Result<Subscription, BusError> {
        self.ensure_open()?;
        if address.is_empty() {
            return Err(BusError::EmptyAddress);
        }

        let capacity = if capacity == 0 {
            self.inner.default_capacity
        } else {
            capacity
        };

        let id = ConsumerId::new();
        let mailbox: Mailbox<Message> = Mailbox::new(capacity);
        let overflow = Arc::new(AtomicU64::new(0));

        {
            let mut registry = self.inner.registry.write();
            let entry = registry
                .entry(address.to_string())
                .or_insert_with(|| AddressEntry {
                    consumers: Vec::new(),
                    next: AtomicUsize::new(0),
                });
            entry.consumers.push(ConsumerSlot {
                id,
                mailbox: mailbox.clone(),
                overflow: Arc::clone(&overflow),
            });
        }
        tracing::debug!(%address, consumer = %id, "consumer registered");

        let weak: Weak<LocalBusInner> = Arc::downgrade(&self.inner);
        let unregister_address = address.to_string();
        let unregister = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut registry = inner.registry.write();
                if let Some(entry) = registry.get_mut(&unregister_address) {
                    entry.consumers.retain(|slot| slot.id != id);
                    if entry.consumers.is_empty() {
                        registry.remove(&unregister_address);
                    }
                }
            }
        });

        Ok(Subscription::new(address, id, mailbox, overflow, unregister))
    }

    fn close_impl(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut registry = self.inner.registry.write();
        for (_, entry) in registry.drain() {
            for slot in entry.consumers {
                slot.mailbox.close();
            }
        }
        tracing::debug!("event bus closed");
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for LocalBus {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        self.publish_impl(message)
    }

    async fn send(&self, message: Message) -> Result<(), BusError> {
        self.send_impl(message)
    }

    async fn request(&self, message: Message, timeout: Duration) -> Result<Message, BusError> {
        self.request_impl(message, timeout).await
    }

    fn subscribe(&self, address: &str, capacity: usize) -> Result<Subscription, BusError> {
        self.subscribe_impl(address, capacity)
    }

    fn close(&self) {
        self.close_impl();
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
