//! Handler-facing consumer surface: poll loop, deliveries, reply path.

// Layer 1: Standard library imports
use std::future::Future;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::errors::BusError;
use super::message::Message;
use super::traits::{EventBus, Subscription};
use crate::mailbox::RecvError;

/// A message handed to a consumer, with its reply path attached.
pub struct Delivery {
    message: Message,
    bus: Arc<dyn EventBus>,
}

impl Delivery {
    pub(crate) fn new(message: Message, bus: Arc<dyn EventBus>) -> Self {
        Self { message, bus }
    }

    /// The delivered message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Shorthand for the message body.
    pub fn body(&self) -> &Value {
        &self.message.body
    }

    /// Take ownership of the message.
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Reply on the message's reply address.
    ///
    /// A no-op (logged at warn) when the message carries no reply address.
    /// The originating request id is propagated onto the reply.
    pub async fn reply(&self, body: Value) -> Result<(), BusError> {
        match &self.message.reply_address {
            Some(reply_address) => {
                let mut reply = Message::new(reply_address.clone(), body);
                reply.request_id = self.message.request_id.clone();
                self.bus.publish(reply).await
            }
            None => {
                tracing::warn!(
                    address = %self.message.address,
                    "reply requested but message has no reply address"
                );
                Ok(())
            }
        }
    }

    /// Reply with an explicit failure envelope.
    pub async fn fail(&self, code: i64, reason: &str) -> Result<(), BusError> {
        match &self.message.reply_address {
            Some(reply_address) => {
                let mut reply = Message::failure(reply_address.clone(), code, reason);
                reply.request_id = self.message.request_id.clone();
                self.bus.publish(reply).await
            }
            None => {
                tracing::warn!(
                    address = %self.message.address,
                    "fail requested but message has no reply address"
                );
                Ok(())
            }
        }
    }
}

/// A registered consumer ready to receive.
///
/// Either poll it manually with [`Consumer::next`], or install a handler
/// with [`Consumer::handler`], which spawns the poll loop and returns a
/// [`ConsumerHandle`] for teardown. Messages from a single sender are
/// handled in order: the loop awaits each handler invocation before
/// receiving the next message.
pub struct Consumer {
    subscription: Subscription,
    bus: Arc<dyn EventBus>,
    token: CancellationToken,
}

impl Consumer {
    /// Pair a subscription with the bus it came from.
    pub fn new(subscription: Subscription, bus: Arc<dyn EventBus>, token: CancellationToken) -> Self {
        Self {
            subscription,
            bus,
            token,
        }
    }

    /// The subscribed address.
    pub fn address(&self) -> &str {
        self.subscription.address()
    }

    /// Publish copies dropped because this consumer's mailbox was full.
    pub fn overflow_count(&self) -> u64 {
        self.subscription.overflow_count()
    }

    /// Await the next delivery.
    pub async fn next(&self) -> Result<Delivery, RecvError> {
        let message = self.subscription.recv(&self.token).await?;
        Ok(Delivery::new(message, Arc::clone(&self.bus)))
    }

    /// Install a handler and spawn the poll loop.
    ///
    /// Handlers must not block the loop on long work; submit that to the
    /// executor instead.
    pub fn handler<F, Fut>(self, handler: F) -> ConsumerHandle
    where
        F: Fn(Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let address = self.subscription.address().to_string();
        let token = self.token.clone();
        let join = tokio::spawn(async move {
            loop {
                match self.next().await {
                    Ok(delivery) => handler(delivery).await,
                    Err(_) => break,
                }
            }
        });
        ConsumerHandle {
            address,
            token,
            join,
        }
    }
}

/// Handle to a running consumer loop.
///
/// Dropping the handle leaves the loop running; call
/// [`ConsumerHandle::unregister`] or [`ConsumerHandle::stop`] to tear it
/// down (the underlying subscription unregisters when the loop exits).
pub struct ConsumerHandle {
    address: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    /// The consumed address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Signal the loop to stop; the consumer unregisters as it exits.
    pub fn unregister(&self) {
        self.token.cancel();
    }

    /// Signal the loop to stop and wait for it to finish.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.join.await;
    }

    /// True once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn consumer_on(bus: &LocalBus, address: &str) -> Consumer {
        let subscription = bus.subscribe(address, 0).unwrap();
        Consumer::new(
            subscription,
            Arc::new(bus.clone()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_handler_receives_messages() {
        let bus = LocalBus::new();
        let consumer = consumer_on(&bus, "counter");
        let seen = Arc::new(AtomicU64::new(0));

        let handler_seen = Arc::clone(&seen);
        let handle = consumer.handler(move |_delivery| {
            let seen = Arc::clone(&handler_seen);
            async move {
                seen.fetch_add(1, Ordering::Relaxed);
            }
        });

        for _ in 0..3 {
            bus.publish(Message::new("counter", json!(1))).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::Relaxed), 3);

        handle.stop().await;
        assert_eq!(bus.consumer_count("counter"), 0);
    }

    #[tokio::test]
    async fn test_reply_roundtrip_via_delivery() {
        let bus = LocalBus::new();
        let consumer = consumer_on(&bus, "echo");

        let _handle = consumer.handler(move |delivery| async move {
            let body = delivery.body().clone();
            let _ = delivery.reply(body).await;
        });

        let reply = bus
            .request(
                Message::new("echo", json!({"ping": true})),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(reply.body, json!({"ping": true}));
    }

    #[tokio::test]
    async fn test_fail_surfaces_as_reply_failure() {
        let bus = LocalBus::new();
        let consumer = consumer_on(&bus, "guarded");

        let _handle = consumer.handler(move |delivery| async move {
            let _ = delivery.fail(400, "bad payload").await;
        });

        let result = bus
            .request(Message::new("guarded", json!({})), Duration::from_secs(1))
            .await;
        assert!(matches!(
            result,
            Err(BusError::ReplyFailure { code: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_reply_without_reply_address_is_noop() {
        let bus = LocalBus::new();
        let consumer = consumer_on(&bus, "fire-and-forget");

        bus.publish(Message::new("fire-and-forget", json!(1)))
            .await
            .unwrap();

        let delivery = consumer.next().await.unwrap();
        delivery.reply(json!("ignored")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_stops_loop() {
        let bus = LocalBus::new();
        let consumer = consumer_on(&bus, "stoppable");
        let handle = consumer.handler(|_delivery| async {});

        handle.unregister();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished());
        assert_eq!(bus.consumer_count("stoppable"), 0);
    }

    #[tokio::test]
    async fn test_request_id_propagates_to_reply() {
        let bus = LocalBus::new();
        let consumer = consumer_on(&bus, "traced");

        let _handle = consumer.handler(move |delivery| async move {
            let _ = delivery.reply(json!("pong")).await;
        });

        let mut request = Message::new("traced", json!("ping"));
        request.request_id = Some("req-42".to_string());
        let reply = bus.request(request, Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.request_id.as_deref(), Some("req-42"));
    }
}
