//! Addressable message bus: broadcast, point-to-point, and request/reply.
//!
//! Addresses are plain strings, dot-separated by convention
//! (`payments.authorize`). Every consumer owns a bounded mailbox; delivery
//! into a mailbox is always a non-blocking send, so a slow consumer never
//! blocks a publisher. The bus itself is a trait ([`EventBus`]); the
//! in-process implementation is [`LocalBus`], and a clustered backend can be
//! slotted in behind the same interface (see [`ClusterTransport`]).

mod consumer;
mod errors;
mod local;
mod message;
mod metrics;
mod traits;

pub use consumer::{Consumer, ConsumerHandle, Delivery};
pub use errors::BusError;
pub use local::LocalBus;
pub use message::Message;
pub use metrics::BusMetrics;
pub use traits::{ClusterTransport, EventBus, Subscription};
