//! # fluxor-rt - Reactor-Style Verticle Runtime
//!
//! Core runtime for hosting long-lived components ("verticles") on top of a
//! shared in-process event bus, with fail-fast backpressure enforced by
//! bounded mailboxes and a fixed worker pool.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fluxor_rt::prelude::*;
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! struct EchoVerticle;
//!
//! #[async_trait]
//! impl Verticle for EchoVerticle {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn start(&mut self, ctx: FluxorContext) -> Result<(), BoxError> {
//!         let consumer = ctx.consumer("echo.request")?;
//!         consumer.handler(|delivery| async move {
//!             let body = delivery.body().clone();
//!             let _ = delivery.reply(body).await;
//!         });
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vertx = Vertx::new(VertxOptions::default());
//!     vertx.deploy(EchoVerticle).await?;
//!
//!     let reply = vertx
//!         .context()
//!         .request("echo.request", json!({"x": 1}), std::time::Duration::from_secs(1))
//!         .await?;
//!     println!("echoed: {}", reply.body);
//!
//!     vertx.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Core Model
//!
//! There is no global event loop. Every asynchronous construct in the runtime
//! is a bounded worker pool pulling from a bounded mailbox:
//!
//! - [`mailbox`] - Bounded FIFO with non-blocking send and cancellable receive
//! - [`executor`] - Fixed worker pool draining a bounded task queue
//! - [`backpressure`] - Sliding-window admission counter for fail-fast rejection
//! - [`bus`] - Addressable pub/sub + point-to-point + request/reply broker
//! - [`future`] - One-shot promise/future with await, combinators, all/race
//! - [`verticle`] - Start/Stop lifecycle contract for deployable units
//! - [`runtime`] - The `Vertx` runtime owning the bus and deployment registry
//! - [`config`] - Immutable configuration map injected into every context
//! - [`context`] - Per-call injection point (cancellation, bus, config, request id)
//!
//! Data flows external I/O -> admission (`BackpressureController::try_acquire`)
//! -> `Mailbox::try_send` -> worker -> user handler -> bus -> reply path. The
//! non-blocking send is the core fail-fast primitive: saturation surfaces at
//! the boundary instead of queueing without bound.
//!
//! # Concurrency Notes
//!
//! Handler bodies run on executor workers. They may block briefly, but must
//! never wait on another handler running in the same bounded pool (classic
//! pool-starvation deadlock). Long work belongs on the executor via
//! [`executor::WorkerPool::submit`], not inline in a bus handler.

pub mod backpressure;
pub mod bus;
pub mod config;
pub mod context;
pub mod executor;
pub mod future;
pub mod mailbox;
pub mod runtime;
pub mod util;
pub mod verticle;

// Re-export commonly used types
pub use backpressure::{BackpressureController, BackpressureMetrics};
pub use bus::{
    BusError, BusMetrics, Consumer, ConsumerHandle, Delivery, EventBus, LocalBus, Message,
    Subscription,
};
pub use config::{ConfigError, ConfigMap};
pub use context::FluxorContext;
pub use executor::{ExecutorError, ExecutorStats, WorkerPool};
pub use future::{join_all, race, FluxorFuture, FutureError, Promise};
pub use mailbox::{Mailbox, MailboxMetrics, RecvError, SendError, TryRecvError};
pub use runtime::{DeployError, DeploymentId, DeploymentState, Vertx, VertxOptions};
pub use util::{ConsumerId, RequestId};
pub use verticle::{AsyncAdapter, AsyncVerticle, BoxError, Verticle};

/// Convenience prelude for verticle authors.
pub mod prelude {
    pub use crate::bus::{Delivery, EventBus, Message};
    pub use crate::config::ConfigMap;
    pub use crate::context::FluxorContext;
    pub use crate::future::Promise;
    pub use crate::runtime::{Vertx, VertxOptions};
    pub use crate::verticle::{AsyncVerticle, BoxError, Verticle};
}
