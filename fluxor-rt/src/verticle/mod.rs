//! Verticle lifecycle contracts.
//!
//! A verticle is the runtime's unit of deployment: `start` wires it up
//! (consumers, servers, timers), `stop` tears it down. The callback-style
//! [`AsyncVerticle`] variant completes a [`Promise`](crate::future::Promise)
//! instead of returning, for start sequences that finish on another task.

mod traits;

pub use traits::{AsyncAdapter, AsyncVerticle, BoxError, Verticle};
