//! # fluxor-net - Bounded Server Fronts
//!
//! TCP and HTTP servers that translate raw connections into bounded work
//! units. Both fronts share one admission pipeline:
//!
//! ```text
//! accept -> backpressure.try_acquire -> max_conns check -> executor.submit
//!           (reject = close immediately)      (QueueFull = reject)
//! ```
//!
//! An admitted connection becomes a task on the shared
//! [`WorkerPool`](fluxor_rt::executor::WorkerPool); saturation is visible at
//! the edge as dropped connections (TCP) or `503` responses (HTTP), never as
//! unbounded queueing.
//!
//! The HTTP front drives hyper's HTTP/1.1 connection on a pool worker and
//! routes through Fluxor's own [`Router`](http::Router) (`:param` path
//! captures, first registered match wins) and middleware chain.

pub mod errors;
pub mod http;
pub mod metrics;
pub mod tcp;

pub use errors::NetError;
pub use http::{
    handler_fn, HttpApp, HttpResponse, HttpServer, HttpServerOptions, Middleware, Next,
    RecoveryMiddleware, RequestContext, RequestLogMiddleware, Router, TimeoutMiddleware,
};
pub use metrics::{ServerMetrics, ServerMetricsSnapshot};
pub use tcp::{Acceptor, ConnContext, ConnHandler, ConnStream, TcpAcceptor, TcpServer, TcpServerOptions};
