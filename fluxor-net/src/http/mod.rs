//! HTTP server front: admission-bounded hyper connections routed through
//! Fluxor's own router and middleware chain.

mod middleware;
mod request;
mod response;
mod router;
mod server;

pub use middleware::{
    Middleware, Next, RecoveryMiddleware, RequestLogMiddleware, TimeoutMiddleware,
};
pub use request::RequestContext;
pub use response::HttpResponse;
pub use router::{handler_fn, HandlerFuture, Params, RouteHandler, Router};
pub use server::{HttpApp, HttpServer, HttpServerOptions};

/// Header carrying the request correlation id, read from inbound requests
/// and echoed on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
