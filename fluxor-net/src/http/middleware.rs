// Layer 1: Standard library imports
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use futures::FutureExt;

// Layer 3: Internal module imports
use super::request::RequestContext;
use super::response::HttpResponse;
use super::router::HandlerFuture;

/// A layer in the request-processing chain.
///
/// Middlewares wrap the rest of the chain outer-to-inner in registration
/// order; the recommended order is recovery -> observability -> security ->
/// auth -> compression -> timeout -> handler. A middleware may short-circuit
/// by returning a response without calling `next`.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Process the request, optionally delegating to `next.run(req)`.
    async fn handle(&self, req: RequestContext, next: Next<'_>) -> HttpResponse;
}

/// Continuation of the middleware chain.
pub struct Next<'a> {
    pub(crate) middlewares: &'a [Arc<dyn Middleware>],
    pub(crate) endpoint: &'a (dyn Fn(RequestContext) -> HandlerFuture + Send + Sync),
}

impl Next<'_> {
    /// Run the rest of the chain.
    pub async fn run(self, req: RequestContext) -> HttpResponse {
        match self.middlewares.split_first() {
            Some((first, rest)) => {
                first
                    .handle(
                        req,
                        Next {
                            middlewares: rest,
                            endpoint: self.endpoint,
                        },
                    )
                    .await
            }
            None => (self.endpoint)(req).await,
        }
    }
}

/// Outermost layer: converts a panicking handler into a `500`.
///
/// Panics in handlers are a fault, not control flow; the worker keeps
/// running and the client gets a generic error.
#[derive(Debug, Default)]
pub struct RecoveryMiddleware;

#[async_trait]
impl Middleware for RecoveryMiddleware {
    async fn handle(&self, req: RequestContext, next: Next<'_>) -> HttpResponse {
        let method = req.method().clone();
        let path = req.path().to_string();
        let request_id = req.request_id().clone();

        match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(response) => response,
            Err(_panic) => {
                tracing::error!(%method, path, %request_id, "handler panicked");
                HttpResponse::internal_error()
            }
        }
    }
}

/// Logs one line per request with method, path, status, and timing.
#[derive(Debug, Default)]
pub struct RequestLogMiddleware;

#[async_trait]
impl Middleware for RequestLogMiddleware {
    async fn handle(&self, req: RequestContext, next: Next<'_>) -> HttpResponse {
        let method = req.method().clone();
        let path = req.path().to_string();
        let request_id = req.request_id().clone();
        let started = Instant::now();

        let response = next.run(req).await;

        tracing::info!(
            %method,
            path,
            %request_id,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
        response
    }
}

/// Bounds the rest of the chain with a deadline; `503` on expiry.
#[derive(Debug)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Bound downstream processing by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    async fn handle(&self, req: RequestContext, next: Next<'_>) -> HttpResponse {
        let path = req.path().to_string();
        let request_id = req.request_id().clone();

        match tokio::time::timeout(self.timeout, next.run(req)).await {
            Ok(response) => response,
            Err(_elapsed) => {
                tracing::warn!(path, %request_id, timeout = ?self.timeout, "request timed out");
                HttpResponse::service_unavailable("request timed out")
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to use unwrap/panic
mod tests {
    use super::*;
    use bytes::Bytes;
    use fluxor_rt::bus::LocalBus;
    use fluxor_rt::config::ConfigMap;
    use fluxor_rt::context::FluxorContext;
    use fluxor_rt::runtime::WeakVertx;
    use fluxor_rt::util::RequestId;
    use http::{HeaderMap, Method, StatusCode};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn request() -> RequestContext {
        let ctx = FluxorContext::new(
            CancellationToken::new(),
            Arc::new(LocalBus::new()),
            WeakVertx::detached(),
            ConfigMap::empty(),
        );
        RequestContext::new(
            Method::GET,
            "/test".to_string(),
            String::new(),
            HeaderMap::new(),
            Bytes::new(),
            ctx,
            RequestId::new(),
        )
    }

    async fn run_chain(
        middlewares: Vec<Arc<dyn Middleware>>,
        endpoint: impl Fn(RequestContext) -> HandlerFuture + Send + Sync,
    ) -> HttpResponse {
        let next = Next {
            middlewares: &middlewares,
            endpoint: &endpoint,
        };
        next.run(request()).await
    }

    #[tokio::test]
    async fn test_empty_chain_hits_endpoint() {
        let response = run_chain(Vec::new(), |_req| {
            Box::pin(async { HttpResponse::text(StatusCode::OK, "endpoint") })
        })
        .await;
        assert_eq!(response.body().as_ref(), b"endpoint");
    }

    #[tokio::test]
    async fn test_recovery_converts_panic_to_500() {
        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(RecoveryMiddleware)];
        let response = run_chain(middlewares, |_req| {
            Box::pin(async { panic!("handler exploded") })
        })
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_timeout_returns_503() {
        let middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(TimeoutMiddleware::new(Duration::from_millis(50)))];
        let response = run_chain(middlewares, |_req| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                HttpResponse::ok_json(&json!({}))
            })
        })
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_middleware_order_outer_to_inner() {
        struct Tagger(&'static str);

        #[async_trait]
        impl Middleware for Tagger {
            async fn handle(&self, mut req: RequestContext, next: Next<'_>) -> HttpResponse {
                let order = match req.get_data("order") {
                    Some(value) => format!("{},{}", value.as_str().unwrap_or(""), self.0),
                    None => self.0.to_string(),
                };
                req.set_data("order", json!(order));
                next.run(req).await
            }
        }

        let middlewares: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(Tagger("outer")), Arc::new(Tagger("inner"))];
        let response = run_chain(middlewares, |req| {
            let order = req
                .get_data("order")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            Box::pin(async move { HttpResponse::text(StatusCode::OK, order) })
        })
        .await;

        assert_eq!(response.body().as_ref(), b"outer,inner");
    }

    #[tokio::test]
    async fn test_short_circuit_skips_endpoint() {
        struct Deny;

        #[async_trait]
        impl Middleware for Deny {
            async fn handle(&self, _req: RequestContext, _next: Next<'_>) -> HttpResponse {
                HttpResponse::text(StatusCode::FORBIDDEN, "denied")
            }
        }

        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(Deny)];
        let response = run_chain(middlewares, |_req| {
            Box::pin(async { panic!("endpoint must not run") })
        })
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
