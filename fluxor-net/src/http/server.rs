// Layer 1: Standard library imports
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};

// Layer 3: Internal module imports
use super::middleware::{Middleware, Next};
use super::request::RequestContext;
use super::response::HttpResponse;
use super::router::Router;
use super::REQUEST_ID_HEADER;
use crate::errors::NetError;
use crate::metrics::ServerMetricsSnapshot;
use crate::tcp::{ConnContext, ConnHandler, TcpServer, TcpServerOptions};
use fluxor_rt::config::{keys, ConfigMap};
use fluxor_rt::context::FluxorContext;
use fluxor_rt::executor::WorkerPool;
use fluxor_rt::util::RequestId;

/// Canned response written to a connection rejected at admission, before
/// hyper ever sees it.
const REJECT_503: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
content-type: text/plain\r\n\
content-length: 19\r\n\
connection: close\r\n\
\r\n\
service unavailable";

/// HTTP server tunables.
#[derive(Debug, Clone)]
pub struct HttpServerOptions {
    /// Bind address (`host:port`)
    pub bind_addr: String,

    /// Per-server connection cap (0 = unlimited)
    pub max_conns: usize,

    /// Header read deadline and connection write deadline
    pub read_timeout: Duration,

    /// Write deadline carried by the underlying TCP options
    pub write_timeout: Duration,
}

impl Default for HttpServerOptions {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            max_conns: 0,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl HttpServerOptions {
    /// Derive options from a configuration map (`http_addr`, `max_conns`,
    /// `read_timeout`, `write_timeout`).
    pub fn from_config(config: &ConfigMap) -> Self {
        let mut options = Self::default();
        if let Some(addr) = config.get_str(keys::HTTP_ADDR) {
            options.bind_addr = addr.to_string();
        }
        if let Some(max_conns) = config.get_u64(keys::MAX_CONNS) {
            options.max_conns = max_conns as usize;
        }
        if let Some(timeout) = config.get_duration_secs(keys::READ_TIMEOUT) {
            options.read_timeout = timeout;
        }
        if let Some(timeout) = config.get_duration_secs(keys::WRITE_TIMEOUT) {
            options.write_timeout = timeout;
        }
        options
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set the connection cap.
    pub fn with_max_conns(mut self, max_conns: usize) -> Self {
        self.max_conns = max_conns;
        self
    }
}

/// A router plus its middleware chain.
///
/// Middlewares apply outer-to-inner in registration order.
pub struct HttpApp {
    router: Arc<Router>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl HttpApp {
    /// Wrap a router with an empty middleware chain.
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            middlewares: Vec::new(),
        }
    }

    /// Append a middleware (outermost first).
    pub fn with_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Run a request through the chain and router.
    pub async fn dispatch(&self, req: RequestContext) -> HttpResponse {
        let router = Arc::clone(&self.router);
        let endpoint = move |req: RequestContext| router.dispatch_route(req);
        let next = Next {
            middlewares: &self.middlewares,
            endpoint: &endpoint,
        };
        next.run(req).await
    }
}

/// Bounded HTTP server front.
///
/// Reuses the TCP admission pipeline; an admitted connection is driven by
/// hyper's HTTP/1.1 state machine on a pool worker. Connections rejected at
/// admission receive a canned `503` and are closed.
pub struct HttpServer {
    inner: TcpServer,
}

impl HttpServer {
    /// Bind and start serving `app`.
    pub async fn bind(
        ctx: &FluxorContext,
        pool: Arc<WorkerPool>,
        options: HttpServerOptions,
        app: HttpApp,
    ) -> Result<Self, NetError> {
        let tcp_options = TcpServerOptions {
            bind_addr: options.bind_addr.clone(),
            max_conns: options.max_conns,
            read_timeout: options.read_timeout,
            write_timeout: options.write_timeout,
            reject_payload: Some(REJECT_503.to_vec()),
        };
        let handler = Arc::new(HyperHandler {
            app: Arc::new(app),
            header_timeout: options.read_timeout,
        });
        let inner = TcpServer::bind(ctx, pool, tcp_options, handler).await?;
        tracing::info!(addr = %inner.local_addr(), "http server ready");
        Ok(Self { inner })
    }

    /// The bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    /// Snapshot of connection counters.
    pub fn metrics(&self) -> ServerMetricsSnapshot {
        self.inner.metrics()
    }

    /// Stop accepting; in-flight connections run to completion.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

/// Drives hyper's HTTP/1.1 connection for one admitted socket.
struct HyperHandler {
    app: Arc<HttpApp>,
    header_timeout: Duration,
}

#[async_trait]
impl ConnHandler for HyperHandler {
    async fn handle(&self, conn: ConnContext) -> Result<(), NetError> {
        let (stream, _peer, ctx) = conn.into_parts();
        let app = Arc::clone(&self.app);

        let service = service_fn(move |req: Request<Incoming>| {
            let app = Arc::clone(&app);
            let ctx = ctx.clone();
            async move { Ok::<_, Infallible>(handle_request(app, ctx, req).await) }
        });

        hyper::server::conn::http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(self.header_timeout)
            .serve_connection(TokioIo::new(stream), service)
            .await?;
        Ok(())
    }
}

async fn handle_request(
    app: Arc<HttpApp>,
    base_ctx: FluxorContext,
    req: Request<Incoming>,
) -> hyper::Response<http_body_util::Full<Bytes>> {
    let (parts, body) = req.into_parts();

    // Read-or-generate the correlation id; it is echoed on the response and
    // propagated into any bus message sent from the handler.
    let request_id = parts
        .headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(RequestId::from_string)
        .unwrap_or_default();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(error) => {
            tracing::warn!(%request_id, %error, "failed to read request body");
            return HttpResponse::bad_request("unreadable body").into_hyper(&request_id);
        }
    };

    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or("").to_string();
    let ctx = base_ctx.with_request_id(request_id.clone());

    let request = RequestContext::new(
        parts.method,
        path,
        query,
        parts.headers,
        body,
        ctx,
        request_id.clone(),
    );

    app.dispatch(request).await.into_hyper(&request_id)
}
