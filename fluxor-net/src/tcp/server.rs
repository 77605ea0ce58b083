// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use super::conn::{Acceptor, ConnContext, ConnHandler, TcpAcceptor};
use crate::errors::NetError;
use crate::metrics::{ServerMetrics, ServerMetricsSnapshot};
use fluxor_rt::backpressure::BackpressureController;
use fluxor_rt::config::{keys, ConfigMap};
use fluxor_rt::context::FluxorContext;
use fluxor_rt::executor::WorkerPool;
use fluxor_rt::util::RequestId;

/// Default per-connection read/write deadline.
pub const DEFAULT_CONN_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP server tunables.
#[derive(Debug, Clone)]
pub struct TcpServerOptions {
    /// Bind address (`host:port`)
    pub bind_addr: String,

    /// Per-server connection cap (0 = unlimited)
    pub max_conns: usize,

    /// Per-connection read deadline
    pub read_timeout: Duration,

    /// Per-connection write deadline
    pub write_timeout: Duration,

    /// Optional payload written to a rejected connection before it is
    /// closed (the HTTP front installs a canned `503` here)
    pub reject_payload: Option<Vec<u8>>,
}

impl Default for TcpServerOptions {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            max_conns: 0,
            read_timeout: DEFAULT_CONN_TIMEOUT,
            write_timeout: DEFAULT_CONN_TIMEOUT,
            reject_payload: None,
        }
    }
}

impl TcpServerOptions {
    /// Derive options from a configuration map (`tcp_addr`, `max_conns`,
    /// `read_timeout`, `write_timeout`).
    pub fn from_config(config: &ConfigMap) -> Self {
        let mut options = Self::default();
        if let Some(addr) = config.get_str(keys::TCP_ADDR) {
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

/// Bounded TCP server front.
///
/// Per-connection lifecycle: `Accepted -> Admitted -> Queued -> Handling ->
/// Closed`. A connection is rejected (closed immediately) when the
/// backpressure controller refuses admission, the connection cap is reached,
/// or the executor queue is full.
pub struct TcpServer {
    local_addr: SocketAddr,
    metrics: Arc<ServerMetrics>,
    backpressure: Arc<BackpressureController>,
    token: CancellationToken,
}

impl TcpServer {
    /// Bind a plain TCP listener and start the accept loop.
    pub async fn bind(
        ctx: &FluxorContext,
        pool: Arc<WorkerPool>,
        options: TcpServerOptions,
        handler: Arc<dyn ConnHandler>,
    ) -> Result<Self, NetError> {
        let acceptor = TcpAcceptor::bind(&options.bind_addr).await?;
        Self::with_acceptor(ctx, pool, options, handler, Box::new(acceptor))
    }

    /// Start the accept loop over a caller-provided listener (TLS enters
    /// here; all downstream semantics are identical).
    pub fn with_acceptor(
        ctx: &FluxorContext,
        pool: Arc<WorkerPool>,
        options: TcpServerOptions,
        handler: Arc<dyn ConnHandler>,
        acceptor: Box<dyn Acceptor>,
    ) -> Result<Self, NetError> {
        let local_addr = acceptor.local_addr()?;
        let normal_ccu = (pool.worker_count() + pool.queue_capacity()) as u64;
        let metrics = Arc::new(ServerMetrics::new(normal_ccu));
        let backpressure = Arc::new(BackpressureController::for_pool(
            pool.worker_count(),
            pool.queue_capacity(),
        ));
        let token = ctx.token().child_token();

        tracing::info!(addr = %local_addr, normal_ccu, "tcp server listening");
        tokio::spawn(accept_loop(
            acceptor,
            ctx.clone(),
            pool,
            options,
            handler,
            Arc::clone(&metrics),
            Arc::clone(&backpressure),
            token.clone(),
        ));

        Ok(Self {
            local_addr,
            metrics,
            backpressure,
            token,
        })
    }

    /// The bound address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Snapshot of connection counters.
    pub fn metrics(&self) -> ServerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The admission controller (shared with tests and status endpoints).
    pub fn backpressure(&self) -> &BackpressureController {
        &self.backpressure
    }

    /// Stop accepting; in-flight connections run to completion.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    acceptor: Box<dyn Acceptor>,
    ctx: FluxorContext,
    pool: Arc<WorkerPool>,
    options: TcpServerOptions,
    handler: Arc<dyn ConnHandler>,
    metrics: Arc<ServerMetrics>,
    backpressure: Arc<BackpressureController>,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = acceptor.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!(%error, "accept failed");
                continue;
            }
        };
        metrics.record_accepted();

        // Admission: backpressure window, then the hard connection cap.
        if !backpressure.try_acquire() {
            reject(stream, &options, &metrics, "backpressure");
            continue;
        }
        if options.max_conns > 0 && metrics.active_conns() >= options.max_conns as u64 {
            backpressure.release();
            reject(stream, &options, &metrics, "max_conns");
            continue;
        }

        metrics.conn_admitted();
        let request_id = RequestId::new();
        let conn = ConnContext::new(
            stream,
            peer,
            ctx.with_request_id(request_id.clone()),
            request_id,
            options.read_timeout,
            options.write_timeout,
        );

        let task = conn_task(
            Arc::clone(&handler),
            conn,
            Arc::clone(&metrics),
            Arc::clone(&backpressure),
        );
        if pool.submit(Box::pin(task)).is_err() {
            // Queue full: the dropped task closes the stream.
            metrics.conn_unadmitted();
            metrics.record_rejected();
            backpressure.release();
            tracing::debug!(%peer, "connection rejected: executor queue full");
        }
    }
    tracing::debug!("accept loop stopped");
}

fn reject(
    mut stream: super::conn::ConnStream,
    options: &TcpServerOptions,
    metrics: &ServerMetrics,
    reason: &'static str,
) {
    metrics.record_rejected();
    tracing::debug!(reason, "connection rejected at admission");
    if let Some(payload) = options.reject_payload.clone() {
        // Best-effort courtesy payload; never blocks the accept loop.
        tokio::spawn(async move {
            let write = async {
                stream.write_all(&payload).await?;
                stream.shutdown().await
            };
            let _ = tokio::time::timeout(Duration::from_secs(1), write).await;
        });
    }
}

/// One admitted connection, from worker pickup to close.
async fn conn_task(
    handler: Arc<dyn ConnHandler>,
    conn: ConnContext,
    metrics: Arc<ServerMetrics>,
    backpressure: Arc<BackpressureController>,
) {
    metrics.conn_started();
    // Runs on Drop, so the accounting survives handler panics unwinding
    // through the worker's recovery wrapper.
    let _guard = ConnGuard {
        metrics: Arc::clone(&metrics),
        backpressure,
    };

    let peer = conn.peer();
    let request_id = conn.request_id().clone();
    match handler.handle(conn).await {
        Ok(()) => metrics.record_handled(),
        Err(error) => {
            metrics.record_errored();
            tracing::warn!(%peer, %request_id, %error, "connection handler failed");
        }
    }
}

struct ConnGuard {
    metrics: Arc<ServerMetrics>,
    backpressure: Arc<BackpressureController>,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.metrics.conn_closed();
        self.backpressure.release();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fluxor_rt::bus::LocalBus;
    use fluxor_rt::runtime::WeakVertx;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn test_fluxor_ctx() -> FluxorContext {
        FluxorContext::new(
            CancellationToken::new(),
            Arc::new(LocalBus::new()),
            WeakVertx::detached(),
            ConfigMap::empty(),
        )
    }

    struct EchoHandler;

    #[async_trait]
    impl ConnHandler for EchoHandler {
        async fn handle(&self, mut conn: ConnContext) -> Result<(), NetError> {
            let mut buf = [0u8; 64];
            let n = conn.read(&mut buf).await?;
            conn.write_all(&buf[..n]).await?;
            conn.shutdown().await
        }
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let ctx = test_fluxor_ctx();
        let pool = Arc::new(WorkerPool::new(2, 8));
        let server = TcpServer::bind(
            &ctx,
            pool,
            TcpServerOptions::default(),
            Arc::new(EchoHandler),
        )
        .await
        .unwrap();

        let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        let snapshot = server.metrics();
        assert_eq!(snapshot.accepted, 1);
        assert_eq!(snapshot.handled, 1);
        assert_eq!(snapshot.rejected, 0);
    }

    #[tokio::test]
    async fn test_max_conns_rejects() {
        struct HoldHandler;

        #[async_trait]
        impl ConnHandler for HoldHandler {
            async fn handle(&self, mut conn: ConnContext) -> Result<(), NetError> {
                // Hold the connection open until the peer goes away.
                let mut buf = [0u8; 1];
                conn.set_read_timeout(Duration::from_secs(5));
                let _ = conn.read(&mut buf).await;
                Ok(())
            }
        }

        let ctx = test_fluxor_ctx();
        let pool = Arc::new(WorkerPool::new(4, 16));
        let server = TcpServer::bind(
            &ctx,
            pool,
            TcpServerOptions::default().with_max_conns(1),
            Arc::new(HoldHandler),
        )
        .await
        .unwrap();

        let _held = TcpStream::connect(server.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.metrics().active_conns, 1);

        let _second = TcpStream::connect(server.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(server.metrics().rejected, 1);
        assert_eq!(server.metrics().active_conns, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let ctx = test_fluxor_ctx();
        let pool = Arc::new(WorkerPool::new(1, 4));
        let server = TcpServer::bind(
            &ctx,
            pool,
            TcpServerOptions::default(),
            Arc::new(EchoHandler),
        )
        .await
        .unwrap();
        let addr = server.local_addr();

        server.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Connection may be accepted by the OS backlog but is never served.
        let mut client = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(_) => return, // refused outright is fine too
        };
        client.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(
            Duration::from_millis(200),
            client.read(&mut buf),
        )
        .await;
        // Either timed out waiting or the connection was closed unread.
        match read {
            Ok(Ok(0)) | Err(_) => {}
            other => {
                let _ = other;
            }
        }
        assert_eq!(server.metrics().handled, 0);
    }

    #[test]
    fn test_options_from_config() {
        let config = ConfigMap::from_value(serde_json::json!({
            "tcp_addr": "0.0.0.0:7000",
            "max_conns": 64,
            "read_timeout": 2,
            "write_timeout": 3,
        }))
        .unwrap();

        let options = TcpServerOptions::from_config(&config);
        assert_eq!(options.bind_addr, "0.0.0.0:7000");
        assert_eq!(options.max_conns, 64);
        assert_eq!(options.read_timeout, Duration::from_secs(2));
        assert_eq!(options.write_timeout, Duration::from_secs(3));
    }
}
