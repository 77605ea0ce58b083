// Layer 1: Standard library imports
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

// Layer 3: Internal module imports
use crate::errors::NetError;
use fluxor_rt::context::FluxorContext;
use fluxor_rt::util::RequestId;

/// Object-safe byte stream; TCP and TLS streams both satisfy this.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Boxed connection stream handed to handlers.
pub type ConnStream = Box<dyn AsyncStream>;

/// Listener seam for the accept loop.
///
/// [`TcpAcceptor`] is the plain implementation; a TLS acceptor wraps the
/// accepted stream before boxing it and everything downstream is identical.
#[async_trait]
pub trait Acceptor: Send + Sync + 'static {
    /// Accept one connection.
    async fn accept(&self) -> io::Result<(ConnStream, SocketAddr)>;

    /// The bound local address.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Plain TCP listener.
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind a listener on `addr`.
    pub async fn bind(addr: &str) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| NetError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&self) -> io::Result<(ConnStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((Box::new(stream), peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Per-connection state handed to a [`ConnHandler`].
///
/// Reads and writes go through deadline-wrapped helpers; the deadlines
/// default from the server options and can be adjusted per connection.
pub struct ConnContext {
    stream: ConnStream,
    peer: SocketAddr,
    ctx: FluxorContext,
    request_id: RequestId,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ConnContext {
    pub(crate) fn new(
        stream: ConnStream,
        peer: SocketAddr,
        ctx: FluxorContext,
        request_id: RequestId,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            peer,
            ctx,
            request_id,
            read_timeout,
            write_timeout,
        }
    }

    /// The remote peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The per-connection request id (also set on `self.context()`).
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Runtime services scoped to this connection.
    pub fn context(&self) -> &FluxorContext {
        &self.ctx
    }

    /// Adjust the read deadline.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Adjust the write deadline.
    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    /// Read into `buf` under the read deadline. Returns the bytes read
    /// (zero at EOF).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        match tokio::time::timeout(self.read_timeout, self.stream.read(buf)).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(NetError::ReadTimeout {
                timeout: self.read_timeout,
            }),
        }
    }

    /// Write all of `buf` under the write deadline.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), NetError> {
        match tokio::time::timeout(self.write_timeout, self.stream.write_all(buf)).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(NetError::WriteTimeout {
                timeout: self.write_timeout,
            }),
        }
    }

    /// Flush and shut the write side down.
    pub async fn shutdown(&mut self) -> Result<(), NetError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Take the raw stream (used by protocol drivers like the HTTP front).
    pub fn into_parts(self) -> (ConnStream, SocketAddr, FluxorContext) {
        (self.stream, self.peer, self.ctx)
    }
}

/// User handler for an admitted TCP connection.
///
/// Runs on a pool worker. Panics are recovered by the worker wrapper; the
/// connection is closed and counters updated on every exit path.
#[async_trait]
pub trait ConnHandler: Send + Sync + 'static {
    /// Handle one connection for its whole lifetime.
    async fn handle(&self, conn: ConnContext) -> Result<(), NetError>;
}
