//! TCP server front: accept loop, admission, bounded hand-off to workers.
//!
//! The server imposes accept/admit/deadline policy only; the byte-stream
//! protocol is the handler's business.

mod conn;
mod server;

pub use conn::{Acceptor, ConnContext, ConnHandler, ConnStream, TcpAcceptor};
pub use server::{TcpServer, TcpServerOptions};
