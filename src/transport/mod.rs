//! Point-to-point transports a [`ConnectionManager`](crate::manager::ConnectionManager)
//! establishes its channels over.
//!
//! A transport only knows how to open, accept on and close listening endpoints and
//! how to connect to them. The integer handshake runs over the byte streams it
//! hands out, wrapped in a [`Channel`](crate::channel::Channel).

pub mod memory;
pub mod tcp;

pub use memory::{MemoryListener, MemoryTransport};
pub use tcp::TcpTransport;

use crate::Result;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// Future type that can be safely held across `.await` boundaries
/// and is compatible with Tokio
pub type SafeFuture<'a, Out> = Pin<Box<dyn Send + Future<Output = Out> + 'a>>;

/// Opaque address of a listening endpoint, meaningful only to the transport which
/// opened it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Address(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Address(address)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Address(address.to_string())
    }
}

pub trait Transport: Sync + Send {
    type Listener: Send;
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    // === async fn open(&self) -> Result<(Self::Listener, Address)>;
    fn open(&self) -> SafeFuture<'_, Result<(Self::Listener, Address)>>;

    /// Waits for the next inbound connection on `listener`.
    fn accept<'a>(&'a self, listener: &'a mut Self::Listener) -> SafeFuture<'a, Result<Self::Stream>>;

    fn connect<'a>(&'a self, address: &'a Address) -> SafeFuture<'a, Result<Self::Stream>>;

    /// Closes a listening endpoint. Connections accepted on it stay open.
    fn close(&self, listener: Self::Listener, address: &Address) -> Result<()>;
}
