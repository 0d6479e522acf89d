use super::{Address, SafeFuture, Transport};
use crate::Result;

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of each direction of an in-memory connection.
const BUFFER_SIZE: usize = 4096;

/// In-process transport. Clones share the same set of endpoints, so managers in
/// different tasks can reach each other.
///
/// Every opened and closed endpoint and every connection attempt is recorded, in
/// order, for inspection by tests and benchmarks.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    registry: Arc<Mutex<Registry>>,
}

#[derive(Debug, Default)]
struct Registry {
    next_endpoint: u64,
    endpoints: HashMap<Address, mpsc::UnboundedSender<DuplexStream>>,
    opened: Vec<Address>,
    closed: Vec<Address>,
    connect_log: Vec<Address>,
}

#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Endpoints opened so far, in order.
    pub fn opened(&self) -> Vec<Address> {
        self.registry().opened.clone()
    }

    /// Endpoints closed so far, in order.
    pub fn closed(&self) -> Vec<Address> {
        self.registry().closed.clone()
    }

    /// Addresses of every connection attempt, in order, including refused ones.
    pub fn connect_log(&self) -> Vec<Address> {
        self.registry().connect_log.clone()
    }

    fn open_endpoint(&self) -> (MemoryListener, Address) {
        let mut registry = self.registry();
        registry.next_endpoint += 1;
        let address = Address::new(format!("memory://{}", registry.next_endpoint));
        let (sender, incoming) = mpsc::unbounded_channel();
        registry.endpoints.insert(address.clone(), sender);
        registry.opened.push(address.clone());
        (MemoryListener { incoming }, address)
    }

    fn connect_endpoint(&self, address: &Address) -> Result<DuplexStream> {
        let mut registry = self.registry();
        registry.connect_log.push(address.clone());
        let refused = || io::Error::new(io::ErrorKind::ConnectionRefused, address.to_string());
        let sender = registry.endpoints.get(address).ok_or_else(refused)?;
        let (local, remote) = tokio::io::duplex(BUFFER_SIZE);
        sender.send(remote).map_err(|_| refused())?;
        Ok(local)
    }
}

impl Transport for MemoryTransport {
    type Listener = MemoryListener;
    type Stream = DuplexStream;

    fn open(&self) -> SafeFuture<'_, Result<(MemoryListener, Address)>> {
        Box::pin(future::ready(Ok(self.open_endpoint())))
    }

    fn accept<'a>(&'a self, listener: &'a mut MemoryListener) -> SafeFuture<'a, Result<DuplexStream>> {
        Box::pin(async move {
            match listener.incoming.recv().await {
                Some(stream) => Ok(stream),
                None => Err(io::Error::new(io::ErrorKind::NotConnected, "endpoint closed").into()),
            }
        })
    }

    fn connect<'a>(&'a self, address: &'a Address) -> SafeFuture<'a, Result<DuplexStream>> {
        Box::pin(future::ready(self.connect_endpoint(address)))
    }

    fn close(&self, listener: MemoryListener, address: &Address) -> Result<()> {
        let mut registry = self.registry();
        registry.endpoints.remove(address);
        registry.closed.push(address.clone());
        drop(listener);
        debug!("closed memory endpoint {}", address);
        Ok(())
    }
}
