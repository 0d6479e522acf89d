use super::{Address, SafeFuture, Transport};
use crate::settings::Settings;
use crate::{Error, Result};

use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Listens on an ephemeral port of `listener_ip`; addresses are `ip:port` strings.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    listener_ip: IpAddr,
}

impl TcpTransport {
    pub fn new(listener_ip: IpAddr) -> Self {
        TcpTransport { listener_ip }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(TcpTransport::new(settings.listener_ip()?))
    }
}

impl Transport for TcpTransport {
    type Listener = TcpListener;
    type Stream = TcpStream;

    fn open(&self) -> SafeFuture<'_, Result<(TcpListener, Address)>> {
        let ip = SocketAddr::new(self.listener_ip, 0);
        Box::pin(async move {
            let listener = TcpListener::bind(ip).await?;
            let address = Address::new(listener.local_addr()?.to_string());
            Ok((listener, address))
        })
    }

    fn accept<'a>(&'a self, listener: &'a mut TcpListener) -> SafeFuture<'a, Result<TcpStream>> {
        Box::pin(async move {
            let (stream, peer) = listener.accept().await?;
            debug!("accepted tcp connection from {:?}", peer);
            // handshake payloads are a few bytes each
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }

    fn connect<'a>(&'a self, address: &'a Address) -> SafeFuture<'a, Result<TcpStream>> {
        Box::pin(async move {
            let ip: SocketAddr =
                address.as_str().parse().map_err(|_| Error::InvalidAddress(address.to_string()))?;
            let stream = TcpStream::connect(ip).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }

    fn close(&self, listener: TcpListener, address: &Address) -> Result<()> {
        drop(listener);
        debug!("closed tcp listener {}", address);
        Ok(())
    }
}
