use crate::{Error, Result};

use futures::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serde::formats::SymmetricalBincode;
use tokio_serde::SymmetricallyFramed;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// A byte stream framed as length-delimited, bincode-encoded integers.
pub type IntFramed<S> = SymmetricallyFramed<Framed<S, LengthDelimitedCodec>, i32, SymmetricalBincode<i32>>;

// Framing and decoding failures surface as these kinds; everything else comes
// from the stream itself.
fn channel_error(error: std::io::Error) -> Error {
    use std::io::ErrorKind;
    match error.kind() {
        ErrorKind::InvalidData | ErrorKind::UnexpectedEof | ErrorKind::Other => {
            Error::ChannelError(format!("{}", error))
        }
        _ => Error::IO(error),
    }
}

/// A bidirectional connection to exactly one remote process.
pub struct Channel<S> {
    framed: IntFramed<S>,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn wrap(stream: S) -> Channel<S> {
        let framed = Framed::new(stream, LengthDelimitedCodec::new());
        Channel { framed: SymmetricallyFramed::new(framed, SymmetricalBincode::default()) }
    }

    /// Sends a single integer and waits until it has been flushed to the stream.
    pub async fn send_int(&mut self, value: i32) -> Result<()> {
        self.framed.send(value).await.map_err(channel_error)
    }

    /// Waits for the next integer. Fails with [`Error::PeerHungUp`] if the remote
    /// closed the channel first.
    pub async fn recv_int(&mut self) -> Result<i32> {
        match self.framed.try_next().await.map_err(channel_error)? {
            Some(value) => Ok(value),
            None => Err(Error::PeerHungUp),
        }
    }

    /// Flushes pending writes and shuts the stream down.
    pub async fn disconnect(mut self) -> Result<()> {
        self.framed.close().await.map_err(channel_error)
    }
}
