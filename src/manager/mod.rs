//! Connection establishment between an acceptor group and a requester group.
//!
//! A [`ConnectionManager`] performs one of four handshakes and ends up with one
//! channel per remote rank:
//!
//! | acceptor side                                  | requester side                           |
//! |------------------------------------------------|------------------------------------------|
//! | [`accept_unbounded`](ConnectionManager::accept_unbounded)     | [`connect_single`](ConnectionManager::connect_single) |
//! | [`accept_known_group`](ConnectionManager::accept_known_group) | [`connect_fanout`](ConnectionManager::connect_fanout) |
//!
//! In the unbounded handshake the requester sends its rank and the size of its
//! group and the acceptor answers with its own rank. In the known-group handshake
//! every acceptor rank opens its own endpoint and requesters only send their rank.

mod rank_map;


pub use rank_map::RankMap;

use crate::channel::Channel;
use crate::exchange::{address_key, AddressStore, FileAddressStore, ScopedPublication};
use crate::settings::Settings;
use crate::transport::{Address, Transport};
use crate::{Error, Rank, Result};

use crate::colored::Colorize;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

/// Rank the single channel of [`ConnectionManager::connect_single`] is registered
/// under, whatever rank the acceptor reports.
pub const SINGLE_ACCEPTOR_RANK: Rank = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A handshake is in progress. Channels accepted so far are not visible yet.
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened a listening endpoint and owns it until teardown.
    Acceptor,
    Requester,
}

/// Progress of an accept loop whose total is only known after the first
/// connection declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptPhase {
    AwaitingFirst,
    AwaitingMore { expected: usize },
    Done,
}

impl AcceptPhase {
    /// Checks a declared group size against the size fixed so far and returns the
    /// expected total.
    fn expect(self, declared: usize) -> Result<usize> {
        match self {
            AcceptPhase::AwaitingMore { expected } if expected != declared => {
                Err(Error::InconsistentPeerGroupSize { expected, declared })
            }
            AcceptPhase::AwaitingMore { expected } => Ok(expected),
            AcceptPhase::AwaitingFirst | AcceptPhase::Done => Ok(declared),
        }
    }

    fn after(expected: usize, registered: usize) -> AcceptPhase {
        if registered >= expected {
            AcceptPhase::Done
        } else {
            AcceptPhase::AwaitingMore { expected }
        }
    }
}

fn group_size(declared: i32) -> Result<usize> {
    if declared > 0 {
        Ok(declared as usize)
    } else {
        Err(Error::InvalidPeerGroupSize(declared))
    }
}

struct Endpoint<L> {
    listener: L,
    address: Address,
}

enum AcceptHandshake {
    Unbounded { acceptor_rank: Rank },
    Known { expected: usize },
}

/// Owns the channels to every rank of one remote group, and the listening
/// endpoint when acting as acceptor.
///
/// Each entry point may only be called while disconnected. Dropping a manager
/// that was not closed releases its channels and endpoint without flushing them.
pub struct ConnectionManager<T: Transport, A: AddressStore> {
    transport: T,
    store: A,
    address_directory: PathBuf,
    state: ConnectionState,
    role: Option<Role>,
    endpoint: Option<Endpoint<T::Listener>>,
    channels: RankMap<Channel<T::Stream>>,
    reported_acceptor_rank: Option<Rank>,
}

impl<T: Transport> ConnectionManager<T, FileAddressStore> {
    pub fn from_settings(transport: T, settings: &Settings) -> Self {
        ConnectionManager::new(
            transport,
            FileAddressStore::from_settings(settings),
            settings.address_directory.clone(),
        )
    }
}

impl<T: Transport, A: AddressStore> ConnectionManager<T, A> {
    /// An empty `address_directory` means the current directory.
    pub fn new(transport: T, store: A, address_directory: impl Into<PathBuf>) -> Self {
        let mut address_directory = address_directory.into();
        if address_directory.as_os_str().is_empty() {
            address_directory = PathBuf::from(".");
        }
        ConnectionManager {
            transport,
            store,
            address_directory,
            state: ConnectionState::Disconnected,
            role: None,
            endpoint: None,
            channels: RankMap::new(),
            reported_acceptor_rank: None,
        }
    }

    /// Accepts connections from every rank of the requester group, whose size is
    /// declared by the requesters themselves.
    ///
    /// The first connection fixes the group size; every later connection has to
    /// declare the same size and a rank not seen before.
    #[instrument(skip(self), fields(directory = %self.address_directory.display()))]
    pub async fn accept_unbounded(
        &mut self,
        acceptor_name: &str,
        requester_name: &str,
        acceptor_rank: Rank,
    ) -> Result<()> {
        self.begin(Role::Acceptor)?;
        let key = address_key(acceptor_name, requester_name, None);
        let established = self.listen(&key, AcceptHandshake::Unbounded { acceptor_rank }).await;
        self.complete(established)
    }

    /// Accepts exactly `requester_group_size` connections on an endpoint of this
    /// acceptor rank. Requesters only send their rank.
    #[instrument(skip(self), fields(directory = %self.address_directory.display()))]
    pub async fn accept_known_group(
        &mut self,
        acceptor_name: &str,
        requester_name: &str,
        acceptor_rank: Rank,
        requester_group_size: i32,
    ) -> Result<()> {
        let expected = group_size(requester_group_size)?;
        self.begin(Role::Acceptor)?;
        let key = address_key(acceptor_name, requester_name, Some(acceptor_rank));
        let established = self.listen(&key, AcceptHandshake::Known { expected }).await;
        self.complete(established)
    }

    /// Connects to the single endpoint of the acceptor group.
    ///
    /// The channel is registered under [`SINGLE_ACCEPTOR_RANK`]; the rank the
    /// acceptor answered with is available from
    /// [`reported_acceptor_rank`](Self::reported_acceptor_rank).
    #[instrument(skip(self), fields(directory = %self.address_directory.display()))]
    pub async fn connect_single(
        &mut self,
        acceptor_name: &str,
        requester_name: &str,
        requester_rank: Rank,
        requester_group_size: i32,
    ) -> Result<()> {
        self.begin(Role::Requester)?;
        let key = address_key(acceptor_name, requester_name, None);
        let established = self.request_single(&key, requester_rank, requester_group_size).await;
        self.complete(established)
    }

    /// Connects to the endpoint of every rank in `acceptor_ranks`, in ascending rank
    /// order, and registers each channel under its acceptor rank.
    #[instrument(skip(self, acceptor_ranks), fields(directory = %self.address_directory.display()))]
    pub async fn connect_fanout<I>(
        &mut self,
        acceptor_name: &str,
        requester_name: &str,
        acceptor_ranks: I,
        requester_rank: Rank,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Rank>,
    {
        let targets: BTreeSet<Rank> = acceptor_ranks.into_iter().collect();
        self.begin(Role::Requester)?;
        let established =
            self.request_fanout(acceptor_name, requester_name, &targets, requester_rank).await;
        self.complete(established)
    }

    /// Disconnects every channel and closes the listening endpoint, if any.
    ///
    /// Does nothing when already disconnected. A failing disconnect does not stop
    /// the teardown of the other channels; the first failure is returned once
    /// the manager is disconnected.
    #[instrument(skip(self), fields(channels = self.channels.len()))]
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        let mut first_error = None;
        for (rank, channel) in self.channels.drain() {
            if let Err(err) = channel.disconnect().await {
                warn!("[{}] disconnecting rank {} failed: {}", "close".yellow(), rank, err);
                first_error.get_or_insert(err);
            }
        }
        debug!("[{}] disconnected", "close".yellow());
        if let Err(err) = self.close_endpoint() {
            first_error.get_or_insert(err);
        }
        self.reported_acceptor_rank = None;
        self.state = ConnectionState::Disconnected;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The channel to remote `rank`. Never registers a rank that is absent.
    pub fn channel_for(&mut self, rank: Rank) -> Result<&mut Channel<T::Stream>> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        self.channels.get_mut(rank).ok_or(Error::RankNotRegistered(rank))
    }

    /// Number of remote ranks connected to.
    pub fn remote_group_size(&self) -> Result<usize> {
        if self.state != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        Ok(self.channels.len())
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Role of the last establishment, `None` before the first one.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Connected remote ranks in ascending order.
    pub fn ranks(&self) -> Vec<Rank> {
        self.channels.ranks().collect()
    }

    /// Rank the acceptor answered with during [`connect_single`](Self::connect_single).
    pub fn reported_acceptor_rank(&self) -> Option<Rank> {
        self.reported_acceptor_rank
    }

    /// Address of the listening endpoint while acting as acceptor.
    pub fn listening_address(&self) -> Option<&Address> {
        self.endpoint.as_ref().map(|endpoint| &endpoint.address)
    }

    pub fn address_directory(&self) -> &Path {
        &self.address_directory
    }

    fn begin(&mut self, role: Role) -> Result<()> {
        match self.state {
            ConnectionState::Connected => return Err(Error::AlreadyConnected),
            // an earlier establishment was abandoned half way
            ConnectionState::Connecting => self.release(),
            ConnectionState::Disconnected => (),
        }
        self.role = Some(role);
        self.reported_acceptor_rank = None;
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    fn complete(&mut self, established: Result<RankMap<Channel<T::Stream>>>) -> Result<()> {
        match established {
            Ok(channels) => {
                info!("[{}] connected to ranks {:?}", "connect".yellow(), channels);
                self.channels = channels;
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                warn!("[{}] establishment aborted: {}", "connect".yellow(), err);
                self.release();
                Err(err)
            }
        }
    }

    async fn listen(
        &mut self,
        key: &str,
        handshake: AcceptHandshake,
    ) -> Result<RankMap<Channel<T::Stream>>> {
        let (listener, address) = self.transport.open().await?;
        let endpoint = self.endpoint.insert(Endpoint { listener, address });
        let _publication =
            ScopedPublication::publish(&self.store, &self.address_directory, key, &endpoint.address)?;
        info!("[{}] accepting connections at {} ({})", "accept".yellow(), endpoint.address, key);

        match handshake {
            AcceptHandshake::Unbounded { acceptor_rank } => {
                accept_unbounded_loop(&self.transport, &mut endpoint.listener, acceptor_rank).await
            }
            AcceptHandshake::Known { expected } => {
                accept_known_loop(&self.transport, &mut endpoint.listener, expected).await
            }
        }
    }

    async fn request_single(
        &mut self,
        key: &str,
        requester_rank: Rank,
        requester_group_size: i32,
    ) -> Result<RankMap<Channel<T::Stream>>> {
        let address = self.store.resolve(&self.address_directory, key).await?;
        debug!("[{}] requesting connection to {}", "request".yellow(), address);
        let mut channel = Channel::wrap(self.transport.connect(&address).await?);

        channel.send_int(requester_rank).await?;
        channel.send_int(requester_group_size).await?;
        let acceptor_rank = channel.recv_int().await?;
        debug!("[{}] connected to {} answering as rank {}", "request".yellow(), address, acceptor_rank);
        self.reported_acceptor_rank = Some(acceptor_rank);

        let mut channels = RankMap::new();
        channels.register(SINGLE_ACCEPTOR_RANK, channel)?;
        Ok(channels)
    }

    async fn request_fanout(
        &self,
        acceptor_name: &str,
        requester_name: &str,
        targets: &BTreeSet<Rank>,
        requester_rank: Rank,
    ) -> Result<RankMap<Channel<T::Stream>>> {
        let mut channels = RankMap::new();
        for &acceptor_rank in targets.iter() {
            let key = address_key(acceptor_name, requester_name, Some(acceptor_rank));
            let address = self.store.resolve(&self.address_directory, &key).await?;
            debug!("[{}] requesting connection to rank {} at {}", "request".yellow(), acceptor_rank, address);
            let mut channel = Channel::wrap(self.transport.connect(&address).await?);
            channel.send_int(requester_rank).await?;
            channels.register(acceptor_rank, channel)?;
        }
        Ok(channels)
    }

    fn close_endpoint(&mut self) -> Result<()> {
        match self.endpoint.take() {
            Some(Endpoint { listener, address }) => {
                self.transport.close(listener, &address)?;
                debug!("[{}] endpoint {} closed", "close".yellow(), address);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Teardown without flushing, for paths that cannot await.
    fn release(&mut self) {
        let dropped = self.channels.drain().count();
        if let Err(err) = self.close_endpoint() {
            warn!("[{}] closing endpoint failed: {}", "close".yellow(), err);
        }
        debug!("[{}] released {} channels", "close".yellow(), dropped);
        self.reported_acceptor_rank = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl<T: Transport, A: AddressStore> Drop for ConnectionManager<T, A> {
    fn drop(&mut self) {
        if self.state != ConnectionState::Disconnected {
            warn!("[{}] connection manager dropped while {:?}", "close".yellow(), self.state);
            self.release();
        }
    }
}

async fn accept_unbounded_loop<T: Transport>(
    transport: &T,
    listener: &mut T::Listener,
    acceptor_rank: Rank,
) -> Result<RankMap<Channel<T::Stream>>> {
    let mut channels = RankMap::new();
    let mut phase = AcceptPhase::AwaitingFirst;
    while phase != AcceptPhase::Done {
        let mut channel = Channel::wrap(transport.accept(listener).await?);
        let requester_rank = channel.recv_int().await?;
        let declared = channel.recv_int().await?;
        channel.send_int(acceptor_rank).await?;
        debug!(
            "[{}] accepted rank {} declaring a group of {}",
            "accept".yellow(),
            requester_rank,
            declared
        );

        let expected = phase.expect(group_size(declared)?)?;
        channels.register(requester_rank, channel)?;
        phase = AcceptPhase::after(expected, channels.len());
    }
    Ok(channels)
}

async fn accept_known_loop<T: Transport>(
    transport: &T,
    listener: &mut T::Listener,
    expected: usize,
) -> Result<RankMap<Channel<T::Stream>>> {
    let mut channels = RankMap::new();
    for connection in 0..expected {
        let mut channel = Channel::wrap(transport.accept(listener).await?);
        let requester_rank = channel.recv_int().await?;
        debug!(
            "[{}] accepted rank {} ({} of {})",
            "accept".yellow(),
            requester_rank,
            connection + 1,
            expected
        );
        channels.register(requester_rank, channel)?;
    }
    Ok(channels)
}
