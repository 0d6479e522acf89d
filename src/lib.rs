//! Rank-addressed rendezvous connections between two independently launched
//! groups of processes.
//!
//! Acceptors publish the address of a listening endpoint in a shared directory,
//! requesters resolve it and connect, and a short integer handshake maps every
//! remote process to its logical rank. The result is a [`manager::ConnectionManager`]
//! holding one [`channel::Channel`] per remote rank.

extern crate colored;

pub mod channel;
pub mod exchange;
pub mod manager;
pub mod settings;
pub mod transport;

/// Logical position of a process within its group.
pub type Rank = i32;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Config(config::ConfigError),

    // channel errors
    ChannelError(String),
    /// The remote end closed the channel before the expected integer arrived.
    PeerHungUp,
    /// An endpoint address the transport cannot interpret.
    InvalidAddress(String),

    // API misuse
    AlreadyConnected,
    NotConnected,
    RankNotRegistered(Rank),

    // handshake validation
    InvalidPeerGroupSize(i32),
    InconsistentPeerGroupSize { expected: usize, declared: usize },
    DuplicateRank(Rank),
    InvalidRank(Rank),
}

impl Error {
    /// Misuse of a connection manager's API, as opposed to a runtime condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::AlreadyConnected | Error::NotConnected | Error::RankNotRegistered(_))
    }

    /// Bad coordination between the two groups, detected during the handshake.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidPeerGroupSize(_)
                | Error::InconsistentPeerGroupSize { .. }
                | Error::DuplicateRank(_)
                | Error::InvalidRank(_)
        )
    }
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidPeerGroupSize(size) => {
                write!(f, "requester group size has to be > 0, got {}", size)
            }
            Error::InconsistentPeerGroupSize { expected, declared } => write!(
                f,
                "requester group sizes are inconsistent: expected {}, got {}",
                expected, declared
            ),
            Error::DuplicateRank(rank) => {
                write!(f, "duplicate request to connect by same rank ({})", rank)
            }
            Error::InvalidRank(rank) => write!(f, "rank has to be >= 0, got {}", rank),
            Error::RankNotRegistered(rank) => write!(f, "no channel registered for rank {}", rank),
            err => write!(f, "{:?}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
