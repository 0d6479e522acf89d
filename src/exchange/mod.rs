//! Out-of-band exchange of endpoint addresses.
//!
//! Acceptors publish the address of their listening endpoint under a well-known
//! key, requesters resolve it. Keys live in a directory shared by both groups; the
//! directory is passed to every call rather than held as process-wide state.

pub mod file;

pub use file::FileAddressStore;

use crate::transport::{Address, SafeFuture};
use crate::{Rank, Result};

use std::path::Path;

use tracing::warn;

pub const ADDRESS_SUFFIX: &str = ".address";

/// Key an acceptor publishes its address under.
///
/// `.<requester>-<acceptor>.address` when the acceptor group has a single
/// endpoint, `.<requester>-<acceptor>-<rank>.address` when every acceptor rank
/// opens its own.
pub fn address_key(acceptor_name: &str, requester_name: &str, acceptor_rank: Option<Rank>) -> String {
    match acceptor_rank {
        Some(rank) => format!(".{}-{}-{}{}", requester_name, acceptor_name, rank, ADDRESS_SUFFIX),
        None => format!(".{}-{}{}", requester_name, acceptor_name, ADDRESS_SUFFIX),
    }
}

pub trait AddressStore: Sync + Send {
    fn publish(&self, directory: &Path, key: &str, address: &Address) -> Result<()>;

    /// Waits until `key` has been published and returns its address.
    fn resolve<'a>(&'a self, directory: &'a Path, key: &'a str) -> SafeFuture<'a, Result<Address>>;

    /// Removes a published key. Withdrawing an absent key is not an error.
    fn withdraw(&self, directory: &Path, key: &str) -> Result<()>;
}

/// A publication which is withdrawn again when dropped.
pub struct ScopedPublication<'a, A: AddressStore + ?Sized> {
    store: &'a A,
    directory: &'a Path,
    key: String,
}

impl<'a, A: AddressStore + ?Sized> ScopedPublication<'a, A> {
    pub fn publish(store: &'a A, directory: &'a Path, key: &str, address: &Address) -> Result<Self> {
        store.publish(directory, key, address)?;
        Ok(ScopedPublication { store, directory, key: key.to_string() })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<'a, A: AddressStore + ?Sized> Drop for ScopedPublication<'a, A> {
    fn drop(&mut self) {
        if let Err(err) = self.store.withdraw(self.directory, &self.key) {
            warn!("failed to withdraw {}: {}", self.key, err);
        }
    }
}
