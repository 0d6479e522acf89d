use super::AddressStore;
use crate::settings::Settings;
use crate::transport::{Address, SafeFuture};
use crate::Result;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

/// Stores every key as a file of the same name holding the address.
#[derive(Debug, Clone)]
pub struct FileAddressStore {
    poll_interval: Duration,
}

impl FileAddressStore {
    /// `poll_interval` is how long [`resolve`](AddressStore::resolve) sleeps between
    /// looking for a key that is not published yet.
    pub fn new(poll_interval: Duration) -> Self {
        FileAddressStore { poll_interval }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        FileAddressStore::new(settings.resolve_poll_interval())
    }
}

impl Default for FileAddressStore {
    fn default() -> Self {
        FileAddressStore::new(Duration::from_millis(100))
    }
}

impl AddressStore for FileAddressStore {
    fn publish(&self, directory: &Path, key: &str, address: &Address) -> Result<()> {
        fs::create_dir_all(directory)?;
        // written aside and renamed so a resolver never reads a partial address
        let staged = directory.join(format!("{}~", key));
        fs::write(&staged, address.as_str())?;
        fs::rename(&staged, directory.join(key))?;
        debug!("published {} at {}", key, address);
        Ok(())
    }

    fn resolve<'a>(&'a self, directory: &'a Path, key: &'a str) -> SafeFuture<'a, Result<Address>> {
        let path = directory.join(key);
        let poll_interval = self.poll_interval;
        Box::pin(async move {
            loop {
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) if !content.trim().is_empty() => {
                        let address = Address::new(content.trim());
                        debug!("resolved {} to {}", key, address);
                        return Ok(address);
                    }
                    Ok(_) => (),
                    Err(err) if err.kind() == ErrorKind::NotFound => (),
                    Err(err) => return Err(err.into()),
                }
                tokio::time::sleep(poll_interval).await;
            }
        })
    }

    fn withdraw(&self, directory: &Path, key: &str) -> Result<()> {
        match fs::remove_file(directory.join(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{address_key, ScopedPublication};

    const POLL: Duration = Duration::from_millis(5);

    #[actix_rt::test]
    async fn publish_then_resolve() {
        let directory = tempfile::tempdir().unwrap();
        let store = FileAddressStore::new(POLL);
        let key = address_key("A", "B", None);

        store.publish(directory.path(), &key, &Address::from("127.0.0.1:4000")).unwrap();
        let address = store.resolve(directory.path(), &key).await.unwrap();
        assert_eq!(address, Address::from("127.0.0.1:4000"));
        assert!(directory.path().join(".B-A.address").exists());
    }

    #[actix_rt::test]
    async fn resolve_waits_for_publication() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().to_path_buf();

        let resolver = tokio::spawn(async move {
            FileAddressStore::new(POLL).resolve(&path, ".B-A-2.address").await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let store = FileAddressStore::new(POLL);
        store.publish(directory.path(), ".B-A-2.address", &Address::from("memory://7")).unwrap();

        assert_eq!(resolver.await.unwrap(), Address::from("memory://7"));
    }

    #[actix_rt::test]
    async fn publish_creates_missing_directory() {
        let directory = tempfile::tempdir().unwrap();
        let nested = directory.path().join("exchange").join("run-1");
        let store = FileAddressStore::new(POLL);

        store.publish(&nested, ".B-A.address", &Address::from("memory://1")).unwrap();
        assert_eq!(store.resolve(&nested, ".B-A.address").await.unwrap(), Address::from("memory://1"));
    }

    #[test]
    fn withdraw_ignores_absent_keys() {
        let directory = tempfile::tempdir().unwrap();
        let store = FileAddressStore::new(POLL);

        store.withdraw(directory.path(), ".never-published.address").unwrap();
        store.publish(directory.path(), ".B-A.address", &Address::from("x")).unwrap();
        store.withdraw(directory.path(), ".B-A.address").unwrap();
        assert!(!directory.path().join(".B-A.address").exists());
    }

    #[test]
    fn scoped_publication_withdraws_on_drop() {
        let directory = tempfile::tempdir().unwrap();
        let store = FileAddressStore::new(POLL);
        let path = directory.path().join(".B-A-0.address");
        {
            let publication = ScopedPublication::publish(
                &store,
                directory.path(),
                ".B-A-0.address",
                &Address::from("memory://3"),
            )
            .unwrap();
            assert_eq!(publication.key(), ".B-A-0.address");
            assert_eq!(fs::read_to_string(&path).unwrap(), "memory://3");
        }
        assert!(!path.exists());
    }
}
