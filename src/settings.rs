use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

// For explanation, see issue: https://github.com/serde-rs/serde/issues/368
fn default_address_directory() -> PathBuf {
    PathBuf::from(".")
}
fn default_listener_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Directory shared by both groups in which addresses are exchanged.
    #[serde(default = "default_address_directory")]
    pub address_directory: PathBuf,
    /// IP the TCP transport opens its listening endpoints on.
    #[serde(default = "default_listener_ip")]
    pub listener_ip: String,
    #[serde(default = "default_poll_interval_ms")]
    pub resolve_poll_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

const ENV_PREFIX: &str = "RENDEZVOUS";

impl Default for Settings {
    fn default() -> Self {
        Settings {
            address_directory: default_address_directory(),
            listener_ip: default_listener_ip(),
            resolve_poll_interval_ms: default_poll_interval_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Built-in defaults, overridden by `config_file` if given, overridden by
    /// `RENDEZVOUS_*` environment variables.
    pub fn new(config_file: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }
        builder.add_source(Environment::with_prefix(ENV_PREFIX)).build()?.try_deserialize()
    }

    pub fn listener_ip(&self) -> Result<IpAddr> {
        self.listener_ip.parse().map_err(|_| Error::InvalidAddress(self.listener_ip.clone()))
    }

    pub fn resolve_poll_interval(&self) -> Duration {
        Duration::from_millis(self.resolve_poll_interval_ms)
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.address_directory, PathBuf::from("."));
        assert_eq!(settings.listener_ip().unwrap(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(settings.resolve_poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn file_overrides_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("rendezvous.json");
        std::fs::write(
            &path,
            r#"{ "address_directory": "/shared/run-7", "resolve_poll_interval_ms": 5, "log_level": "debug" }"#,
        )
        .unwrap();

        let settings = Settings::new(Some(&path)).unwrap();
        assert_eq!(settings.address_directory, PathBuf::from("/shared/run-7"));
        assert_eq!(settings.resolve_poll_interval(), Duration::from_millis(5));
        assert_eq!(settings.log_level(), tracing::Level::DEBUG);
        assert_eq!(settings.listener_ip, "127.0.0.1");
    }

    #[test]
    fn invalid_listener_ip() {
        let settings = Settings { listener_ip: "localhost:80".to_string(), ..Settings::default() };
        match settings.listener_ip() {
            Err(Error::InvalidAddress(ip)) => assert_eq!(ip, "localhost:80"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
