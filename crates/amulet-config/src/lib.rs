//! # Amulet Configuration
//!
//! The runtime configuration snapshot: two upstream resolvers, the UDP
//! port, and the paths to the site map and TLS material.
//!
//! A snapshot is loaded once at startup and treated as immutable. Updates
//! arrive over the control channel, are validated against the filesystem,
//! and replace the published snapshot atomically; readers sample the
//! current snapshot at the start of each request and never observe a
//! half-applied update.

#![warn(clippy::all)]

use arc_swap::{ArcSwap, Guard};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub mod events;

pub use events::ControlEvent;

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading the config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file not found.
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// A field failed validation.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// What was wrong.
        message: String,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Runtime configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// First upstream resolver, tried before the secondary.
    pub upstream_primary: Ipv4Addr,

    /// Fallback upstream resolver.
    pub upstream_secondary: Ipv4Addr,

    /// Local UDP listen port.
    pub udp_port: u16,

    /// Hosts-style site map with block and override entries.
    pub map_file: PathBuf,

    /// TLS certificate for the DoH listener.
    pub cert_path: PathBuf,

    /// TLS private key for the DoH listener.
    pub key_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("amulet");

        Self {
            upstream_primary: Ipv4Addr::new(1, 1, 1, 1),
            upstream_secondary: Ipv4Addr::new(208, 67, 220, 220),
            udp_port: 53,
            map_file: config_dir.join("map.txt"),
            cert_path: config_dir.join("cert").join("server.crt"),
            key_path: config_dir.join("cert").join("server.key"),
        }
    }
}

impl Config {
    /// Loads a configuration snapshot from a JSON file.
    ///
    /// Upstream fields are typed `Ipv4Addr`, so a config with invalid
    /// literals fails here rather than at first use.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Validates the snapshot for use as a live update.
    ///
    /// The port must be a real port (the wire cannot express 65536 and 0
    /// means "any"); the map file and TLS material must be statable so an
    /// update cannot point the server at paths that do not exist.
    pub fn validate(&self) -> Result<()> {
        if self.udp_port == 0 || self.udp_port == u16::MAX {
            return Err(ConfigError::InvalidValue {
                field: "udp_port",
                message: format!("{} is outside (0, 65535)", self.udp_port),
            });
        }

        for (field, path) in [
            ("map_file", &self.map_file),
            ("cert_path", &self.cert_path),
            ("key_path", &self.key_path),
        ] {
            if std::fs::metadata(path).is_err() {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("{} is not statable", path.display()),
                });
            }
        }

        Ok(())
    }

    /// True when both TLS paths exist, i.e. the DoH listener can start.
    pub fn has_tls_material(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists()
    }
}

/// Shared handle to the current configuration snapshot.
///
/// Readers call [`ConfigHandle::load`] per request; the single writer (the
/// control event loop) goes through [`ConfigHandle::apply`], which refuses
/// invalid updates and leaves the current snapshot untouched.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<Config>>,
}

impl ConfigHandle {
    /// Wraps an initial snapshot.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Samples the current snapshot.
    pub fn load(&self) -> Guard<Arc<Config>> {
        self.inner.load()
    }

    /// Validates and publishes a new snapshot.
    pub fn apply(&self, config: Config) -> Result<()> {
        config.validate()?;
        self.inner.store(Arc::new(config));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn statable_config() -> (Config, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let touch = |name: &str| {
            let path = dir.path().join(name);
            std::fs::File::create(&path).unwrap();
            path
        };

        let config = Config {
            map_file: touch("map.txt"),
            cert_path: touch("server.crt"),
            key_path: touch("server.key"),
            ..Config::default()
        };
        (config, dir)
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.upstream_primary, Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(config.upstream_secondary, Ipv4Addr::new(208, 67, 220, 220));
        assert_eq!(config.udp_port, 53);
    }

    #[test]
    fn test_from_file_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"udp_port": 2053, "upstream_primary": "9.9.9.9"}}"#).unwrap();
        file.flush().unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.udp_port, 2053);
        assert_eq!(config.upstream_primary, Ipv4Addr::new(9, 9, 9, 9));
        // Unset fields fall back to defaults
        assert_eq!(config.upstream_secondary, Ipv4Addr::new(208, 67, 220, 220));
    }

    #[test]
    fn test_from_file_invalid_upstream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"upstream_primary": "not-an-ip"}}"#).unwrap();
        file.flush().unwrap();

        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            Config::from_file("/nonexistent/amulet.json"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_port() {
        let (mut config, _dir) = statable_config();

        config.udp_port = 0;
        assert!(config.validate().is_err());

        config.udp_port = u16::MAX;
        assert!(config.validate().is_err());

        config.udp_port = 2053;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_paths() {
        let (mut config, _dir) = statable_config();
        config.map_file = PathBuf::from("/nonexistent/map.txt");

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "map_file", .. }
        ));
    }

    #[test]
    fn test_apply_keeps_snapshot_on_rejection() {
        let (config, _dir) = statable_config();
        let handle = ConfigHandle::new(config.clone());

        let mut bad = config.clone();
        bad.udp_port = 0;
        assert!(handle.apply(bad).is_err());
        assert_eq!(**handle.load(), config);

        let mut good = config;
        good.udp_port = 2053;
        assert!(handle.apply(good).is_ok());
        assert_eq!(handle.load().udp_port, 2053);
    }
}
