//! Runtime configuration, read from `~/.sitepin/config.toml`.
//!
//! Every key is optional; a missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::location::AcquirerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geocoder: GeocoderConfig,
    pub links: LinksConfig,
    pub device: DeviceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    /// Sent with every outbound request, including link expansion.
    pub user_agent: String,
    pub min_query_chars: usize,
    pub debounce_ms: u64,
    pub label_max_chars: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org/search".into(),
            user_agent: "Sitepin/0.1 (site-locator)".into(),
            min_query_chars: 5,
            debounce_ms: 1000,
            label_max_chars: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    pub endpoint: String,
    /// Shortener hosts whose links get expanded.
    pub hosts: Vec<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://unshorten.me/json/".into(),
            hosts: vec!["maps.app.goo.gl".into(), "goo.gl".into(), "bit.ly".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub high_timeout_ms: u64,
    pub high_max_age_ms: u64,
    pub low_timeout_ms: u64,
    pub low_max_age_ms: u64,
    pub ip_endpoint: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            high_timeout_ms: 15_000,
            high_max_age_ms: 0,
            low_timeout_ms: 30_000,
            low_max_age_ms: 300_000,
            ip_endpoint: "https://ipapi.co/json/".into(),
        }
    }
}

impl DeviceConfig {
    pub fn acquirer(&self) -> AcquirerConfig {
        AcquirerConfig {
            high_timeout: Duration::from_millis(self.high_timeout_ms),
            high_max_age: Duration::from_millis(self.high_max_age_ms),
            low_timeout: Duration::from_millis(self.low_timeout_ms),
            low_max_age: Duration::from_millis(self.low_max_age_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Config {
    /// Load from the default location (~/.sitepin/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load from a specific path. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sitepin")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.geocoder.min_query_chars, 5);
        assert_eq!(cfg.geocoder.debounce_ms, 1000);
        assert_eq!(cfg.links.hosts.len(), 3);
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.device.acquirer(), AcquirerConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "[geocoder]\ndebounce_ms = 250\n\n[server]\nport = 8080").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.geocoder.debounce_ms, 250);
        assert_eq!(cfg.geocoder.min_query_chars, 5);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.links, LinksConfig::default());
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = \"eighty\"").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_device_durations() {
        let device = DeviceConfig {
            high_timeout_ms: 5_000,
            ..DeviceConfig::default()
        };
        assert_eq!(device.acquirer().high_timeout, Duration::from_secs(5));
        assert_eq!(device.acquirer().low_max_age, Duration::from_secs(300));
    }
}
