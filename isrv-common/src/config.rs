//! # Server Configuration
//!
//! Layered configuration: built-in defaults, then an optional JSON file named by
//! `ISRV_CONFIG`, then individual `ISRV_*` environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IsrvError, IsrvResult};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_FILE_ENV: &str = "ISRV_CONFIG";

/// Default human-readable server name reported by the status and shutdown replies.
pub const DEFAULT_SERVER_NAME: &str = "Multithreaded indicator server";

/// Response cache tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached responses.
    pub capacity: usize,
    /// Idle time after which an entry is evicted, in milliseconds.
    pub ttl_ms: u64,
    /// Delay between two sweeper passes, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 1_000,
            ttl_ms: 60_000,
            sweep_interval_ms: 1_000,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported through the administrative surface.
    pub name: String,
    /// Interface to bind.
    pub host: IpAddr,
    /// Listening port; `0` asks the OS for an ephemeral port.
    pub port: u16,
    /// Worker pool size; `None` means one slot per available CPU.
    pub pool_size: Option<usize>,
    /// Upper bound on the shutdown drain, in milliseconds.
    pub drain_timeout_ms: u64,
    /// Path of the indicator CSV file.
    pub dataset_path: PathBuf,
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: DEFAULT_SERVER_NAME.to_string(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8088,
            pool_size: None,
            drain_timeout_ms: 15 * 60 * 1_000,
            dataset_path: PathBuf::from("data/wdi.csv"),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads defaults, the optional `ISRV_CONFIG` file and `ISRV_*` overrides.
    pub fn load() -> IsrvResult<Self> {
        let mut config = match std::env::var_os(CONFIG_FILE_ENV) {
            Some(path) => Self::from_json_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON configuration file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> IsrvResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> IsrvResult<Self> {
        serde_json::from_str(raw).map_err(|err| IsrvError::InvalidConfig(err.to_string()))
    }

    /// Applies `ISRV_*` overrides fetched through `lookup`.
    ///
    /// Taking a lookup function keeps tests independent of the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> IsrvResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ISRV_HOST") {
            self.host = parse_var("ISRV_HOST", &host)?;
        }
        if let Some(port) = lookup("ISRV_PORT") {
            self.port = parse_var("ISRV_PORT", &port)?;
        }
        if let Some(size) = lookup("ISRV_POOL_SIZE") {
            self.pool_size = Some(parse_var("ISRV_POOL_SIZE", &size)?);
        }
        if let Some(ms) = lookup("ISRV_DRAIN_TIMEOUT_MS") {
            self.drain_timeout_ms = parse_var("ISRV_DRAIN_TIMEOUT_MS", &ms)?;
        }
        if let Some(path) = lookup("ISRV_DATASET") {
            self.dataset_path = PathBuf::from(path);
        }
        if let Some(capacity) = lookup("ISRV_CACHE_CAPACITY") {
            self.cache.capacity = parse_var("ISRV_CACHE_CAPACITY", &capacity)?;
        }
        if let Some(ms) = lookup("ISRV_CACHE_TTL_MS") {
            self.cache.ttl_ms = parse_var("ISRV_CACHE_TTL_MS", &ms)?;
        }
        if let Some(ms) = lookup("ISRV_SWEEP_INTERVAL_MS") {
            self.cache.sweep_interval_ms = parse_var("ISRV_SWEEP_INTERVAL_MS", &ms)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> IsrvResult<()> {
        if self.cache.capacity == 0 {
            return Err(IsrvError::InvalidConfig("cache capacity must be > 0".into()));
        }
        if self.cache.sweep_interval_ms == 0 {
            return Err(IsrvError::InvalidConfig("sweep interval must be > 0".into()));
        }
        if self.pool_size == Some(0) {
            return Err(IsrvError::InvalidConfig("pool size must be > 0".into()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Effective pool size, falling back to the number of available CPUs.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> IsrvResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| IsrvError::InvalidConfig(format!("{key}={raw}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:8088");
        assert!(config.effective_pool_size() >= 1);
    }

    #[test]
    fn json_keeps_defaults_for_missing_fields() {
        let config = ServerConfig::from_json_str(r#"{"port": 9000, "cache": {"capacity": 5}}"#)
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cache.capacity, 5);
        assert_eq!(config.cache.ttl_ms, CacheConfig::default().ttl_ms);
        assert_eq!(config.name, DEFAULT_SERVER_NAME);
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("ISRV_PORT", "7000"),
            ("ISRV_POOL_SIZE", "3"),
            ("ISRV_CACHE_TTL_MS", "250"),
        ]
        .into_iter()
        .collect();
        let mut config = ServerConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.effective_pool_size(), 3);
        assert_eq!(config.cache.ttl(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_garbage_override() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(|key| (key == "ISRV_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, IsrvError::InvalidConfig(_)));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = ServerConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
    }
}
