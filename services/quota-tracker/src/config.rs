use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            _ => anyhow::bail!("unknown store backend {value}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaTrackerConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub busy_timeout_ms: u64,
    pub fair_use_message_limit: u64,
    pub fair_use_window_secs: u64,
    pub default_limit: u64,
    pub default_window_secs: u64,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for QuotaTrackerConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8183,
            data_dir: PathBuf::from("data/quota"),
            store_backend: StoreBackend::Sqlite,
            busy_timeout_ms: 5_000,
            fair_use_message_limit: 200,
            fair_use_window_secs: 3 * 60 * 60,
            default_limit: 100,
            default_window_secs: 60 * 60,
            request_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl QuotaTrackerConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("QUOTA_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("QUOTA_PORT") {
            cfg.server_port = port.parse().context("QUOTA_PORT must be a valid u16")?;
        }
        if let Ok(dir) = env::var("QUOTA_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(backend) = env::var("QUOTA_STORE_BACKEND") {
            cfg.store_backend = backend
                .parse()
                .with_context(|| format!("QUOTA_STORE_BACKEND is invalid: {backend}"))?;
        }
        if let Ok(timeout) = env::var("QUOTA_BUSY_TIMEOUT_MS") {
            cfg.busy_timeout_ms = timeout
                .parse()
                .context("QUOTA_BUSY_TIMEOUT_MS must be a positive integer")?;
        }
        if let Ok(limit) = env::var("FAIR_USE_MESSAGE_LIMIT") {
            cfg.fair_use_message_limit = limit
                .parse()
                .context("FAIR_USE_MESSAGE_LIMIT must be a positive integer")?;
        }
        if let Ok(window) = env::var("FAIR_USE_WINDOW_SECS") {
            cfg.fair_use_window_secs = window
                .parse()
                .context("FAIR_USE_WINDOW_SECS must be a positive integer")?;
        }
        if let Ok(limit) = env::var("DEFAULT_QUOTA_LIMIT") {
            cfg.default_limit = limit
                .parse()
                .context("DEFAULT_QUOTA_LIMIT must be a positive integer")?;
        }
        if let Ok(window) = env::var("DEFAULT_QUOTA_WINDOW_SECS") {
            cfg.default_window_secs = window
                .parse()
                .context("DEFAULT_QUOTA_WINDOW_SECS must be a positive integer")?;
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout_secs = timeout
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_backend == StoreBackend::Sqlite {
            ensure_directory(&self.data_dir)?;
        }

        if self.busy_timeout_ms == 0 {
            anyhow::bail!("QUOTA_BUSY_TIMEOUT_MS must be greater than zero");
        }
        if self.fair_use_message_limit == 0 {
            anyhow::bail!("FAIR_USE_MESSAGE_LIMIT must be greater than zero");
        }
        if self.fair_use_window_secs == 0 {
            anyhow::bail!("FAIR_USE_WINDOW_SECS must be greater than zero");
        }
        if self.default_limit == 0 {
            anyhow::bail!("DEFAULT_QUOTA_LIMIT must be greater than zero");
        }
        if self.default_window_secs == 0 {
            anyhow::bail!("DEFAULT_QUOTA_WINDOW_SECS must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        // A check still waiting on the database lock when the request times
        // out may commit after the client has been told 408.
        if self.busy_timeout_ms >= self.request_timeout_secs.saturating_mul(1_000) {
            anyhow::bail!(
                "QUOTA_BUSY_TIMEOUT_MS ({}) must be shorter than REQUEST_TIMEOUT_SECS ({}s)",
                self.busy_timeout_ms,
                self.request_timeout_secs
            );
        }

        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_from_str() {
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!("MEMORY".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_config_validation() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = QuotaTrackerConfig {
            data_dir: dir.path().join("quota"),
            ..QuotaTrackerConfig::default()
        };

        // Valid configuration, data directory gets created
        assert!(config.validate().is_ok());
        assert!(config.data_dir.is_dir());

        // Invalid: zero limit
        config.fair_use_message_limit = 0;
        assert!(config.validate().is_err());
        config.fair_use_message_limit = 200;

        // Invalid: zero window
        config.default_window_secs = 0;
        assert!(config.validate().is_err());
        config.default_window_secs = 3600;

        // Invalid: zero busy timeout
        config.busy_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.busy_timeout_ms = 5_000;

        // Invalid: busy timeout not shorter than the request timeout
        config.request_timeout_secs = 5;
        assert!(config.validate().is_err());
        config.busy_timeout_ms = 4_999;
        assert!(config.validate().is_ok());
        config.busy_timeout_ms = 5_000;
        config.request_timeout_secs = 30;

        // Invalid: data dir is a file
        let file_path = dir.path().join("not-a-dir");
        fs::write(&file_path, b"x").unwrap();
        config.data_dir = file_path.clone();
        assert!(config.validate().is_err());

        // Valid: memory backend does not touch the data dir
        config.store_backend = StoreBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listen_addr() {
        let config = QuotaTrackerConfig::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:8183");
        assert_eq!(config.busy_timeout(), Duration::from_millis(5_000));
    }
}
