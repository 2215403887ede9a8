// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, StorageError};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Ledgerkeep", "ledgerkeep"));

pub const DB_FILE_NAME: &str = "ledgerkeep.sqlite3";

pub const DEFAULT_MIN_CONNECTIONS: usize = 2;
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BALANCE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BACKUPS: usize = 10;

/// Sizing and timing knobs for [`crate::pool::ConnectionPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections opened by `initialize` and kept through idle reaping.
    pub min_connections: usize,
    /// Hard cap on connections alive at once (idle + checked out).
    pub max_connections: usize,
    /// How long a checkout waits for an idle connection before trying to grow.
    pub connection_timeout: Duration,
    /// Idle age after which the reaper may close a connection.
    pub idle_timeout: Duration,
    /// Period of the background reaper task.
    pub reap_interval: Duration,
    /// SQLite busy handler timeout applied to every connection.
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(StorageError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(StorageError::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.reap_interval.is_zero() {
            return Err(StorageError::Config(
                "reap_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything the storage service needs at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub pool: PoolConfig,
    /// Freshness window for cached balances. Readers may see a balance up to
    /// this old when a writer skipped invalidation.
    pub balance_ttl: Duration,
    /// Backups kept per directory; older ones are pruned after each new
    /// backup. Zero keeps everything.
    pub max_backups: usize,
}

impl StorageConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            pool: PoolConfig::default(),
            balance_ttl: DEFAULT_BALANCE_TTL,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_balance_ttl(mut self, ttl: Duration) -> Self {
        self.balance_ttl = ttl;
        self
    }

    pub fn with_max_backups(mut self, keep: usize) -> Self {
        self.max_backups = keep;
        self
    }

    /// Build a config from `LEDGERKEEP_*` environment variables, falling back
    /// to the platform data directory and built-in defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match lookup("LEDGERKEEP_DB_PATH") {
            Some(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
            _ => default_db_path()?,
        };
        let mut pool = PoolConfig::default();
        if let Some(v) = parse_env::<usize>(&lookup, "LEDGERKEEP_POOL_MIN")? {
            pool.min_connections = v;
        }
        if let Some(v) = parse_env::<usize>(&lookup, "LEDGERKEEP_POOL_MAX")? {
            pool.max_connections = v;
        }
        if let Some(ms) = parse_env::<u64>(&lookup, "LEDGERKEEP_POOL_TIMEOUT_MS")? {
            pool.connection_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>(&lookup, "LEDGERKEEP_IDLE_TIMEOUT_MS")? {
            pool.idle_timeout = Duration::from_millis(ms);
        }
        let balance_ttl = parse_env::<u64>(&lookup, "LEDGERKEEP_BALANCE_TTL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BALANCE_TTL);
        let max_backups =
            parse_env::<usize>(&lookup, "LEDGERKEEP_MAX_BACKUPS")?.unwrap_or(DEFAULT_MAX_BACKUPS);

        let cfg = Self {
            db_path,
            pool,
            balance_ttl,
            max_backups,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StorageError::Config(format!("{key}: cannot parse '{raw}'"))),
    }
}

/// `<platform data dir>/ledgerkeep.sqlite3`, creating the directory if needed.
pub fn default_db_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2).ok_or(StorageError::NoDataDir)?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir)?;
    Ok(data_dir.join(DB_FILE_NAME))
}
