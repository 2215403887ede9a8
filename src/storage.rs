// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The storage service handed to the UI layer.
//!
//! One `Storage` is built at process start, initialized once (schema, then
//! pool), shared by reference, and shut down explicitly. The ledger
//! operations in [`crate::ledger`] are methods on it.

use crate::cache::{balance_key, AggregateCache};
use crate::config::StorageConfig;
use crate::db;
use crate::error::Result;
use crate::fallback::{open_configured, open_fallback};
use crate::logging::TARGET;
use crate::pool::{ConnectionPool, PooledConnection};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

pub struct Storage {
    config: StorageConfig,
    pool: ConnectionPool,
    cache: AggregateCache<Decimal>,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        let pool = ConnectionPool::new(&config.db_path, config.pool.clone());
        Self {
            config,
            pool,
            cache: AggregateCache::new(),
        }
    }

    /// `new` followed by `init`.
    pub async fn open(config: StorageConfig) -> Result<Self> {
        let storage = Self::new(config);
        storage.init().await?;
        Ok(storage)
    }

    /// Bring the schema up to date on a dedicated connection, then fill the
    /// pool. Any failure here should abort startup.
    pub async fn init(&self) -> Result<()> {
        self.config.validate()?;
        let path = self.config.db_path.clone();
        let pool_cfg = self.config.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = open_configured(&path, &pool_cfg)?;
            db::init_schema(&mut conn)
        })
        .await?
        .inspect_err(|e| error!(target: TARGET, event = "schema_init_failed", error = %e))?;
        self.pool.initialize().await?;
        info!(
            target: TARGET,
            event = "storage_ready",
            path = %self.config.db_path.display()
        );
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.pool.close_all();
        self.cache.clear();
        info!(target: TARGET, event = "storage_shutdown");
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn cache(&self) -> &AggregateCache<Decimal> {
        &self.cache
    }

    /// A pooled connection, or a one-off fallback connection when the pool
    /// cannot serve one. Pool failures are logged even when the fallback
    /// succeeds so that a misconfigured pool stays visible.
    pub async fn acquire(&self, op: &'static str) -> Result<PooledConnection> {
        match self.pool.get_connection().await {
            Ok(lease) => Ok(lease),
            Err(pool_err) => {
                warn!(
                    target: TARGET,
                    event = "pool_checkout_failed",
                    op,
                    error = %pool_err,
                    "falling back to a direct connection"
                );
                open_fallback(&self.config.db_path, &self.config.pool)
                    .await
                    .inspect_err(|e| {
                        error!(target: TARGET, event = "fallback_failed", op, error = %e)
                    })
            }
        }
    }

    pub(crate) async fn run<R, F>(&self, op: &'static str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut lease = self.acquire(op).await?;
        lease.interact(f).await
    }

    pub(crate) fn invalidate_balance(&self, profile_id: i64) {
        self.cache.invalidate(&balance_key(profile_id));
    }
}
