// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Connection opening shared by the pool, schema bootstrap and the
//! ad-hoc fallback path used when the pool cannot serve a checkout.

use crate::config::PoolConfig;
use crate::error::Result;
use crate::logging::TARGET;
use crate::pool::PooledConnection;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Open `path` and apply the pragma set every connection in this crate runs with.
pub fn open_configured(path: &Path, config: &PoolConfig) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn, config)?;
    Ok(conn)
}

pub(crate) fn configure(conn: &Connection, config: &PoolConfig) -> Result<()> {
    conn.busy_timeout(config.busy_timeout)?;
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        PRAGMA cache_size = 10000;
        PRAGMA temp_store = MEMORY;
        "#,
    )?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        // In-memory databases report "memory" and cannot switch.
        debug!(target: TARGET, event = "journal_mode_not_wal", mode = %mode);
    }
    Ok(())
}

/// Open a one-off connection outside the pool. It is closed when the
/// returned lease drops and never counts against the pool cap.
pub async fn open_fallback(path: &Path, config: &PoolConfig) -> Result<PooledConnection> {
    let path: PathBuf = path.to_path_buf();
    let config = config.clone();
    let conn = tokio::task::spawn_blocking(move || open_configured(&path, &config)).await??;
    warn!(target: TARGET, event = "fallback_connection_opened");
    Ok(PooledConnection::detached(conn))
}
