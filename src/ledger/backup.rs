// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Online snapshots of the database file with a JSON metadata sidecar.

use crate::db::{self, TABLES};
use crate::error::{Result, StorageError};
use crate::fallback::open_configured;
use crate::logging::TARGET;
use crate::storage::Storage;
use crate::utils::now_local;
use chrono::NaiveDateTime;
use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const BACKUP_PREFIX: &str = "ledgerkeep-";
const METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub version: u32,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    pub size_bytes: u64,
    pub row_counts: BTreeMap<String, i64>,
}

pub fn metadata_path(backup_path: &Path) -> PathBuf {
    backup_path.with_extension("json")
}

/// Copy the live database into `dir` and write the sidecar next to it.
pub fn backup_to(conn: &Connection, source_path: &Path, dir: &Path) -> Result<BackupMetadata> {
    fs::create_dir_all(dir)?;
    let created_at = now_local();
    let name = format!("{BACKUP_PREFIX}{}", created_at.format("%Y%m%d-%H%M%S%.3f"));
    let backup_path = dir.join(format!("{name}.sqlite3"));

    conn.backup(DatabaseName::Main, &backup_path, None)?;

    let mut row_counts = BTreeMap::new();
    for table in TABLES {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
        row_counts.insert(table.to_string(), n);
    }

    let meta = BackupMetadata {
        version: METADATA_VERSION,
        name,
        created_at,
        source_path: source_path.to_path_buf(),
        size_bytes: fs::metadata(&backup_path)?.len(),
        backup_path,
        row_counts,
    };
    fs::write(
        metadata_path(&meta.backup_path),
        serde_json::to_vec_pretty(&meta)?,
    )?;
    Ok(meta)
}

pub fn read_backup_metadata(path: &Path) -> Result<BackupMetadata> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Every readable sidecar in `dir`, newest first. Unreadable ones are logged
/// and skipped.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupMetadata>> {
    let mut out = Vec::new();
    if !dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_sidecar = path.extension().is_some_and(|e| e == "json")
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_PREFIX));
        if !is_sidecar {
            continue;
        }
        match read_backup_metadata(&path) {
            Ok(meta) => out.push(meta),
            Err(e) => warn!(
                target: TARGET,
                event = "backup_metadata_unreadable",
                path = %path.display(),
                error = %e
            ),
        }
    }
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}

/// Remove a backup and its sidecar. Returns false when neither was there.
pub fn delete_backup(backup_path: &Path) -> Result<bool> {
    let is_backup = backup_path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(BACKUP_PREFIX));
    if !is_backup {
        return Err(StorageError::validation(
            "backup_path",
            format!("{} is not a {BACKUP_PREFIX}* backup", backup_path.display()),
        ));
    }
    let mut removed = false;
    for path in [backup_path.to_path_buf(), metadata_path(backup_path)] {
        match fs::remove_file(&path) {
            Ok(()) => removed = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

/// Delete all but the `keep` newest backups in `dir`. `keep == 0` disables
/// pruning. Returns how many were removed.
pub fn prune_backups(dir: &Path, keep: usize) -> Result<usize> {
    if keep == 0 {
        return Ok(0);
    }
    let mut pruned = 0;
    for meta in list_backups(dir)?.into_iter().skip(keep) {
        if delete_backup(&meta.backup_path)? {
            pruned += 1;
        }
    }
    Ok(pruned)
}

/// Overwrite the database behind `conn` with the contents of `backup_path`.
pub fn restore_into(conn: &mut Connection, backup_path: &Path) -> Result<()> {
    if !backup_path.is_file() {
        return Err(StorageError::validation(
            "backup_path",
            format!("{} does not exist", backup_path.display()),
        ));
    }
    conn.restore(DatabaseName::Main, backup_path, None::<fn(Progress)>)?;
    Ok(())
}

impl Storage {
    /// Snapshot into `dir`, then prune `dir` down to `max_backups`.
    pub async fn backup_to(&self, dir: impl AsRef<Path>) -> Result<BackupMetadata> {
        let dir = dir.as_ref().to_path_buf();
        let source = self.config().db_path.clone();
        let keep = self.config().max_backups;
        let (meta, pruned) = self
            .run("backup_to", move |conn| {
                let meta = backup_to(conn, &source, &dir)?;
                let pruned = prune_backups(&dir, keep)?;
                Ok((meta, pruned))
            })
            .await?;
        info!(
            target: TARGET,
            event = "backup_created",
            path = %meta.backup_path.display(),
            size = meta.size_bytes,
            pruned
        );
        Ok(meta)
    }

    /// Replace the live database with `backup_path`.
    ///
    /// The current contents are first saved next to the backup being
    /// restored; that snapshot is returned. The pool is drained for the
    /// restore and refilled afterwards, even when the restore fails, and
    /// cached aggregates are dropped.
    pub async fn restore_from(&self, backup_path: impl AsRef<Path>) -> Result<BackupMetadata> {
        let backup_path = backup_path.as_ref().to_path_buf();
        if !backup_path.is_file() {
            return Err(StorageError::validation(
                "backup_path",
                format!("{} does not exist", backup_path.display()),
            ));
        }
        let dir = backup_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let source = self.config().db_path.clone();
        let snapshot = self
            .run("restore_snapshot", move |conn| backup_to(conn, &source, &dir))
            .await?;

        self.pool().close_all();
        let path = self.config().db_path.clone();
        let pool_cfg = self.config().pool.clone();
        let from = backup_path.clone();
        let restored = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = open_configured(&path, &pool_cfg)?;
            restore_into(&mut conn, &from)?;
            db::init_schema(&mut conn)
        })
        .await
        .map_err(StorageError::from)
        .and_then(|r| r);
        self.cache().clear();
        self.pool().initialize().await?;

        restored.inspect_err(|e| {
            error!(
                target: TARGET,
                event = "backup_restore_failed",
                from = %backup_path.display(),
                error = %e
            )
        })?;
        info!(
            target: TARGET,
            event = "backup_restored",
            from = %backup_path.display(),
            snapshot = %snapshot.backup_path.display()
        );
        Ok(snapshot)
    }
}
