// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, StorageError};
use crate::logging::TARGET;
use crate::models::{CategoriesByKind, Category, TxKind};
use crate::storage::Storage;
use crate::utils::{validate_color, validate_name};
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{info, warn};

pub fn load_categories(conn: &Connection, profile_id: i64) -> Result<CategoriesByKind> {
    let mut stmt = conn.prepare(
        "SELECT id, profile_id, name, type, color FROM categories
         WHERE profile_id=?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![profile_id], |r| {
        Ok(Category {
            id: r.get(0)?,
            profile_id: r.get(1)?,
            name: r.get(2)?,
            kind: r.get(3)?,
            color: r.get(4)?,
        })
    })?;
    let mut out = CategoriesByKind::default();
    for row in rows {
        let cat = row?;
        match cat.kind {
            TxKind::Income => out.income.push(cat),
            TxKind::Expense => out.expense.push(cat),
        }
    }
    Ok(out)
}

pub fn insert_category(
    conn: &Connection,
    profile_id: i64,
    kind: TxKind,
    name: &str,
    color: Option<&str>,
) -> Result<Category> {
    let name = validate_name("name", name)?;
    let color = validate_color(color)?;
    conn.execute(
        "INSERT INTO categories(profile_id, name, type, color) VALUES (?1, ?2, ?3, ?4)",
        params![profile_id, name, kind, color],
    )?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        profile_id,
        name,
        kind,
        color,
    })
}

/// Transactions keep their category text; only the category row goes.
pub fn remove_category(conn: &Connection, profile_id: i64, kind: TxKind, name: &str) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM categories WHERE profile_id=?1 AND type=?2 AND name=?3",
        params![profile_id, kind, name.trim()],
    )?;
    Ok(n > 0)
}

/// Fold `sources` into `target` for one profile and kind. Returns the number
/// of transactions retagged. Either everything happens or nothing does; a
/// failure after the transaction opened comes back as `MergeRolledBack`.
pub fn merge_categories(
    conn: &mut Connection,
    profile_id: i64,
    sources: &[String],
    target: &str,
    kind: TxKind,
    color: Option<&str>,
) -> Result<usize> {
    let target = validate_name("target", target)?;
    let color = validate_color(color)?;
    let mut names: Vec<String> = Vec::with_capacity(sources.len());
    for s in sources {
        let s = s.trim();
        if !s.is_empty() && s != target && !names.iter().any(|n| n == s) {
            names.push(s.to_string());
        }
    }

    let rolled_back = |source: StorageError| {
        warn!(
            target: TARGET,
            event = "merge_rolled_back",
            profile_id,
            error = %source
        );
        StorageError::MergeRolledBack {
            source: Box::new(source),
        }
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| rolled_back(e.into()))?;
    // Dropping `tx` on the error path rolls back.
    let retagged = merge_in(&tx, profile_id, &names, &target, kind, color.as_deref())
        .map_err(rolled_back)?;
    tx.commit().map_err(|e| rolled_back(e.into()))?;

    info!(
        target: TARGET,
        event = "categories_merged",
        profile_id,
        sources = names.len(),
        retagged
    );
    Ok(retagged)
}

fn merge_in(
    conn: &Connection,
    profile_id: i64,
    sources: &[String],
    target: &str,
    kind: TxKind,
    color: Option<&str>,
) -> Result<usize> {
    conn.execute(
        "INSERT INTO categories(profile_id, name, type, color) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(profile_id, name, type) DO UPDATE SET color=COALESCE(excluded.color, color)",
        params![profile_id, target, kind, color],
    )?;

    let mut retag = conn.prepare(
        "UPDATE transactions SET category=?1 WHERE profile_id=?2 AND type=?3 AND category=?4",
    )?;
    let mut drop_source =
        conn.prepare("DELETE FROM categories WHERE profile_id=?1 AND type=?2 AND name=?3")?;

    let mut retagged = 0;
    for source in sources {
        retagged += retag.execute(params![target, profile_id, kind, source])?;
    }
    for source in sources {
        drop_source.execute(params![profile_id, kind, source])?;
    }
    Ok(retagged)
}

impl Storage {
    pub async fn load_categories(&self, profile_id: i64) -> Result<CategoriesByKind> {
        self.run("load_categories", move |conn| load_categories(conn, profile_id))
            .await
    }

    pub async fn add_category(
        &self,
        profile_id: i64,
        kind: TxKind,
        name: &str,
        color: Option<&str>,
    ) -> Result<Category> {
        let name = name.to_string();
        let color = color.map(str::to_string);
        self.run("add_category", move |conn| {
            insert_category(conn, profile_id, kind, &name, color.as_deref())
        })
        .await
    }

    pub async fn delete_category(&self, profile_id: i64, kind: TxKind, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.run("delete_category", move |conn| {
            remove_category(conn, profile_id, kind, &name)
        })
        .await
    }

    pub async fn merge_categories(
        &self,
        profile_id: i64,
        sources: &[String],
        target: &str,
        kind: TxKind,
        color: Option<&str>,
    ) -> Result<usize> {
        let sources = sources.to_vec();
        let target = target.to_string();
        let color = color.map(str::to_string);
        self.run("merge_categories", move |conn| {
            merge_categories(conn, profile_id, &sources, &target, kind, color.as_deref())
        })
        .await
    }
}
