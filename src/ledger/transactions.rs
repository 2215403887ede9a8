// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, StorageError};
use crate::models::{NewTransaction, Transaction, TransactionPatch, TxKind};
use crate::storage::Storage;
use crate::utils::{decimal_at, now_local, ts_value, validate_amount, Period};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

pub(crate) const TRANSACTION_COLUMNS: &str =
    "id, profile_id, timestamp, type, category, description, amount, property_id";

pub(crate) fn map_transaction(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        profile_id: r.get(1)?,
        timestamp: r.get(2)?,
        kind: r.get(3)?,
        category: r.get(4)?,
        description: r.get(5)?,
        amount: decimal_at(r, 6)?,
        property_id: r.get(7)?,
    })
}

fn clean(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Newest first. `limit` of `None` returns every matching row.
pub fn query_transactions(
    conn: &Connection,
    profile_id: i64,
    period: Period,
    limit: Option<usize>,
    offset: usize,
) -> Result<Vec<Transaction>> {
    let mut sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE profile_id=?");
    let mut values: Vec<Value> = vec![Value::Integer(profile_id)];
    period.push_sql("timestamp", &mut sql, &mut values);
    sql.push_str(" ORDER BY timestamp DESC, id DESC");
    match limit {
        Some(limit) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(limit as i64));
            values.push(Value::Integer(offset as i64));
        }
        None if offset > 0 => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            values.push(Value::Integer(offset as i64));
        }
        None => {}
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), map_transaction)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn count_transactions(conn: &Connection, profile_id: i64, period: Period) -> Result<usize> {
    let mut sql = String::from("SELECT COUNT(*) FROM transactions WHERE profile_id=?");
    let mut values: Vec<Value> = vec![Value::Integer(profile_id)];
    period.push_sql("timestamp", &mut sql, &mut values);
    let n: i64 = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;
    Ok(n as usize)
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id=?1"),
        params![id],
        map_transaction,
    )
    .optional()?
    .ok_or_else(|| StorageError::not_found("transaction", id))
}

/// Insert one ledger row. `property_id` is only set by the property
/// operations for their mirrored rows.
pub fn insert_transaction(
    conn: &Connection,
    profile_id: i64,
    new: &NewTransaction,
    property_id: Option<i64>,
) -> Result<Transaction> {
    let amount = validate_amount("amount", new.amount)?;
    let timestamp = new.timestamp.unwrap_or_else(now_local);
    let category = clean(new.category.as_deref());
    let description = clean(new.description.as_deref());
    conn.execute(
        "INSERT INTO transactions(profile_id, timestamp, type, category, description, amount, property_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            profile_id,
            ts_value(timestamp),
            new.kind,
            category,
            description,
            amount.to_string(),
            property_id
        ],
    )?;
    Ok(Transaction {
        id: conn.last_insert_rowid(),
        profile_id,
        timestamp,
        kind: new.kind,
        category,
        description,
        amount,
        property_id,
    })
}

/// Apply the set fields of `patch`; returns the owning profile.
pub fn patch_transaction(conn: &Connection, id: i64, patch: &TransactionPatch) -> Result<i64> {
    if patch.is_empty() {
        return Ok(get_transaction(conn, id)?.profile_id);
    }
    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(kind) = patch.kind {
        sets.push("type=?");
        values.push(Value::Text(kind.as_str().to_string()));
    }
    if let Some(category) = &patch.category {
        sets.push("category=?");
        values.push(clean(Some(category.as_str())).map_or(Value::Null, Value::Text));
    }
    if let Some(description) = &patch.description {
        sets.push("description=?");
        values.push(clean(Some(description.as_str())).map_or(Value::Null, Value::Text));
    }
    if let Some(amount) = patch.amount {
        let amount = validate_amount("amount", amount)?;
        sets.push("amount=?");
        values.push(Value::Text(amount.to_string()));
    }
    values.push(Value::Integer(id));
    let sql = format!(
        "UPDATE transactions SET {} WHERE id=? RETURNING profile_id",
        sets.join(", ")
    );
    conn.query_row(&sql, params_from_iter(values), |r| r.get(0))
        .optional()?
        .ok_or_else(|| StorageError::not_found("transaction", id))
}

/// Returns the owning profile of the removed row, if there was one.
pub fn remove_transaction(conn: &Connection, id: i64) -> Result<Option<i64>> {
    let owner = conn
        .query_row(
            "DELETE FROM transactions WHERE id=?1 RETURNING profile_id",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(owner)
}

impl Storage {
    pub async fn load_transactions(
        &self,
        profile_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let period = Period::new(start, end);
        self.run("load_transactions", move |conn| {
            query_transactions(conn, profile_id, period, limit, offset)
        })
        .await
    }

    pub async fn get_transactions_count(
        &self,
        profile_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<usize> {
        let period = Period::new(start, end);
        self.run("get_transactions_count", move |conn| {
            count_transactions(conn, profile_id, period)
        })
        .await
    }

    /// Record a transaction stamped with the current local time.
    pub async fn add_transaction(
        &self,
        profile_id: i64,
        kind: TxKind,
        category: Option<&str>,
        description: Option<&str>,
        amount: Decimal,
    ) -> Result<Transaction> {
        let mut new = NewTransaction::new(kind, amount);
        new.category = category.map(str::to_string);
        new.description = description.map(str::to_string);
        self.record_transaction(profile_id, new).await
    }

    pub async fn record_transaction(
        &self,
        profile_id: i64,
        new: NewTransaction,
    ) -> Result<Transaction> {
        let tx = self
            .run("record_transaction", move |conn| {
                insert_transaction(conn, profile_id, &new, None)
            })
            .await?;
        self.invalidate_balance(profile_id);
        Ok(tx)
    }

    pub async fn update_transaction(&self, id: i64, patch: TransactionPatch) -> Result<()> {
        let profile_id = self
            .run("update_transaction", move |conn| {
                patch_transaction(conn, id, &patch)
            })
            .await?;
        self.invalidate_balance(profile_id);
        Ok(())
    }

    pub async fn delete_transaction(&self, id: i64) -> Result<bool> {
        let owner = self
            .run("delete_transaction", move |conn| remove_transaction(conn, id))
            .await?;
        if let Some(profile_id) = owner {
            self.invalidate_balance(profile_id);
        }
        Ok(owner.is_some())
    }
}
