// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Read-only aggregates over the ledger.
//!
//! Amounts are TEXT in the database, so every sum is computed here with
//! `Decimal` rather than with SQL `SUM`, which would go through floats.

use crate::cache::balance_key;
use crate::error::Result;
use crate::logging::TARGET;
use crate::models::{
    CategorySummary, PropertyStatus, PropertySummary, TransactionStats, TxKind,
    CORRECTION_CATEGORY, INITIAL_BALANCE_CATEGORY, PROPERTY_PURCHASE_CATEGORY,
    PROPERTY_SALE_CATEGORY,
};
use crate::storage::Storage;
use crate::utils::{decimal_at, Period};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use rust_decimal::Decimal;
use tracing::trace;

/// Filter that keeps only rows entered by hand.
const NOT_MIRRORED: &str = " AND property_id IS NULL AND COALESCE(category, '') NOT IN (?, ?)";

fn push_not_mirrored(sql: &mut String, values: &mut Vec<Value>) {
    sql.push_str(NOT_MIRRORED);
    values.push(Value::Text(PROPERTY_PURCHASE_CATEGORY.to_string()));
    values.push(Value::Text(PROPERTY_SALE_CATEGORY.to_string()));
}

/// Income minus expense over every transaction of the profile, mirrored
/// property rows included.
pub fn total_balance(conn: &Connection, profile_id: i64) -> Result<Decimal> {
    let mut stmt = conn.prepare_cached("SELECT type, amount FROM transactions WHERE profile_id=?1")?;
    let mut rows = stmt.query(params![profile_id])?;
    let mut balance = Decimal::ZERO;
    while let Some(r) = rows.next()? {
        let kind: TxKind = r.get(0)?;
        let amount = decimal_at(r, 1)?;
        match kind {
            TxKind::Income => balance += amount,
            TxKind::Expense => balance -= amount,
        }
    }
    Ok(balance)
}

pub fn transactions_stats(
    conn: &Connection,
    profile_id: i64,
    period: Period,
) -> Result<TransactionStats> {
    let mut sql = String::from("SELECT type, amount FROM transactions WHERE profile_id=?");
    let mut values = vec![Value::Integer(profile_id)];
    period.push_sql("timestamp", &mut sql, &mut values);
    push_not_mirrored(&mut sql, &mut values);

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values))?;
    let mut stats = TransactionStats::default();
    while let Some(r) = rows.next()? {
        let kind: TxKind = r.get(0)?;
        let amount = decimal_at(r, 1)?;
        match kind {
            TxKind::Income => stats.income += amount,
            TxKind::Expense => stats.expense += amount,
        }
    }
    Ok(stats)
}

/// Income grouped by category, expenses grouped by description. Opening
/// balances and corrections are left out of the income side.
pub fn category_summary(
    conn: &Connection,
    profile_id: i64,
    period: Period,
) -> Result<CategorySummary> {
    let mut sql =
        String::from("SELECT type, category, description, amount FROM transactions WHERE profile_id=?");
    let mut values = vec![Value::Integer(profile_id)];
    period.push_sql("timestamp", &mut sql, &mut values);
    push_not_mirrored(&mut sql, &mut values);

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values))?;
    let mut summary = CategorySummary::default();
    while let Some(r) = rows.next()? {
        let kind: TxKind = r.get(0)?;
        let category: Option<String> = r.get(1)?;
        let description: Option<String> = r.get(2)?;
        let amount = decimal_at(r, 3)?;
        match kind {
            TxKind::Income => {
                let category = category.unwrap_or_default();
                if category == INITIAL_BALANCE_CATEGORY || category == CORRECTION_CATEGORY {
                    continue;
                }
                *summary.income_by_category.entry(category).or_default() += amount;
            }
            TxKind::Expense => {
                *summary
                    .expense_by_description
                    .entry(description.unwrap_or_default())
                    .or_default() += amount;
            }
        }
    }
    Ok(summary)
}

pub fn property_summary(conn: &Connection, profile_id: i64) -> Result<PropertySummary> {
    let mut stmt =
        conn.prepare("SELECT status, price, selling_price FROM properties WHERE profile_id=?1")?;
    let mut rows = stmt.query(params![profile_id])?;
    let mut summary = PropertySummary::default();
    while let Some(r) = rows.next()? {
        let status: PropertyStatus = r.get(0)?;
        match status {
            PropertyStatus::Active => {
                summary.active_total += decimal_at(r, 1)?;
                summary.active_count += 1;
            }
            PropertyStatus::Sold => {
                summary.sold_total += decimal_at(r, 2)?;
                summary.sold_count += 1;
            }
        }
    }
    Ok(summary)
}

impl Storage {
    pub async fn get_transactions_stats(
        &self,
        profile_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TransactionStats> {
        let period = Period::new(start, end);
        self.run("get_transactions_stats", move |conn| {
            transactions_stats(conn, profile_id, period)
        })
        .await
    }

    pub async fn get_category_summary(
        &self,
        profile_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<CategorySummary> {
        let period = Period::new(start, end);
        self.run("get_category_summary", move |conn| {
            category_summary(conn, profile_id, period)
        })
        .await
    }

    /// Cached for `balance_ttl`; every write that touches the profile's
    /// transactions evicts the entry.
    pub async fn get_total_balance(&self, profile_id: i64) -> Result<Decimal> {
        let key = balance_key(profile_id);
        if let Some(balance) = self.cache().get(&key) {
            trace!(target: TARGET, event = "balance_cache_hit", profile_id);
            return Ok(balance);
        }
        let balance = self
            .run("get_total_balance", move |conn| total_balance(conn, profile_id))
            .await?;
        self.cache().put(key, balance, self.config().balance_ttl);
        Ok(balance)
    }

    pub async fn get_property_summary(&self, profile_id: i64) -> Result<PropertySummary> {
        self.run("get_property_summary", move |conn| {
            property_summary(conn, profile_id)
        })
        .await
    }
}
