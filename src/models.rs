// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category tag carried by the expense mirrored from a property purchase.
pub const PROPERTY_PURCHASE_CATEGORY: &str = "Property purchase";
/// Category tag carried by the income mirrored from a property sale.
pub const PROPERTY_SALE_CATEGORY: &str = "Property sale";
pub const INITIAL_BALANCE_CATEGORY: &str = "Initial balance";
pub const CORRECTION_CATEGORY: &str = "Correction";

pub fn purchase_description(property_name: &str) -> String {
    format!("{PROPERTY_PURCHASE_CATEGORY}: {property_name}")
}

pub fn sale_description(property_name: &str) -> String {
    format!("{PROPERTY_SALE_CATEGORY}: {property_name}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Income,
    Expense,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Income => "income",
            TxKind::Expense => "expense",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TxKind::Income),
            "expense" => Ok(TxKind::Expense),
            other => Err(format!("unknown transaction type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Active,
    Sold,
}

impl PropertyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyStatus::Active => "active",
            PropertyStatus::Sold => "sold",
        }
    }
}

impl fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(PropertyStatus::Active),
            "sold" => Ok(PropertyStatus::Sold),
            other => Err(format!("unknown property status '{other}'")),
        }
    }
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                s.parse::<$ty>()
                    .map_err(|e| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum_sql!(TxKind);
text_enum_sql!(PropertyStatus);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub profile_id: i64,
    pub name: String,
    pub kind: TxKind,
    pub color: Option<String>,
}

/// Categories of one profile split by kind, each list sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesByKind {
    pub income: Vec<Category>,
    pub expense: Vec<Category>,
}

impl CategoriesByKind {
    pub fn of_kind(&self, kind: TxKind) -> &[Category] {
        match kind {
            TxKind::Income => &self.income,
            TxKind::Expense => &self.expense,
        }
    }

    pub fn contains(&self, kind: TxKind, name: &str) -> bool {
        self.of_kind(kind).iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub profile_id: i64,
    pub timestamp: NaiveDateTime,
    pub kind: TxKind,
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount: Decimal,
    /// Set on rows mirrored from a property purchase or sale.
    pub property_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub kind: TxKind,
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount: Decimal,
    /// Defaults to the current local time.
    pub timestamp: Option<NaiveDateTime>,
}

impl NewTransaction {
    pub fn new(kind: TxKind, amount: Decimal) -> Self {
        Self {
            kind,
            category: None,
            description: None,
            amount,
            timestamp: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPatch {
    pub kind: Option<TxKind>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.amount.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: i64,
    pub profile_id: i64,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub status: PropertyStatus,
    pub display_order: i64,
    pub created_timestamp: Option<NaiveDateTime>,
    pub selling_price: Option<Decimal>,
    pub sold_timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub income: Decimal,
    pub expense: Decimal,
}

impl TransactionStats {
    pub fn net(&self) -> Decimal {
        self.income - self.expense
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    /// Income totals keyed by category.
    pub income_by_category: std::collections::BTreeMap<String, Decimal>,
    /// Expense totals keyed by description.
    pub expense_by_description: std::collections::BTreeMap<String, Decimal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub active_total: Decimal,
    pub active_count: usize,
    pub sold_total: Decimal,
    pub sold_count: usize,
}
