// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, StorageError};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{Type, Value, ValueRef};
use rusqlite::Row;
use rust_decimal::Decimal;

pub const MAX_NAME_LEN: usize = 100;

/// Text layout of every timestamp column; matches rusqlite's chrono binding
/// so that string comparison in SQL orders chronologically.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

static COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(#([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})|[a-z][a-z0-9_]*)$")
        .expect("static color pattern")
});

static SETTING_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").expect("static setting key pattern")
});

pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub fn ts_value(ts: NaiveDateTime) -> Value {
    Value::Text(ts.format(TS_FORMAT).to_string())
}

/// Read a money column written as TEXT, tolerating INTEGER/REAL cells left
/// behind by databases created before amounts were stored as text.
pub fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    match row.get_ref(idx)? {
        ValueRef::Text(raw) => {
            let s = std::str::from_utf8(raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
            s.trim()
                .parse::<Decimal>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::try_from(f)
            .map(|d| d.normalize())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Real, Box::new(e))),
        ValueRef::Null => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            Type::Null,
        )),
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            Type::Blob,
        )),
    }
}

pub fn opt_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        _ => decimal_at(row, idx).map(Some),
    }
}

/// Inclusive range of calendar days; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Period {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Period {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(Some(start), Some(end))
    }

    /// Append `AND column >= ? AND column < ?` for the set bounds.
    pub(crate) fn push_sql(&self, column: &str, sql: &mut String, params: &mut Vec<Value>) {
        if let Some(start) = self.start {
            sql.push_str(&format!(" AND {column} >= ?"));
            params.push(ts_value(start.and_time(NaiveTime::MIN)));
        }
        if let Some(end) = self.end {
            // Exclusive bound on the following midnight keeps the whole end day.
            if let Some(next) = end.checked_add_days(Days::new(1)) {
                sql.push_str(&format!(" AND {column} < ?"));
                params.push(ts_value(next.and_time(NaiveTime::MIN)));
            }
        }
    }
}

pub fn validate_name(field: &'static str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StorageError::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(StorageError::validation(
            field,
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_color(color: Option<&str>) -> Result<Option<String>> {
    match color.map(str::trim) {
        None | Some("") => Ok(None),
        Some(c) if COLOR_RE.is_match(c) => Ok(Some(c.to_string())),
        Some(c) => Err(StorageError::validation(
            "color",
            format!("'{c}' is neither a hex color nor a palette name"),
        )),
    }
}

pub fn validate_amount(field: &'static str, amount: Decimal) -> Result<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(StorageError::validation(field, "must not be negative"));
    }
    Ok(amount)
}

pub fn validate_price(field: &'static str, price: Decimal) -> Result<Decimal> {
    if price <= Decimal::ZERO {
        return Err(StorageError::validation(field, "must be greater than zero"));
    }
    Ok(price)
}

pub fn validate_setting_key(key: &str) -> Result<&str> {
    if SETTING_KEY_RE.is_match(key) {
        Ok(key)
    } else {
        Err(StorageError::validation(
            "key",
            format!("'{key}' must be 1-64 of A-Z a-z 0-9 _ . -"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn decimal_reader_accepts_legacy_reals() {
        let conn = Connection::open_in_memory().unwrap();
        let (t, i, r): (Decimal, Decimal, Decimal) = conn
            .query_row("SELECT '12.50', 7, 2.5", [], |row| {
                Ok((decimal_at(row, 0)?, decimal_at(row, 1)?, decimal_at(row, 2)?))
            })
            .unwrap();
        assert_eq!(t, Decimal::new(1250, 2));
        assert_eq!(i, Decimal::from(7));
        assert_eq!(r, Decimal::new(25, 1));
    }

    #[test]
    fn period_end_is_inclusive_of_the_whole_day() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let mut sql = String::new();
        let mut params = Vec::new();
        Period::between(d("2025-01-01"), d("2025-01-31")).push_sql("timestamp", &mut sql, &mut params);
        assert_eq!(sql, " AND timestamp >= ? AND timestamp < ?");
        assert_eq!(params[1], Value::Text("2025-02-01 00:00:00".to_string()));
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("name", "  Car ").unwrap(), "Car");
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", &"x".repeat(101)).is_err());
    }

    #[test]
    fn colors_accept_hex_and_palette_names() {
        assert_eq!(validate_color(Some("#1e88e5")).unwrap().as_deref(), Some("#1e88e5"));
        assert_eq!(validate_color(Some("green_400")).unwrap().as_deref(), Some("green_400"));
        assert_eq!(validate_color(None).unwrap(), None);
        assert!(validate_color(Some("#12345")).is_err());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(validate_amount("amount", Decimal::new(-1, 0)).is_err());
        assert!(validate_amount("amount", Decimal::ZERO).is_ok());
        assert!(validate_price("price", Decimal::ZERO).is_err());
    }
}
