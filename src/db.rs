// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, StorageError};
use crate::logging::TARGET;
use crate::models::{PROPERTY_PURCHASE_CATEGORY, PROPERTY_SALE_CATEGORY};
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::info;

/// Reserved tags paired with the ones the first release of the app wrote.
pub const LEGACY_PROPERTY_TAGS: [(&str, &str); 2] = [
    (PROPERTY_PURCHASE_CATEGORY, "Покупка майна"),
    (PROPERTY_SALE_CATEGORY, "Продаж майна"),
];

pub const TABLES: [&str; 5] = [
    "profiles",
    "categories",
    "transactions",
    "properties",
    "app_settings",
];

const CREATE_TABLES: &[(&str, &str)] = &[
    (
        "create profiles",
        r#"
    CREATE TABLE IF NOT EXISTS profiles(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        avatar_b64 TEXT
    );"#,
    ),
    (
        "create categories",
        r#"
    CREATE TABLE IF NOT EXISTS categories(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        profile_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        type TEXT NOT NULL CHECK(type IN ('income','expense')),
        color TEXT,
        UNIQUE(profile_id, name, type),
        FOREIGN KEY(profile_id) REFERENCES profiles(id) ON DELETE CASCADE
    );"#,
    ),
    (
        "create properties",
        r#"
    CREATE TABLE IF NOT EXISTS properties(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        profile_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        price TEXT NOT NULL,
        image_b64 TEXT,
        status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','sold')),
        display_order INTEGER NOT NULL DEFAULT 0,
        created_timestamp TEXT,
        selling_price TEXT,
        sold_timestamp TEXT,
        CHECK(
            (status = 'active' AND selling_price IS NULL AND sold_timestamp IS NULL)
            OR (status = 'sold' AND selling_price IS NOT NULL AND sold_timestamp IS NOT NULL)
        ),
        FOREIGN KEY(profile_id) REFERENCES profiles(id) ON DELETE CASCADE
    );"#,
    ),
    (
        "create transactions",
        r#"
    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        profile_id INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        type TEXT NOT NULL CHECK(type IN ('income','expense')),
        category TEXT,
        description TEXT,
        amount TEXT NOT NULL,
        property_id INTEGER,
        FOREIGN KEY(profile_id) REFERENCES profiles(id) ON DELETE CASCADE,
        FOREIGN KEY(property_id) REFERENCES properties(id) ON DELETE SET NULL
    );"#,
    ),
    (
        "create app_settings",
        r#"
    CREATE TABLE IF NOT EXISTS app_settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );"#,
    ),
];

// Created after the column migrations: some index columns only exist once
// an older database has been upgraded.
const CREATE_INDEXES: &[(&str, &str)] = &[
    (
        "idx_transactions_profile_date",
        "CREATE INDEX IF NOT EXISTS idx_transactions_profile_date ON transactions(profile_id, timestamp)",
    ),
    (
        "idx_transactions_profile_type",
        "CREATE INDEX IF NOT EXISTS idx_transactions_profile_type ON transactions(profile_id, type)",
    ),
    (
        "idx_transactions_category",
        "CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(profile_id, category)",
    ),
    (
        "idx_transactions_property",
        "CREATE INDEX IF NOT EXISTS idx_transactions_property ON transactions(property_id)",
    ),
    (
        "idx_properties_profile_status",
        "CREATE INDEX IF NOT EXISTS idx_properties_profile_status ON properties(profile_id, status)",
    ),
    (
        "idx_properties_order",
        "CREATE INDEX IF NOT EXISTS idx_properties_order ON properties(profile_id, display_order)",
    ),
    (
        "idx_properties_created",
        "CREATE INDEX IF NOT EXISTS idx_properties_created ON properties(profile_id, created_timestamp)",
    ),
    (
        "idx_categories_profile_type",
        "CREATE INDEX IF NOT EXISTS idx_categories_profile_type ON categories(profile_id, type)",
    ),
    (
        "idx_profiles_name",
        "CREATE INDEX IF NOT EXISTS idx_profiles_name ON profiles(name)",
    ),
    (
        "idx_app_settings_key",
        "CREATE INDEX IF NOT EXISTS idx_app_settings_key ON app_settings(key)",
    ),
];

pub fn index_names() -> impl Iterator<Item = &'static str> {
    CREATE_INDEXES.iter().map(|(name, _)| *name)
}

/// Columns a `properties` table may be missing when it predates them.
const PROPERTY_MIGRATIONS: &[(&str, &str)] = &[
    (
        "status",
        "ALTER TABLE properties ADD COLUMN status TEXT DEFAULT 'active'",
    ),
    (
        "display_order",
        "ALTER TABLE properties ADD COLUMN display_order INTEGER DEFAULT 0",
    ),
    (
        "sold_timestamp",
        "ALTER TABLE properties ADD COLUMN sold_timestamp TEXT",
    ),
    (
        "selling_price",
        "ALTER TABLE properties ADD COLUMN selling_price TEXT",
    ),
    (
        "created_timestamp",
        "ALTER TABLE properties ADD COLUMN created_timestamp TEXT",
    ),
];

fn step(name: &str) -> impl FnOnce(rusqlite::Error) -> StorageError + '_ {
    move |source| StorageError::SchemaMigration {
        step: name.to_string(),
        source,
    }
}

/// Create tables, apply additive migrations, then create indexes, all in
/// one transaction. Safe to run on every start.
pub fn init_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(step("begin"))?;

    for (name, sql) in CREATE_TABLES {
        tx.execute_batch(sql).map_err(step(name))?;
    }

    let applied = migrate_properties(&tx)? + migrate_transactions(&tx)?;

    for (name, sql) in CREATE_INDEXES {
        tx.execute_batch(sql).map_err(step(name))?;
    }

    tx.commit().map_err(step("commit"))?;
    info!(target: TARGET, event = "schema_ready", migrations = applied);
    Ok(())
}

fn migrate_properties(conn: &Connection) -> Result<usize> {
    let existing = table_columns(conn, "properties").map_err(step("inspect properties"))?;
    let mut applied = 0;
    for (column, sql) in PROPERTY_MIGRATIONS {
        if existing.iter().any(|c| c == *column) {
            continue;
        }
        conn.execute_batch(sql).map_err(step(column))?;
        if *column == "display_order" {
            conn.execute("UPDATE properties SET display_order = id", [])
                .map_err(step("backfill display_order"))?;
        }
        info!(target: TARGET, event = "schema_migrated", table = "properties", column);
        applied += 1;
    }
    Ok(applied)
}

fn migrate_transactions(conn: &Connection) -> Result<usize> {
    let existing = table_columns(conn, "transactions").map_err(step("inspect transactions"))?;
    if existing.iter().any(|c| c == "property_id") {
        return Ok(0);
    }
    conn.execute_batch(
        "ALTER TABLE transactions ADD COLUMN property_id INTEGER REFERENCES properties(id) ON DELETE SET NULL",
    )
    .map_err(step("property_id"))?;

    // Older rows were tied to their property only by description text, and
    // files written by the first release carry its own reserved tags.
    let mut linked = 0;
    let mut retagged = 0;
    for (tag, legacy) in LEGACY_PROPERTY_TAGS {
        linked += conn
            .execute(
                "UPDATE transactions SET property_id = (
                     SELECT p.id FROM properties p
                     WHERE p.profile_id = transactions.profile_id
                       AND transactions.description IN (?1 || ': ' || p.name, ?2 || ': ' || p.name)
                     ORDER BY p.id LIMIT 1)
                 WHERE property_id IS NULL AND category IN (?1, ?2)",
                params![tag, legacy],
            )
            .map_err(step("backfill property_id"))?;
        retagged += conn
            .execute(
                "UPDATE transactions SET category = ?1 WHERE category = ?2",
                params![tag, legacy],
            )
            .map_err(step("retag legacy property rows"))?;
    }
    info!(
        target: TARGET,
        event = "schema_migrated",
        table = "transactions",
        column = "property_id",
        linked,
        retagged
    );
    Ok(1)
}

pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}

pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

pub fn list_indexes(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='index' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Every schema object as `(type, name, sql)`, ordered, for comparing two
/// schema states.
pub fn schema_fingerprint(conn: &Connection) -> Result<Vec<(String, String, Option<String>)>> {
    let mut stmt =
        conn.prepare("SELECT type, name, sql FROM sqlite_master ORDER BY type, name")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
