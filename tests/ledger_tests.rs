// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{NaiveDate, NaiveDateTime};
use ledgerkeep::{
    ErrorClass, NewTransaction, PoolConfig, Storage, StorageConfig, StorageError,
    TransactionPatch, TxKind,
};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::time::Duration;
use tempfile::TempDir;

async fn setup_with(pool: PoolConfig, balance_ttl: Duration) -> (TempDir, Storage) {
    ledgerkeep::logging::init();
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::new(dir.path().join("ledger.sqlite3"))
        .with_pool(pool)
        .with_balance_ttl(balance_ttl);
    let storage = Storage::open(config).await.unwrap();
    (dir, storage)
}

async fn setup() -> (TempDir, Storage) {
    let pool = PoolConfig {
        min_connections: 1,
        max_connections: 4,
        connection_timeout: Duration::from_millis(200),
        ..PoolConfig::default()
    };
    setup_with(pool, Duration::from_secs(30)).await
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn count(path: &std::path::Path, sql: &str, id: i64) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(sql, params![id], |r| r.get(0)).unwrap()
}

#[tokio::test]
async fn income_shows_up_in_balance() {
    let (_dir, storage) = setup().await;
    let p = storage.create_profile("Main", None).await.unwrap();

    storage
        .add_transaction(p.id, TxKind::Income, Some("salary"), Some("pay"), dec("1000"))
        .await
        .unwrap();
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("1000"));

    storage
        .add_transaction(p.id, TxKind::Expense, Some("Food"), Some("lunch"), dec("12.35"))
        .await
        .unwrap();
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("987.65"));
}

#[tokio::test]
async fn balance_cache_serves_until_ttl_then_refreshes() {
    let pool = PoolConfig {
        min_connections: 1,
        max_connections: 2,
        ..PoolConfig::default()
    };
    let (dir, storage) = setup_with(pool, Duration::from_millis(100)).await;
    let p = storage.create_profile("Main", None).await.unwrap();
    storage
        .add_transaction(p.id, TxKind::Income, None, None, dec("10"))
        .await
        .unwrap();
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("10"));

    // A write that bypasses the storage service does not evict the entry.
    let raw = Connection::open(dir.path().join("ledger.sqlite3")).unwrap();
    raw.execute(
        "INSERT INTO transactions(profile_id, timestamp, type, amount) VALUES (?1, '2025-01-01 00:00:00', 'income', '5')",
        params![p.id],
    )
    .unwrap();
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("10"));
    assert!(storage.cache().stats().hits >= 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("15"));
}

#[tokio::test]
async fn profile_crud_and_validation() {
    let (_dir, storage) = setup().await;
    let a = storage.create_profile("  Alice ", Some("aGVsbG8=")).await.unwrap();
    assert_eq!(a.name, "Alice");
    storage.create_profile("Bob", None).await.unwrap();

    let names: Vec<String> = storage
        .get_profile_list()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
    assert_eq!(storage.get_profile_id("Alice").await.unwrap(), Some(a.id));
    assert_eq!(storage.get_profile_id("Nobody").await.unwrap(), None);

    // No avatar given: the stored one stays.
    storage.update_profile(a.id, "Alicia", None).await.unwrap();
    let list = storage.get_profile_list().await.unwrap();
    let alicia = list.iter().find(|p| p.id == a.id).unwrap();
    assert_eq!(alicia.name, "Alicia");
    assert_eq!(alicia.avatar.as_deref(), Some("aGVsbG8="));

    let dup = storage.create_profile("Bob", None).await.unwrap_err();
    assert!(matches!(dup, StorageError::ConstraintViolation(_)));
    assert_eq!(dup.class(), ErrorClass::Validation);

    let empty = storage.create_profile("   ", None).await.unwrap_err();
    assert!(matches!(empty, StorageError::Validation { field: "name", .. }));

    let missing = storage.update_profile(999, "X", None).await.unwrap_err();
    assert!(matches!(missing, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn deleting_a_profile_cascades_to_owned_rows() {
    let (dir, storage) = setup().await;
    let path = dir.path().join("ledger.sqlite3");
    let p = storage.create_profile("Main", None).await.unwrap();
    let other = storage.create_profile("Other", None).await.unwrap();

    storage
        .add_category(p.id, TxKind::Expense, "Food", Some("#ff0000"))
        .await
        .unwrap();
    storage
        .add_transaction(p.id, TxKind::Income, Some("salary"), None, dec("100"))
        .await
        .unwrap();
    storage
        .add_property(p.id, "Car", dec("50"), None)
        .await
        .unwrap();
    storage
        .add_transaction(other.id, TxKind::Income, None, None, dec("1"))
        .await
        .unwrap();
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("50"));

    assert!(storage.delete_profile(p.id).await.unwrap());
    assert!(!storage.delete_profile(p.id).await.unwrap());

    for table in ["categories", "transactions", "properties"] {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE profile_id=?1");
        assert_eq!(count(&path, &sql, p.id), 0, "{table} not emptied");
    }
    assert_eq!(
        count(&path, "SELECT COUNT(*) FROM transactions WHERE profile_id=?1", other.id),
        1
    );
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
async fn categories_are_split_by_kind() {
    let (_dir, storage) = setup().await;
    let p = storage.create_profile("Main", None).await.unwrap();
    storage
        .add_category(p.id, TxKind::Expense, "Rent", None)
        .await
        .unwrap();
    storage
        .add_category(p.id, TxKind::Expense, "Food", Some("green_400"))
        .await
        .unwrap();
    storage
        .add_category(p.id, TxKind::Income, "Food", None)
        .await
        .unwrap();

    let cats = storage.load_categories(p.id).await.unwrap();
    let expense: Vec<&str> = cats.expense.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(expense, vec!["Food", "Rent"]);
    assert!(cats.contains(TxKind::Income, "Food"));

    let dup = storage
        .add_category(p.id, TxKind::Expense, "Rent", None)
        .await
        .unwrap_err();
    assert!(matches!(dup, StorageError::ConstraintViolation(_)));

    let bad_color = storage
        .add_category(p.id, TxKind::Expense, "Fun", Some("#12"))
        .await
        .unwrap_err();
    assert!(matches!(bad_color, StorageError::Validation { field: "color", .. }));

    assert!(storage
        .delete_category(p.id, TxKind::Expense, "Food")
        .await
        .unwrap());
    let cats = storage.load_categories(p.id).await.unwrap();
    assert!(!cats.contains(TxKind::Expense, "Food"));
    assert!(cats.contains(TxKind::Income, "Food"));
}

#[tokio::test]
async fn transactions_page_newest_first_with_inclusive_days() {
    let (_dir, storage) = setup().await;
    let p = storage.create_profile("Main", None).await.unwrap();
    for (ts, amount) in [
        ("2025-01-01 09:00:00", "1"),
        ("2025-01-15 23:59:59", "2"),
        ("2025-01-31 23:30:00", "3"),
        ("2025-02-01 00:00:00", "4"),
    ] {
        let new = NewTransaction::new(TxKind::Expense, dec(amount))
            .category("Food")
            .at(at(ts));
        storage.record_transaction(p.id, new).await.unwrap();
    }

    let all = storage
        .load_transactions(p.id, None, None, None, 0)
        .await
        .unwrap();
    let amounts: Vec<Decimal> = all.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![dec("4"), dec("3"), dec("2"), dec("1")]);

    let january = storage
        .load_transactions(p.id, Some(day("2025-01-01")), Some(day("2025-01-31")), None, 0)
        .await
        .unwrap();
    assert_eq!(january.len(), 3);
    assert_eq!(
        storage
            .get_transactions_count(p.id, Some(day("2025-01-01")), Some(day("2025-01-31")))
            .await
            .unwrap(),
        3
    );

    let page = storage
        .load_transactions(p.id, None, None, Some(2), 1)
        .await
        .unwrap();
    let amounts: Vec<Decimal> = page.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![dec("3"), dec("2")]);

    let since_mid = storage
        .get_transactions_count(p.id, Some(day("2025-01-15")), None)
        .await
        .unwrap();
    assert_eq!(since_mid, 3);
}

#[tokio::test]
async fn update_and_delete_transaction() {
    let (_dir, storage) = setup().await;
    let p = storage.create_profile("Main", None).await.unwrap();
    let t = storage
        .add_transaction(p.id, TxKind::Expense, Some("Food"), Some("lunch"), dec("10"))
        .await
        .unwrap();
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("-10"));

    storage
        .update_transaction(
            t.id,
            TransactionPatch {
                kind: Some(TxKind::Income),
                amount: Some(dec("25")),
                description: Some("  ".to_string()),
                ..TransactionPatch::default()
            },
        )
        .await
        .unwrap();
    let rows = storage
        .load_transactions(p.id, None, None, None, 0)
        .await
        .unwrap();
    assert_eq!(rows[0].kind, TxKind::Income);
    assert_eq!(rows[0].amount, dec("25"));
    assert_eq!(rows[0].category.as_deref(), Some("Food"));
    assert_eq!(rows[0].description, None);
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("25"));

    let negative = storage
        .update_transaction(
            t.id,
            TransactionPatch {
                amount: Some(dec("-1")),
                ..TransactionPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(negative.class(), ErrorClass::Validation);

    let missing = storage
        .update_transaction(
            9999,
            TransactionPatch {
                amount: Some(dec("1")),
                ..TransactionPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound { entity: "transaction", .. }));

    assert!(storage.delete_transaction(t.id).await.unwrap());
    assert!(!storage.delete_transaction(t.id).await.unwrap());
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
async fn stats_and_summary_leave_out_mirrored_rows() {
    let (_dir, storage) = setup().await;
    let p = storage.create_profile("Main", None).await.unwrap();
    let d = day("2025-03-10");
    let on = |h: u32| d.and_hms_opt(h, 0, 0).unwrap();

    for new in [
        NewTransaction::new(TxKind::Income, dec("500"))
            .category("Initial balance")
            .at(on(8)),
        NewTransaction::new(TxKind::Income, dec("1000"))
            .category("Salary")
            .at(on(9)),
        NewTransaction::new(TxKind::Income, dec("200"))
            .category("Salary")
            .at(on(10)),
        NewTransaction::new(TxKind::Expense, dec("30"))
            .category("Food")
            .description("Groceries")
            .at(on(11)),
        NewTransaction::new(TxKind::Expense, dec("20"))
            .category("Food")
            .description("Groceries")
            .at(on(12)),
    ] {
        storage.record_transaction(p.id, new).await.unwrap();
    }
    storage
        .add_property(p.id, "Flat", dec("9000"), None)
        .await
        .unwrap();

    let stats = storage.get_transactions_stats(p.id, None, None).await.unwrap();
    assert_eq!(stats.income, dec("1700"));
    assert_eq!(stats.expense, dec("50"));
    assert_eq!(stats.net(), dec("1650"));

    let summary = storage.get_category_summary(p.id, Some(d), Some(d)).await.unwrap();
    assert_eq!(summary.income_by_category.len(), 1);
    assert_eq!(summary.income_by_category["Salary"], dec("1200"));
    assert_eq!(summary.expense_by_description["Groceries"], dec("50"));

    // The balance itself does include the purchase.
    assert_eq!(storage.get_total_balance(p.id).await.unwrap(), dec("-7350"));
}

#[tokio::test]
async fn settings_round_trip_with_default() {
    let (_dir, storage) = setup().await;
    assert_eq!(
        storage.get_setting("language", Some("en")).await.unwrap().as_deref(),
        Some("en")
    );
    assert_eq!(storage.get_setting("language", None).await.unwrap(), None);

    storage.save_setting("language", "uk").await.unwrap();
    storage.save_setting("language", "de").await.unwrap();
    assert_eq!(
        storage.get_setting("language", Some("en")).await.unwrap().as_deref(),
        Some("de")
    );

    let bad = storage.save_setting("bad key!", "x").await.unwrap_err();
    assert!(matches!(bad, StorageError::Validation { field: "key", .. }));
}

#[tokio::test]
async fn saturated_pool_falls_back_to_direct_connection() {
    let pool = PoolConfig {
        min_connections: 1,
        max_connections: 1,
        connection_timeout: Duration::from_millis(100),
        ..PoolConfig::default()
    };
    let (_dir, storage) = setup_with(pool, Duration::from_secs(30)).await;
    storage.create_profile("Main", None).await.unwrap();

    let held = storage.acquire("test").await.unwrap();
    assert!(held.is_pooled());

    let profiles = storage.get_profile_list().await.unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(storage.pool().status().total, 1);
    drop(held);
    assert_eq!(storage.pool().status().idle, 1);
}

#[tokio::test]
async fn shutdown_clears_pool_and_cache() {
    let (_dir, storage) = setup().await;
    let p = storage.create_profile("Main", None).await.unwrap();
    storage.get_total_balance(p.id).await.unwrap();
    assert_eq!(storage.cache().stats().entries, 1);

    storage.shutdown().await;
    assert_eq!(storage.cache().stats().entries, 0);
    assert_eq!(storage.pool().status().total, 0);
}
