// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use ledgerkeep::ledger::backup::metadata_path;
use ledgerkeep::{
    delete_backup, list_backups, read_backup_metadata, Storage, StorageConfig, StorageError,
    TxKind,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

async fn setup(max_backups: usize) -> (TempDir, Storage) {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::new(dir.path().join("ledger.sqlite3")).with_max_backups(max_backups);
    let storage = Storage::open(config).await.unwrap();
    (dir, storage)
}

fn profile_names(db: &Path) -> Vec<String> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn.prepare("SELECT name FROM profiles ORDER BY name").unwrap();
    stmt.query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[tokio::test]
async fn backup_copies_data_and_writes_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ledger.sqlite3");
    let storage = Storage::open(StorageConfig::new(&db_path)).await.unwrap();
    let p = storage.create_profile("Main", None).await.unwrap();
    storage
        .add_transaction(p.id, TxKind::Income, Some("Salary"), None, Decimal::from(100))
        .await
        .unwrap();
    storage
        .add_property(p.id, "Car", Decimal::from(40), None)
        .await
        .unwrap();

    let backups = dir.path().join("backups");
    let meta = storage.backup_to(&backups).await.unwrap();

    assert!(meta.backup_path.exists());
    assert!(meta.size_bytes > 0);
    assert_eq!(meta.source_path, db_path);
    assert_eq!(meta.row_counts["profiles"], 1);
    assert_eq!(meta.row_counts["transactions"], 2);
    assert_eq!(meta.row_counts["properties"], 1);

    let copy = Connection::open(&meta.backup_path).unwrap();
    let n: i64 = copy
        .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 2);

    let sidecar = read_backup_metadata(&metadata_path(&meta.backup_path)).unwrap();
    assert_eq!(sidecar, meta);
    assert_eq!(list_backups(&backups).unwrap(), vec![meta]);
}

#[test]
fn listing_a_missing_directory_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(list_backups(&dir.path().join("nope")).unwrap().is_empty());
}

#[tokio::test]
async fn only_the_newest_backups_are_kept() {
    let (dir, storage) = setup(2).await;
    let backups = dir.path().join("backups");

    let mut made = Vec::new();
    for _ in 0..3 {
        made.push(storage.backup_to(&backups).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let kept = list_backups(&backups).unwrap();
    assert_eq!(kept, vec![made[2].clone(), made[1].clone()]);
    assert!(!made[0].backup_path.exists());
    assert!(!metadata_path(&made[0].backup_path).exists());
}

#[tokio::test]
async fn delete_removes_backup_and_sidecar() {
    let (dir, storage) = setup(10).await;
    let backups = dir.path().join("backups");
    let meta = storage.backup_to(&backups).await.unwrap();

    assert!(delete_backup(&meta.backup_path).unwrap());
    assert!(!meta.backup_path.exists());
    assert!(!metadata_path(&meta.backup_path).exists());
    assert!(list_backups(&backups).unwrap().is_empty());
    assert!(!delete_backup(&meta.backup_path).unwrap());

    let err = delete_backup(&dir.path().join("ledger.sqlite3")).unwrap_err();
    assert!(matches!(err, StorageError::Validation { field: "backup_path", .. }));
    assert!(dir.path().join("ledger.sqlite3").exists());
}

#[tokio::test]
async fn restore_brings_back_the_backup_and_keeps_a_snapshot() {
    let (dir, storage) = setup(10).await;
    let backups = dir.path().join("backups");
    let main = storage.create_profile("Main", None).await.unwrap();
    storage
        .add_transaction(main.id, TxKind::Income, Some("Salary"), None, Decimal::from(100))
        .await
        .unwrap();
    let saved = storage.backup_to(&backups).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    storage.create_profile("Later", None).await.unwrap();
    storage
        .add_transaction(main.id, TxKind::Income, Some("Bonus"), None, Decimal::from(50))
        .await
        .unwrap();
    assert_eq!(
        storage.get_total_balance(main.id).await.unwrap(),
        Decimal::from(150)
    );

    let snapshot = storage.restore_from(&saved.backup_path).await.unwrap();

    assert_eq!(snapshot.row_counts["profiles"], 2);
    assert_eq!(profile_names(&snapshot.backup_path), vec!["Later", "Main"]);
    let names: Vec<String> = storage
        .get_profile_list()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Main"]);
    assert_eq!(
        storage.get_total_balance(main.id).await.unwrap(),
        Decimal::from(100)
    );
    assert!(storage.pool().is_initialized());
    assert_eq!(list_backups(&backups).unwrap().len(), 2);

    // Still writable afterwards.
    storage
        .add_transaction(main.id, TxKind::Expense, Some("Food"), None, Decimal::from(30))
        .await
        .unwrap();
    assert_eq!(
        storage.get_transactions_count(main.id, None, None).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn restore_from_a_missing_file_changes_nothing() {
    let (dir, storage) = setup(10).await;
    storage.create_profile("Main", None).await.unwrap();

    let err = storage
        .restore_from(dir.path().join("backups").join("ledgerkeep-nope.sqlite3"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Validation { field: "backup_path", .. }));
    assert!(!dir.path().join("backups").exists());
    assert_eq!(storage.get_profile_list().await.unwrap().len(), 1);
}
