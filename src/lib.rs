// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod fallback;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod pool;
pub mod storage;
pub mod utils;

pub use config::{PoolConfig, StorageConfig};
pub use error::{ErrorClass, Result, StorageError};
pub use ledger::backup::{delete_backup, list_backups, read_backup_metadata, BackupMetadata};
pub use models::*;
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use storage::Storage;
pub use utils::Period;
