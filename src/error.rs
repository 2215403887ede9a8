// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::ErrorCode;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection pool exhausted: {max} connections busy after waiting {waited:?}")]
    ConnectionExhausted { max: usize, waited: Duration },

    #[error("schema migration failed at '{step}': {source}")]
    SchemaMigration {
        step: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The merge transaction was rolled back; nothing was changed.
    #[error("category merge rolled back: {source}")]
    MergeRolledBack {
        #[source]
        source: Box<StorageError>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} {id} is {actual}, expected {expected}")]
    InvalidState {
        entity: &'static str,
        id: i64,
        actual: String,
        expected: &'static str,
    },

    #[error("corrupt value in column '{column}': {value}")]
    CorruptValue { column: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not determine platform-specific data dir")]
    NoDataDir,

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// The lease's connection went back to the pool from a statement that
    /// was still running when its `interact` future was dropped.
    #[error("connection lease lost: a dropped operation still owned its connection")]
    LeaseLost,

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                StorageError::ConstraintViolation(
                    msg.clone().unwrap_or_else(|| e.to_string()),
                )
            }
            _ => StorageError::Sqlite(err),
        }
    }
}

/// How a failure should surface to the person using the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input or a rejected write; show inline next to the form.
    Validation,
    /// Pool exhausted, migration failed, file unreadable: "storage unavailable".
    Unavailable,
    /// Anything else; a bug or a corrupted row.
    Internal,
}

impl StorageError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StorageError::Validation { .. }
            | StorageError::ConstraintViolation(_)
            | StorageError::NotFound { .. }
            | StorageError::InvalidState { .. } => ErrorClass::Validation,
            StorageError::MergeRolledBack { source } => source.class(),
            StorageError::ConnectionExhausted { .. }
            | StorageError::SchemaMigration { .. }
            | StorageError::Config(_)
            | StorageError::NoDataDir
            | StorageError::Io(_) => ErrorClass::Unavailable,
            StorageError::Sqlite(e) => match e.sqlite_error_code() {
                Some(
                    ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::ReadOnly
                    | ErrorCode::DiskFull,
                ) => ErrorClass::Unavailable,
                _ => ErrorClass::Internal,
            },
            StorageError::CorruptValue { .. }
            | StorageError::LeaseLost
            | StorageError::Task(_)
            | StorageError::Json(_) => ErrorClass::Internal,
        }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        StorageError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        StorageError::NotFound { entity, id }
    }
}
