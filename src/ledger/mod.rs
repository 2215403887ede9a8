// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Ledger operations, one module per entity.
//!
//! Each module has plain functions over a `rusqlite::Connection` and an
//! `impl Storage` block exposing the async API on top of them.

pub mod backup;
pub mod categories;
pub mod profiles;
pub mod properties;
pub mod reports;
pub mod settings;
pub mod transactions;
