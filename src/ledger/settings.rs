// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::Result;
use crate::storage::Storage;
use crate::utils::validate_setting_key;
use rusqlite::{params, Connection, OptionalExtension};

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v)
}

pub fn save_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let key = validate_setting_key(key)?;
    conn.execute(
        "INSERT INTO app_settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

impl Storage {
    /// The stored value, else `default`.
    pub async fn get_setting(&self, key: &str, default: Option<&str>) -> Result<Option<String>> {
        let key = key.to_string();
        let stored = self
            .run("get_setting", move |conn| get_setting(conn, &key))
            .await?;
        Ok(stored.or_else(|| default.map(str::to_string)))
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run("save_setting", move |conn| save_setting(conn, &key, &value))
            .await
    }
}
