// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, StorageError};
use crate::logging::TARGET;
use crate::models::Profile;
use crate::storage::Storage;
use crate::utils::validate_name;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

pub fn list_profiles(conn: &Connection) -> Result<Vec<Profile>> {
    let mut stmt = conn.prepare("SELECT id, name, avatar_b64 FROM profiles ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Profile {
                id: r.get(0)?,
                name: r.get(1)?,
                avatar: r.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn profile_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM profiles WHERE name=?1",
            params![name.trim()],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn insert_profile(conn: &Connection, name: &str, avatar: Option<&str>) -> Result<Profile> {
    let name = validate_name("name", name)?;
    conn.execute(
        "INSERT INTO profiles(name, avatar_b64) VALUES (?1, ?2)",
        params![name, avatar],
    )?;
    Ok(Profile {
        id: conn.last_insert_rowid(),
        name,
        avatar: avatar.map(str::to_string),
    })
}

/// Rename a profile; a `None` avatar keeps the stored one.
pub fn rename_profile(conn: &Connection, id: i64, name: &str, avatar: Option<&str>) -> Result<()> {
    let name = validate_name("name", name)?;
    let n = conn.execute(
        "UPDATE profiles SET name=?2, avatar_b64=COALESCE(?3, avatar_b64) WHERE id=?1",
        params![id, name, avatar],
    )?;
    if n == 0 {
        return Err(StorageError::not_found("profile", id));
    }
    Ok(())
}

/// Owned categories, transactions and properties go with it through the
/// `ON DELETE CASCADE` foreign keys.
pub fn remove_profile(conn: &Connection, id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM profiles WHERE id=?1", params![id])?;
    Ok(n > 0)
}

impl Storage {
    pub async fn get_profile_list(&self) -> Result<Vec<Profile>> {
        self.run("get_profile_list", |conn| list_profiles(conn)).await
    }

    pub async fn get_profile_id(&self, name: &str) -> Result<Option<i64>> {
        let name = name.to_string();
        self.run("get_profile_id", move |conn| profile_id_by_name(conn, &name))
            .await
    }

    pub async fn create_profile(&self, name: &str, avatar: Option<&str>) -> Result<Profile> {
        let name = name.to_string();
        let avatar = avatar.map(str::to_string);
        let profile = self
            .run("create_profile", move |conn| {
                insert_profile(conn, &name, avatar.as_deref())
            })
            .await?;
        info!(target: TARGET, event = "profile_created", profile_id = profile.id);
        Ok(profile)
    }

    pub async fn update_profile(&self, id: i64, name: &str, avatar: Option<&str>) -> Result<()> {
        let name = name.to_string();
        let avatar = avatar.map(str::to_string);
        self.run("update_profile", move |conn| {
            rename_profile(conn, id, &name, avatar.as_deref())
        })
        .await
    }

    pub async fn delete_profile(&self, id: i64) -> Result<bool> {
        let removed = self
            .run("delete_profile", move |conn| remove_profile(conn, id))
            .await?;
        self.invalidate_balance(id);
        if removed {
            info!(target: TARGET, event = "profile_deleted", profile_id = id);
        }
        Ok(removed)
    }
}
