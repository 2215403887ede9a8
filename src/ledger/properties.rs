// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Properties and the ledger rows mirrored from them.
//!
//! A purchase writes an expense, a sale writes an income, and both carry the
//! property's id in `transactions.property_id`. Every operation that touches
//! both tables runs in one IMMEDIATE transaction.

use crate::error::{Result, StorageError};
use crate::ledger::transactions::insert_transaction;
use crate::logging::TARGET;
use crate::models::{
    purchase_description, sale_description, NewTransaction, Property, PropertyStatus, TxKind,
    PROPERTY_PURCHASE_CATEGORY, PROPERTY_SALE_CATEGORY,
};
use crate::storage::Storage;
use crate::utils::{decimal_at, now_local, opt_decimal_at, ts_value, validate_name, validate_price};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::{info, warn};

const PROPERTY_COLUMNS: &str = "id, profile_id, name, price, image_b64, status, display_order, \
     created_timestamp, selling_price, sold_timestamp";

fn map_property(r: &Row<'_>) -> rusqlite::Result<Property> {
    Ok(Property {
        id: r.get(0)?,
        profile_id: r.get(1)?,
        name: r.get(2)?,
        price: decimal_at(r, 3)?,
        image: r.get(4)?,
        status: r.get(5)?,
        display_order: r.get(6)?,
        created_timestamp: r.get(7)?,
        selling_price: opt_decimal_at(r, 8)?,
        sold_timestamp: r.get(9)?,
    })
}

pub fn load_properties(
    conn: &Connection,
    profile_id: i64,
    status: PropertyStatus,
) -> Result<Vec<Property>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROPERTY_COLUMNS} FROM properties
         WHERE profile_id=?1 AND status=?2 ORDER BY display_order, id"
    ))?;
    let rows = stmt
        .query_map(params![profile_id, status], map_property)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_property(conn: &Connection, id: i64) -> Result<Property> {
    conn.query_row(
        &format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id=?1"),
        params![id],
        map_property,
    )
    .optional()?
    .ok_or_else(|| StorageError::not_found("property", id))
}

fn expect_status(property: &Property, expected: PropertyStatus) -> Result<()> {
    if property.status != expected {
        return Err(StorageError::InvalidState {
            entity: "property",
            id: property.id,
            actual: property.status.to_string(),
            expected: expected.as_str(),
        });
    }
    Ok(())
}

/// Insert the property at the end of the profile's ordering together with
/// its purchase expense.
pub fn add_property(
    conn: &mut Connection,
    profile_id: i64,
    name: &str,
    price: Decimal,
    image: Option<&str>,
) -> Result<Property> {
    let name = validate_name("name", name)?;
    let price = validate_price("price", price)?;
    let created = now_local();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let display_order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(display_order), 0) + 1 FROM properties WHERE profile_id=?1",
        params![profile_id],
        |r| r.get(0),
    )?;
    tx.execute(
        "INSERT INTO properties(profile_id, name, price, image_b64, status, display_order, created_timestamp)
         VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6)",
        params![
            profile_id,
            name,
            price.to_string(),
            image,
            display_order,
            ts_value(created)
        ],
    )?;
    let id = tx.last_insert_rowid();
    let purchase = NewTransaction::new(TxKind::Expense, price)
        .category(PROPERTY_PURCHASE_CATEGORY)
        .description(purchase_description(&name))
        .at(created);
    insert_transaction(&tx, profile_id, &purchase, Some(id))?;
    tx.commit()?;

    Ok(Property {
        id,
        profile_id,
        name,
        price,
        image: image.map(str::to_string),
        status: PropertyStatus::Active,
        display_order,
        created_timestamp: Some(created),
        selling_price: None,
        sold_timestamp: None,
    })
}

/// Change name, price and image (a `None` image keeps the stored one) and
/// bring the purchase expense in line. Returns the owning profile.
pub fn update_property(
    conn: &mut Connection,
    id: i64,
    name: &str,
    price: Decimal,
    image: Option<&str>,
) -> Result<i64> {
    let name = validate_name("name", name)?;
    let price = validate_price("price", price)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let profile_id: i64 = tx
        .query_row(
            "UPDATE properties SET name=?2, price=?3, image_b64=COALESCE(?4, image_b64)
             WHERE id=?1 RETURNING profile_id",
            params![id, name, price.to_string(), image],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("property", id))?;
    let purchases = tx.execute(
        "UPDATE transactions SET amount=?2, description=?3 WHERE property_id=?1 AND type=?4",
        params![id, price.to_string(), purchase_description(&name), TxKind::Expense],
    )?;
    if purchases == 0 {
        warn!(target: TARGET, event = "mirrored_link_missing", property_id = id, kind = "purchase");
    }
    tx.execute(
        "UPDATE transactions SET description=?2 WHERE property_id=?1 AND type=?3",
        params![id, sale_description(&name), TxKind::Income],
    )?;
    tx.commit()?;
    Ok(profile_id)
}

/// Active to sold, plus the sale income.
pub fn sell_property(conn: &mut Connection, id: i64, selling_price: Decimal) -> Result<Property> {
    let selling_price = validate_price("selling_price", selling_price)?;
    let sold_at = now_local();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut property = get_property(&tx, id)?;
    expect_status(&property, PropertyStatus::Active)?;
    tx.execute(
        "UPDATE properties SET status='sold', selling_price=?2, sold_timestamp=?3 WHERE id=?1",
        params![id, selling_price.to_string(), ts_value(sold_at)],
    )?;
    let sale = NewTransaction::new(TxKind::Income, selling_price)
        .category(PROPERTY_SALE_CATEGORY)
        .description(sale_description(&property.name))
        .at(sold_at);
    insert_transaction(&tx, property.profile_id, &sale, Some(id))?;
    tx.commit()?;

    property.status = PropertyStatus::Sold;
    property.selling_price = Some(selling_price);
    property.sold_timestamp = Some(sold_at);
    Ok(property)
}

/// Sold back to active, dropping the newest sale income linked to the
/// property. A missing sale row is logged and the flip still happens, since
/// the ledger then already matches the pre-sale state.
pub fn restore_property(conn: &mut Connection, id: i64) -> Result<Property> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut property = get_property(&tx, id)?;
    expect_status(&property, PropertyStatus::Sold)?;
    tx.execute(
        "UPDATE properties SET status='active', selling_price=NULL, sold_timestamp=NULL WHERE id=?1",
        params![id],
    )?;
    let removed = tx.execute(
        "DELETE FROM transactions WHERE id = (
             SELECT id FROM transactions
             WHERE property_id=?1 AND type=?2
             ORDER BY id DESC LIMIT 1)",
        params![id, TxKind::Income],
    )?;
    tx.commit()?;
    if removed == 0 {
        warn!(target: TARGET, event = "mirrored_link_missing", property_id = id, kind = "sale");
    }

    property.status = PropertyStatus::Active;
    property.selling_price = None;
    property.sold_timestamp = None;
    Ok(property)
}

/// Remove the property and every ledger row mirrored from it. Returns the
/// owning profile, or `None` when the id was unknown.
pub fn delete_property(conn: &mut Connection, id: i64) -> Result<Option<i64>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mirrored = tx.execute("DELETE FROM transactions WHERE property_id=?1", params![id])?;
    let owner: Option<i64> = tx
        .query_row(
            "DELETE FROM properties WHERE id=?1 RETURNING profile_id",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    tx.commit()?;
    if owner.is_some() {
        info!(target: TARGET, event = "property_deleted", property_id = id, mirrored);
    }
    Ok(owner)
}

/// `display_order = position` for each id, one statement per id. Ids outside
/// the `profile_id` + `status` partition are skipped. Returns the rows updated.
pub fn reorder_properties(
    conn: &Connection,
    profile_id: i64,
    status: PropertyStatus,
    ordered_ids: &[i64],
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE properties SET display_order=?1 WHERE id=?2 AND profile_id=?3 AND status=?4",
    )?;
    let mut updated = 0;
    for (position, id) in ordered_ids.iter().enumerate() {
        updated += stmt.execute(params![position as i64, id, profile_id, status])?;
    }
    Ok(updated)
}

impl Storage {
    pub async fn load_properties(
        &self,
        profile_id: i64,
        status: PropertyStatus,
    ) -> Result<Vec<Property>> {
        self.run("load_properties", move |conn| {
            load_properties(conn, profile_id, status)
        })
        .await
    }

    pub async fn get_property(&self, id: i64) -> Result<Property> {
        self.run("get_property", move |conn| get_property(conn, id)).await
    }

    pub async fn add_property(
        &self,
        profile_id: i64,
        name: &str,
        price: Decimal,
        image: Option<&str>,
    ) -> Result<Property> {
        let name = name.to_string();
        let image = image.map(str::to_string);
        let property = self
            .run("add_property", move |conn| {
                add_property(conn, profile_id, &name, price, image.as_deref())
            })
            .await?;
        self.invalidate_balance(profile_id);
        info!(
            target: TARGET,
            event = "property_added",
            profile_id,
            property_id = property.id
        );
        Ok(property)
    }

    pub async fn update_property(
        &self,
        id: i64,
        name: &str,
        price: Decimal,
        image: Option<&str>,
    ) -> Result<()> {
        let name = name.to_string();
        let image = image.map(str::to_string);
        let profile_id = self
            .run("update_property", move |conn| {
                update_property(conn, id, &name, price, image.as_deref())
            })
            .await?;
        self.invalidate_balance(profile_id);
        Ok(())
    }

    pub async fn sell_property(&self, id: i64, selling_price: Decimal) -> Result<Property> {
        let property = self
            .run("sell_property", move |conn| {
                sell_property(conn, id, selling_price)
            })
            .await?;
        self.invalidate_balance(property.profile_id);
        info!(target: TARGET, event = "property_sold", property_id = id);
        Ok(property)
    }

    pub async fn restore_property(&self, id: i64) -> Result<Property> {
        let property = self
            .run("restore_property", move |conn| restore_property(conn, id))
            .await?;
        self.invalidate_balance(property.profile_id);
        info!(target: TARGET, event = "property_restored", property_id = id);
        Ok(property)
    }

    pub async fn delete_property_permanently(&self, id: i64) -> Result<bool> {
        let owner = self
            .run("delete_property_permanently", move |conn| {
                delete_property(conn, id)
            })
            .await?;
        if let Some(profile_id) = owner {
            self.invalidate_balance(profile_id);
        }
        Ok(owner.is_some())
    }

    pub async fn update_properties_order(
        &self,
        profile_id: i64,
        status: PropertyStatus,
        ordered_ids: &[i64],
    ) -> Result<usize> {
        let ids = ordered_ids.to_vec();
        self.run("update_properties_order", move |conn| {
            reorder_properties(conn, profile_id, status, &ids)
        })
        .await
    }
}
