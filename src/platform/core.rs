//! Platform models and database queries.

use std::collections::HashMap;

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    database_id::{OwnerId, PlatformId},
    money::read_decimal,
};

/// The fees a platform takes from each income made through it.
///
/// The default schedule charges nothing and is used for incomes that do not
/// reference a platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// The fee as a percentage of the gross amount.
    pub percentage_rate: Decimal,
    /// A flat fee charged per transaction.
    pub fixed_fee: Decimal,
    /// The VAT rate the platform charges on its own fee.
    pub fee_vat_rate: Decimal,
}

/// A platform owned by an owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Platform {
    /// The ID of the platform.
    pub id: PlatformId,
    /// The owner the platform belongs to.
    pub owner_id: OwnerId,
    /// A display name, e.g. "Etsy".
    pub name: String,
    /// The fees charged by the platform.
    #[serde(flatten)]
    pub fees: FeeSchedule,
}

/// The data needed to create a platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewPlatform {
    /// A display name, e.g. "Etsy".
    pub name: String,
    /// The fees charged by the platform.
    #[serde(flatten)]
    pub fees: FeeSchedule,
}

impl NewPlatform {
    fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::MissingField("name"));
        }

        for (field, value) in [
            ("percentage_rate", self.fees.percentage_rate),
            ("fixed_fee", self.fees.fixed_fee),
            ("fee_vat_rate", self.fees.fee_vat_rate),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(Error::InvalidField {
                    field,
                    reason: format!("{value} is negative"),
                });
            }
        }

        Ok(())
    }
}

/// Create a platform for `owner_id`.
///
/// # Errors
/// Returns a validation error if the name is empty or a fee is negative, or
/// an [Error::SqlError] if there is an SQL error.
pub fn create_platform(
    owner_id: OwnerId,
    platform: NewPlatform,
    connection: &Connection,
) -> Result<Platform, Error> {
    platform.validate()?;

    connection.execute(
        "INSERT INTO platform (owner_id, name, percentage_rate, fixed_fee, fee_vat_rate)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            owner_id,
            platform.name.trim(),
            platform.fees.percentage_rate.to_string(),
            platform.fees.fixed_fee.to_string(),
            platform.fees.fee_vat_rate.to_string(),
        ),
    )?;

    Ok(Platform {
        id: connection.last_insert_rowid(),
        owner_id,
        name: platform.name.trim().to_owned(),
        fees: platform.fees,
    })
}

/// Retrieve a platform of `owner_id` by ID.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such platform for the owner.
pub fn get_platform(
    owner_id: OwnerId,
    platform_id: PlatformId,
    connection: &Connection,
) -> Result<Platform, Error> {
    connection
        .prepare(
            "SELECT id, owner_id, name, percentage_rate, fixed_fee, fee_vat_rate
             FROM platform WHERE id = ?1 AND owner_id = ?2",
        )?
        .query_row((platform_id, owner_id), map_row)
        .map_err(|error| error.into())
}

/// Retrieve all platforms of `owner_id` ordered by name.
pub fn list_platforms(owner_id: OwnerId, connection: &Connection) -> Result<Vec<Platform>, Error> {
    connection
        .prepare(
            "SELECT id, owner_id, name, percentage_rate, fixed_fee, fee_vat_rate
             FROM platform WHERE owner_id = ?1 ORDER BY name ASC",
        )?
        .query_map((owner_id,), map_row)?
        .map(|maybe_platform| maybe_platform.map_err(|error| error.into()))
        .collect()
}

/// The fee schedules of all platforms of `owner_id`, keyed by platform ID.
pub fn get_fee_schedules(
    owner_id: OwnerId,
    connection: &Connection,
) -> Result<HashMap<PlatformId, FeeSchedule>, Error> {
    Ok(list_platforms(owner_id, connection)?
        .into_iter()
        .map(|platform| (platform.id, platform.fees))
        .collect())
}

/// Initialize the platform table.
pub fn create_platform_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS platform (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            percentage_rate TEXT NOT NULL,
            fixed_fee TEXT NOT NULL,
            fee_vat_rate TEXT NOT NULL,
            UNIQUE(id, owner_id)
        );

        CREATE INDEX IF NOT EXISTS idx_platform_owner ON platform(owner_id);",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Platform, rusqlite::Error> {
    Ok(Platform {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        fees: FeeSchedule {
            percentage_rate: read_decimal(row, 3)?,
            fixed_fee: read_decimal(row, 4)?,
            fee_vat_rate: read_decimal(row, 5)?,
        },
    })
}
