//! The fiscal profile of an owner and the persisted state of the VAT workflow.

use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, database_id::OwnerId, transaction::TransactionBuilder};

/// Where an owner is in the VAT liability workflow.
///
/// The workflow is cyclic: an owner who becomes subject to VAT can later
/// revert to the franchise when their revenue drops back under the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FiscalState {
    /// The owner benefits from the VAT franchise.
    NotSubject,
    /// A submitted income would take the owner over the VAT threshold. It is
    /// held here, unsaved, until the owner says how VAT was invoiced.
    PendingActivation {
        /// The submitted transactions.
        trigger: PendingTrigger,
    },
    /// The owner charges VAT.
    Subject,
    /// The owner's revenue dropped back to or under the VAT threshold and
    /// the owner has not yet said whether to leave VAT liability.
    PendingReversion {
        /// The fiscal year whose total dropped.
        year: i32,
        /// The year's revenue after the change.
        year_total: Decimal,
        /// The VAT franchise threshold in effect.
        threshold: Decimal,
    },
}

impl FiscalState {
    /// The short name of the state, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            FiscalState::NotSubject => "not_subject",
            FiscalState::PendingActivation { .. } => "pending_activation",
            FiscalState::Subject => "subject",
            FiscalState::PendingReversion { .. } => "pending_reversion",
        }
    }
}

/// An income submission that crossed the VAT threshold and has not been saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTrigger {
    /// The submitted transaction.
    pub template: TransactionBuilder,
    /// The backfilled occurrences when the submitted transaction recurs.
    #[serde(default)]
    pub occurrences: Vec<TransactionBuilder>,
    /// The fiscal year whose threshold was crossed.
    pub year: i32,
    /// The year's revenue before the submission.
    pub year_total: Decimal,
    /// The VAT franchise threshold in effect.
    pub threshold: Decimal,
}

impl PendingTrigger {
    /// The submitted transactions, template first.
    pub fn submitted(&self) -> impl Iterator<Item = &TransactionBuilder> {
        std::iter::once(&self.template).chain(self.occurrences.iter())
    }

    /// The revenue the submission adds to the crossed year.
    pub fn amount(&self) -> Decimal {
        self.submitted()
            .filter_map(TransactionBuilder::revenue_contribution)
            .filter(|contribution| contribution.year == self.year)
            .map(|contribution| contribution.amount)
            .sum()
    }

    /// The date of the first submitted transaction dated in the crossed year.
    pub fn date(&self) -> Date {
        self.submitted()
            .map(|builder| builder.date)
            .find(|date| date.year() == self.year)
            .unwrap_or(self.template.date)
    }
}

/// The VAT status of an owner.
///
/// `is_subject_to_vat` is true exactly when `state` is
/// [FiscalState::Subject] or [FiscalState::PendingReversion].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiscalProfile {
    /// The owner the profile belongs to.
    pub owner_id: OwnerId,
    /// Whether the owner charges VAT.
    pub is_subject_to_vat: bool,
    /// When the owner became subject to VAT.
    pub vat_activation_date: Option<Date>,
    /// The workflow state.
    #[serde(flatten)]
    pub state: FiscalState,
    /// Incremented on every write, used to detect concurrent changes.
    pub version: i64,
}

impl FiscalProfile {
    /// The default profile for an owner seen for the first time.
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            is_subject_to_vat: false,
            vat_activation_date: None,
            state: FiscalState::NotSubject,
            version: 0,
        }
    }

    /// The profile after the owner becomes subject to VAT on `activation_date`.
    pub fn activated(&self, activation_date: Date) -> Self {
        Self {
            is_subject_to_vat: true,
            vat_activation_date: Some(activation_date),
            state: FiscalState::Subject,
            ..self.clone()
        }
    }

    /// The profile after the owner returns to the VAT franchise.
    pub fn reverted(&self) -> Self {
        Self {
            is_subject_to_vat: false,
            vat_activation_date: None,
            state: FiscalState::NotSubject,
            ..self.clone()
        }
    }

    /// The profile with a different workflow state, keeping the VAT fields.
    pub fn with_state(&self, state: FiscalState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// The VAT rate applied to new incomes when none is given.
    pub fn default_vat_rate(&self) -> Decimal {
        if self.is_subject_to_vat {
            crate::money::STANDARD_VAT_RATE
        } else {
            Decimal::ZERO
        }
    }
}

/// Retrieve the fiscal profile of `owner_id`, creating the default profile on first access.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error, or an
/// [Error::JSONSerializationError] if the stored state cannot be read.
pub fn get_fiscal_profile(owner_id: OwnerId, connection: &Connection) -> Result<FiscalProfile, Error> {
    let default_state = serde_json::to_string(&FiscalState::NotSubject)?;
    connection.execute(
        "INSERT OR IGNORE INTO fiscal_profile (owner_id, is_subject_to_vat, vat_activation_date, state, version)
         VALUES (?1, 0, NULL, ?2, 0)",
        (owner_id, default_state),
    )?;

    let (profile, state_json) = connection
        .prepare(
            "SELECT owner_id, is_subject_to_vat, vat_activation_date, version, state
             FROM fiscal_profile WHERE owner_id = ?1",
        )?
        .query_row((owner_id,), map_row)?;

    Ok(FiscalProfile {
        state: serde_json::from_str(&state_json)?,
        ..profile
    })
}

/// Write `profile`, provided nobody else wrote it since it was read.
///
/// The stored version must equal `profile.version`. On success the returned
/// profile carries the incremented version.
///
/// # Errors
/// Returns [Error::FiscalProfileConflict] if the stored version differs,
/// or an [Error::SqlError] if there is some other SQL error.
pub fn write_fiscal_profile(
    profile: &FiscalProfile,
    connection: &Connection,
) -> Result<FiscalProfile, Error> {
    let state_json = serde_json::to_string(&profile.state)?;

    let rows_affected = connection.execute(
        "UPDATE fiscal_profile
         SET is_subject_to_vat = ?1, vat_activation_date = ?2, state = ?3, version = version + 1
         WHERE owner_id = ?4 AND version = ?5",
        (
            profile.is_subject_to_vat,
            profile.vat_activation_date,
            state_json,
            profile.owner_id,
            profile.version,
        ),
    )?;

    if rows_affected == 0 {
        tracing::warn!(
            "Fiscal profile of owner {} changed since version {}",
            profile.owner_id,
            profile.version
        );
        return Err(Error::FiscalProfileConflict);
    }

    Ok(FiscalProfile {
        version: profile.version + 1,
        ..profile.clone()
    })
}

/// Create the fiscal profile table.
pub fn create_fiscal_profile_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS fiscal_profile (
            owner_id INTEGER PRIMARY KEY,
            is_subject_to_vat INTEGER NOT NULL,
            vat_activation_date TEXT,
            state TEXT NOT NULL,
            version INTEGER NOT NULL
        )",
        (),
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<(FiscalProfile, String), rusqlite::Error> {
    let profile = FiscalProfile {
        owner_id: row.get(0)?,
        is_subject_to_vat: row.get(1)?,
        vat_activation_date: row.get(2)?,
        version: row.get(3)?,
        state: FiscalState::NotSubject,
    };

    Ok((profile, row.get(4)?))
}
