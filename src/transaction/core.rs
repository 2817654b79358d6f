//! Defines the core data models and database queries for transactions.

use std::{fmt, str::FromStr};

use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::{
    Error,
    database_id::{OwnerId, PlatformId, TransactionId},
    money::{read_decimal, vat_amount},
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether money was earned or spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Money earned, e.g. a sale or an invoice paid by a client.
    Income,
    /// Money spent, e.g. materials or a subscription.
    Expense,
}

/// The French tax category of an income, which selects its social contribution rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    /// Liberal services (bénéfices non commerciaux).
    Bnc,
    /// Commercial services (bénéfices industriels et commerciaux).
    Bic,
    /// Sales of goods.
    Vente,
}

/// Where an income is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeStatus {
    /// The money has been received.
    Confirmed,
    /// The money was received and later paid back.
    Refunded,
    /// A quote has been sent but not accepted.
    QuoteSent,
    /// A quote has been accepted but not paid.
    QuoteSigned,
}

impl IncomeStatus {
    /// Quote-stage incomes are left out of every revenue total.
    pub fn is_quote(self) -> bool {
        matches!(self, IncomeStatus::QuoteSent | IncomeStatus::QuoteSigned)
    }
}

/// How often a recurring transaction repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Once per calendar month.
    Monthly,
    /// Once per calendar year.
    Annual,
}

/// Describes how a transaction repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// How often the transaction repeats.
    pub frequency: Frequency,
    /// The last date an occurrence may fall on. `None` repeats indefinitely.
    #[serde(default)]
    pub end_date: Option<Date>,
}

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// `amount` never includes VAT, the VAT is derived from `vat_rate` and kept
/// in `vat_amount`.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The owner the transaction belongs to.
    pub owner_id: OwnerId,
    /// Whether the transaction is an income or an expense.
    pub kind: TransactionKind,
    /// The tax-exclusive amount of money.
    pub amount: Decimal,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// A free text category, e.g. "Materials".
    pub category: Option<String>,
    /// The platform the income was made through, if any.
    pub platform_id: Option<PlatformId>,
    /// The VAT rate as a percentage, e.g. 20.
    pub vat_rate: Decimal,
    /// The VAT due on `amount`.
    pub vat_amount: Decimal,
    /// How the transaction repeats. Only set on the transaction the series was created from.
    pub recurrence: Option<Recurrence>,
    /// The ID of the transaction a recurring series was created from.
    pub series_id: Option<TransactionId>,
    /// The tax category of an income.
    pub tax_category: Option<TaxCategory>,
    /// The status of an income.
    pub status: Option<IncomeStatus>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        owner_id: OwnerId,
        kind: TransactionKind,
        amount: Decimal,
        date: Date,
    ) -> TransactionBuilder {
        TransactionBuilder {
            owner_id,
            kind,
            amount,
            date,
            description: String::new(),
            category: None,
            platform_id: None,
            vat_rate: Decimal::ZERO,
            recurrence: None,
            tax_category: None,
            status: match kind {
                TransactionKind::Income => Some(IncomeStatus::Confirmed),
                TransactionKind::Expense => None,
            },
        }
    }

    /// The amount this transaction adds to the revenue of its fiscal year, if any.
    pub fn revenue_contribution(&self) -> Option<RevenueContribution> {
        revenue_contribution(self.kind, self.status, self.amount, self.date)
    }
}

/// The part of a transaction that counts towards a fiscal year's revenue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevenueContribution {
    /// The fiscal year.
    pub year: i32,
    /// The tax-exclusive amount.
    pub amount: Decimal,
}

fn revenue_contribution(
    kind: TransactionKind,
    status: Option<IncomeStatus>,
    amount: Decimal,
    date: Date,
) -> Option<RevenueContribution> {
    let counted = kind == TransactionKind::Income && !status.is_some_and(IncomeStatus::is_quote);

    counted.then_some(RevenueContribution {
        year: date.year(),
        amount,
    })
}

/// A builder for creating [Transaction] instances.
///
/// This is also the shape of a transaction that has been submitted but not
/// saved yet, e.g. while it waits for the owner to decide about VAT.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TransactionBuilder {
    /// The owner the transaction belongs to.
    pub owner_id: OwnerId,
    /// Whether the transaction is an income or an expense.
    pub kind: TransactionKind,
    /// The tax-exclusive amount, always positive.
    pub amount: Decimal,
    /// The date when the transaction occurred.
    pub date: Date,
    /// A human-readable description of the transaction.
    pub description: String,
    /// A free text category.
    pub category: Option<String>,
    /// The platform whose fee schedule applies.
    pub platform_id: Option<PlatformId>,
    /// The VAT rate as a percentage.
    pub vat_rate: Decimal,
    /// How the transaction repeats.
    pub recurrence: Option<Recurrence>,
    /// The tax category, incomes only.
    pub tax_category: Option<TaxCategory>,
    /// The status, incomes only.
    pub status: Option<IncomeStatus>,
}

impl TransactionBuilder {
    /// Set the description.
    pub fn description(mut self, description: &str) -> Self {
        description.clone_into(&mut self.description);
        self
    }

    /// Set the free text category.
    pub fn category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Set the platform whose fee schedule applies.
    pub fn platform_id(mut self, platform_id: Option<PlatformId>) -> Self {
        self.platform_id = platform_id;
        self
    }

    /// Set the VAT rate.
    pub fn vat_rate(mut self, vat_rate: Decimal) -> Self {
        self.vat_rate = vat_rate;
        self
    }

    /// Set the recurrence descriptor.
    pub fn recurrence(mut self, recurrence: Option<Recurrence>) -> Self {
        self.recurrence = recurrence;
        self
    }

    /// Set the tax category.
    pub fn tax_category(mut self, tax_category: Option<TaxCategory>) -> Self {
        self.tax_category = tax_category;
        self
    }

    /// Set the income status.
    pub fn status(mut self, status: Option<IncomeStatus>) -> Self {
        self.status = status;
        self
    }

    /// The amount this transaction would add to the revenue of its fiscal year.
    pub fn revenue_contribution(&self) -> Option<RevenueContribution> {
        revenue_contribution(self.kind, self.status, self.amount, self.date)
    }
}

// ============================================================================
// SQL CONVERSIONS
// ============================================================================

/// A stored enum value that does not match any variant.
#[derive(Debug, thiserror::Error)]
#[error("\"{value}\" is not a valid {kind}")]
pub struct ParseVariantError {
    kind: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// The string stored in the database for this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseVariantError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseVariantError { kind: $label, value: value.to_owned() }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|error| FromSqlError::Other(Box::new(error)))
            }
        }
    };
}

text_enum!(TransactionKind, "transaction kind", {
    Income => "income",
    Expense => "expense",
});

text_enum!(TaxCategory, "tax category", {
    Bnc => "bnc",
    Bic => "bic",
    Vente => "vente",
});

text_enum!(IncomeStatus, "income status", {
    Confirmed => "confirmed",
    Refunded => "refunded",
    QuoteSent => "quote_sent",
    QuoteSigned => "quote_signed",
});

text_enum!(Frequency, "frequency", {
    Monthly => "monthly",
    Annual => "annual",
});

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, owner_id, kind, amount, date, description, category, \
    platform_id, vat_rate, vat_amount, recurrence_frequency, recurrence_end_date, series_id, \
    tax_category, status";

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidPlatform] if the platform ID does not refer to a platform of the owner,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    insert_transaction(&builder, None, connection)
}

/// Create a recurring transaction together with its backfilled occurrences.
///
/// All rows are written in a single SQL transaction: either the whole series
/// is saved or none of it is. Every row gets the ID of the template as its
/// `series_id`.
///
/// # Errors
/// Returns the first error encountered, see [create_transaction]. Nothing is
/// saved when an error is returned.
pub fn create_transaction_series(
    template: TransactionBuilder,
    occurrences: Vec<TransactionBuilder>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let transaction = connection.unchecked_transaction()?;
    let created = insert_transaction_series(template, occurrences, &transaction)?;
    transaction.commit()?;

    Ok(created)
}

/// Insert a series without managing the SQL transaction.
///
/// The caller must run this inside a SQL transaction for the series to be atomic.
pub(crate) fn insert_transaction_series(
    template: TransactionBuilder,
    occurrences: Vec<TransactionBuilder>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    if occurrences.is_empty() && template.recurrence.is_none() {
        return Ok(vec![insert_transaction(&template, None, connection)?]);
    }

    let mut first = insert_transaction(&template, None, connection)?;
    connection.execute(
        "UPDATE \"transaction\" SET series_id = ?1 WHERE id = ?1",
        (first.id,),
    )?;
    first.series_id = Some(first.id);

    let series_id = first.id;
    let mut created = Vec::with_capacity(occurrences.len() + 1);
    created.push(first);

    for occurrence in occurrences {
        created.push(insert_transaction(
            &occurrence,
            Some(series_id),
            connection,
        )?);
    }

    Ok(created)
}

fn insert_transaction(
    builder: &TransactionBuilder,
    series_id: Option<TransactionId>,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (owner_id, kind, amount, date, description, category, \
                platform_id, vat_rate, vat_amount, recurrence_frequency, recurrence_end_date, \
                series_id, tax_category, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            rusqlite::params![
                builder.owner_id,
                builder.kind,
                builder.amount.to_string(),
                builder.date,
                builder.description,
                builder.category,
                builder.platform_id,
                builder.vat_rate.to_string(),
                vat_amount(builder.amount, builder.vat_rate).to_string(),
                builder.recurrence.map(|recurrence| recurrence.frequency),
                builder.recurrence.and_then(|recurrence| recurrence.end_date),
                series_id,
                builder.tax_category,
                builder.status,
            ],
            map_transaction_row,
        )
        .map_err(|error| map_platform_error(error, builder.platform_id))
}

/// Retrieve a transaction of `owner_id` from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction of the owner,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(
    owner_id: OwnerId,
    id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" \
             WHERE id = :id AND owner_id = :owner_id"
        ))?
        .query_row(
            &[(":id", &id), (":owner_id", &owner_id)],
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve the transactions of `owner_id` dated in `year`, ordered by date.
///
/// `kind` restricts the result to incomes or expenses, `None` returns both.
///
/// # Errors
/// Returns [Error::InvalidYear] if `year` cannot be represented, or an
/// [Error::SqlError] if there is an SQL error.
pub fn list_transactions(
    owner_id: OwnerId,
    year: i32,
    kind: Option<TransactionKind>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let (start, end) = year_bounds(year)?;

    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" \
             WHERE owner_id = ?1 AND date BETWEEN ?2 AND ?3 AND (?4 IS NULL OR kind = ?4) \
             ORDER BY date ASC, id ASC"
        ))?
        .query_map((owner_id, start, end, kind), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Replace the editable fields of the transaction `id` with the values in `builder`.
///
/// The series a transaction belongs to is not changed.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if the transaction does not exist,
/// - [Error::InvalidPlatform] if the platform ID is invalid,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    builder: &TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "UPDATE \"transaction\"
             SET kind = ?1, amount = ?2, date = ?3, description = ?4, category = ?5, \
                 platform_id = ?6, vat_rate = ?7, vat_amount = ?8, recurrence_frequency = ?9, \
                 recurrence_end_date = ?10, tax_category = ?11, status = ?12
             WHERE id = ?13 AND owner_id = ?14
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            rusqlite::params![
                builder.kind,
                builder.amount.to_string(),
                builder.date,
                builder.description,
                builder.category,
                builder.platform_id,
                builder.vat_rate.to_string(),
                vat_amount(builder.amount, builder.vat_rate).to_string(),
                builder.recurrence.map(|recurrence| recurrence.frequency),
                builder.recurrence.and_then(|recurrence| recurrence.end_date),
                builder.tax_category,
                builder.status,
                id,
                builder.owner_id,
            ],
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingTransaction,
            error => map_platform_error(error, builder.platform_id),
        })
}

/// Set the amount and VAT rate of a transaction, recomputing its VAT amount.
///
/// # Errors
/// Returns [Error::UpdateMissingTransaction] if the transaction does not
/// exist, or [Error::SqlError] if there is some other SQL error.
pub fn update_amount_and_vat_rate(
    owner_id: OwnerId,
    id: TransactionId,
    amount: Decimal,
    vat_rate: Decimal,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "UPDATE \"transaction\" SET amount = ?1, vat_rate = ?2, vat_amount = ?3
             WHERE id = ?4 AND owner_id = ?5
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row(
            (
                amount.to_string(),
                vat_rate.to_string(),
                vat_amount(amount, vat_rate).to_string(),
                id,
                owner_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingTransaction,
            error => error.into(),
        })
}

/// Delete a transaction and return the deleted row.
///
/// # Errors
/// Returns [Error::DeleteMissingTransaction] if the transaction does not
/// exist, or [Error::SqlError] if there is some other SQL error.
pub fn delete_transaction(
    owner_id: OwnerId,
    id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "DELETE FROM \"transaction\" WHERE id = ?1 AND owner_id = ?2 \
             RETURNING {TRANSACTION_COLUMNS}"
        ))?
        .query_row((id, owner_id), map_transaction_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::DeleteMissingTransaction,
            error => error.into(),
        })
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// The first and last day of `year`.
///
/// # Errors
/// Returns [Error::InvalidYear] if `year` is outside the supported date range.
pub fn year_bounds(year: i32) -> Result<(Date, Date), Error> {
    let start =
        Date::from_calendar_date(year, Month::January, 1).map_err(|_| Error::InvalidYear(year))?;
    let end =
        Date::from_calendar_date(year, Month::December, 31).map_err(|_| Error::InvalidYear(year))?;

    Ok((start, end))
}

fn map_platform_error(error: rusqlite::Error, platform_id: Option<PlatformId>) -> Error {
    match error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: _,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
            },
            _,
        ) => Error::InvalidPlatform(platform_id),
        error => error.into(),
    }
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                amount TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT,
                platform_id INTEGER,
                vat_rate TEXT NOT NULL,
                vat_amount TEXT NOT NULL,
                recurrence_frequency TEXT,
                recurrence_end_date TEXT,
                series_id INTEGER,
                tax_category TEXT,
                status TEXT,
                FOREIGN KEY(platform_id, owner_id) REFERENCES platform(id, owner_id)
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    // Yearly totals are always queried per owner and date range.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_owner_date ON \"transaction\"(owner_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let frequency: Option<Frequency> = row.get(10)?;
    let end_date = row.get(11)?;

    Ok(Transaction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        kind: row.get(2)?,
        amount: read_decimal(row, 3)?,
        date: row.get(4)?,
        description: row.get(5)?,
        category: row.get(6)?,
        platform_id: row.get(7)?,
        vat_rate: read_decimal(row, 8)?,
        vat_amount: read_decimal(row, 9)?,
        recurrence: frequency.map(|frequency| Recurrence {
            frequency,
            end_date,
        }),
        series_id: row.get(12)?,
        tax_category: row.get(13)?,
        status: row.get(14)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        transaction::{
            Frequency, IncomeStatus, Recurrence, Transaction, TransactionKind, count_transactions,
            create_transaction, create_transaction_series, delete_transaction, get_transaction,
            list_transactions, update_amount_and_vat_rate, update_transaction,
        },
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn create_succeeds() {
        let conn = get_test_connection();

        let result = create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(12.30), date!(2025 - 10 - 05))
                .vat_rate(dec!(20)),
            &conn,
        );

        match result {
            Ok(transaction) => {
                assert_eq!(transaction.amount, dec!(12.30));
                assert_eq!(transaction.vat_amount, dec!(2.46));
                assert_eq!(transaction.status, Some(IncomeStatus::Confirmed));
            }
            Err(error) => panic!("Unexpected error: {error}"),
        }
    }

    #[test]
    fn create_fails_on_invalid_platform_id() {
        let conn = get_test_connection();

        let result = create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(10), date!(2025 - 10 - 04))
                .platform_id(Some(42)),
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidPlatform(Some(42))));
    }

    #[test]
    fn get_is_scoped_to_owner() {
        let conn = get_test_connection();
        let transaction = create_transaction(
            Transaction::build(1, TransactionKind::Expense, dec!(10), date!(2025 - 10 - 04)),
            &conn,
        )
        .unwrap();

        assert_eq!(get_transaction(2, transaction.id, &conn), Err(Error::NotFound));
        assert_eq!(get_transaction(1, transaction.id, &conn), Ok(transaction));
    }

    #[test]
    fn list_returns_transactions_of_year_and_kind() {
        let conn = get_test_connection();
        for (kind, date) in [
            (TransactionKind::Income, date!(2024 - 12 - 31)),
            (TransactionKind::Income, date!(2025 - 01 - 01)),
            (TransactionKind::Expense, date!(2025 - 06 - 01)),
            (TransactionKind::Income, date!(2025 - 12 - 31)),
        ] {
            create_transaction(Transaction::build(1, kind, dec!(1), date), &conn).unwrap();
        }

        let incomes = list_transactions(1, 2025, Some(TransactionKind::Income), &conn).unwrap();
        let all = list_transactions(1, 2025, None, &conn).unwrap();

        assert_eq!(
            incomes.iter().map(|t| t.date).collect::<Vec<_>>(),
            vec![date!(2025 - 01 - 01), date!(2025 - 12 - 31)]
        );
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn series_shares_template_id() {
        let conn = get_test_connection();
        let template =
            Transaction::build(1, TransactionKind::Income, dec!(50), date!(2024 - 01 - 15))
                .recurrence(Some(Recurrence {
                    frequency: Frequency::Monthly,
                    end_date: None,
                }));
        let occurrence = Transaction::build(1, TransactionKind::Income, dec!(50), date!(2024 - 02 - 15));

        let created = create_transaction_series(template, vec![occurrence], &conn).unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(created[0].series_id, Some(created[0].id));
        assert_eq!(created[1].series_id, Some(created[0].id));
        assert_eq!(created[1].recurrence, None);
    }

    #[test]
    fn series_is_not_saved_when_one_write_fails() {
        let conn = get_test_connection();
        let template =
            Transaction::build(1, TransactionKind::Income, dec!(50), date!(2024 - 01 - 15))
                .recurrence(Some(Recurrence {
                    frequency: Frequency::Monthly,
                    end_date: None,
                }));
        let good = Transaction::build(1, TransactionKind::Income, dec!(50), date!(2024 - 02 - 15));
        let bad = Transaction::build(1, TransactionKind::Income, dec!(50), date!(2024 - 03 - 15))
            .platform_id(Some(999));

        let result = create_transaction_series(template, vec![good, bad], &conn);

        assert_eq!(result, Err(Error::InvalidPlatform(Some(999))));
        assert_eq!(count_transactions(&conn).unwrap(), 0);
    }

    #[test]
    fn update_replaces_fields() {
        let conn = get_test_connection();
        let transaction = create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(10), date!(2025 - 01 - 01)),
            &conn,
        )
        .unwrap();

        let updated = update_transaction(
            transaction.id,
            &Transaction::build(1, TransactionKind::Income, dec!(25), date!(2025 - 02 - 01))
                .description("updated")
                .vat_rate(dec!(10)),
            &conn,
        )
        .unwrap();

        assert_eq!(updated.amount, dec!(25));
        assert_eq!(updated.vat_amount, dec!(2.5));
        assert_eq!(updated.description, "updated");
    }

    #[test]
    fn update_missing_transaction_fails() {
        let conn = get_test_connection();

        let result = update_transaction(
            42,
            &Transaction::build(1, TransactionKind::Income, dec!(25), date!(2025 - 02 - 01)),
            &conn,
        );

        assert_eq!(result, Err(Error::UpdateMissingTransaction));
        assert_eq!(
            update_amount_and_vat_rate(1, 42, dec!(1), dec!(20), &conn),
            Err(Error::UpdateMissingTransaction)
        );
    }

    #[test]
    fn delete_returns_deleted_row() {
        let conn = get_test_connection();
        let transaction = create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(10), date!(2025 - 01 - 01)),
            &conn,
        )
        .unwrap();

        let deleted = delete_transaction(1, transaction.id, &conn).unwrap();

        assert_eq!(deleted, transaction);
        assert_eq!(
            delete_transaction(1, transaction.id, &conn),
            Err(Error::DeleteMissingTransaction)
        );
    }
}
