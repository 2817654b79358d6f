/*! Sets up the application's database schema. */

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error,
    fiscal::{
        create_fiscal_profile_table, create_pending_regularization_table,
        create_revenue_total_table,
    },
    platform::create_platform_table,
    settings::create_rate_settings_table,
    transaction::create_transaction_table,
};

/// Create all the tables the application needs and enable foreign key checks.
///
/// The tables are created in a single exclusive transaction, so either the
/// whole schema is created or none of it. Calling this function on an already
/// initialized database is a no-op.
///
/// # Errors
/// Returns an [Error::SqlError] if the schema cannot be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    // Has no effect inside a transaction, so it must come first.
    connection.pragma_update(None, "foreign_keys", "ON")?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_platform_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_fiscal_profile_table(&transaction)?;
    create_rate_settings_table(&transaction)?;
    create_revenue_total_table(&transaction)?;
    create_pending_regularization_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
