//! Transaction management for the ledger.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing, querying, and managing transactions
//! - Backfilling of recurring transactions
//! - Route handlers for the transaction endpoints

mod core;
mod create_endpoint;
mod delete_endpoint;
mod edit_endpoint;
mod form;
mod list_endpoint;
mod recurring;

pub use core::{
    Frequency, IncomeStatus, Recurrence, RevenueContribution, TaxCategory, Transaction,
    TransactionBuilder, TransactionKind, create_transaction, create_transaction_series,
    create_transaction_table, delete_transaction, get_transaction, list_transactions,
    map_transaction_row, update_amount_and_vat_rate, update_transaction,
};
pub(crate) use core::insert_transaction_series;
pub use create_endpoint::create_transaction_endpoint;
pub use delete_endpoint::delete_transaction_endpoint;
pub use edit_endpoint::edit_transaction_endpoint;
pub use list_endpoint::list_transactions_endpoint;
pub use recurring::generate_missed_occurrences;

#[cfg(test)]
pub use core::count_transactions;
