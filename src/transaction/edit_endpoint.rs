//! Defines the endpoint for replacing a transaction.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    database_id::{OwnerId, TransactionId},
    extract::JsonBody,
    fiscal::{MutationOutcome, submit_edit},
    transaction::{form::TransactionForm, get_transaction},
};

/// The state needed to edit a transaction.
#[derive(Debug, Clone)]
pub struct EditTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for EditTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler replacing a transaction with the fields of the request body.
///
/// A missing VAT rate keeps the transaction's current rate.
pub async fn edit_transaction_endpoint(
    State(state): State<EditTransactionState>,
    Path((owner_id, transaction_id)): Path<(OwnerId, TransactionId)>,
    JsonBody(form): JsonBody<TransactionForm>,
) -> Result<Json<MutationOutcome>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let existing = get_transaction(owner_id, transaction_id, &connection)?;
    let builder = form.into_builder(owner_id, existing.vat_rate)?;
    let outcome = submit_edit(transaction_id, builder, &connection)?;

    tracing::info!("Updated transaction {transaction_id} of owner {owner_id}");

    Ok(Json(outcome))
}
