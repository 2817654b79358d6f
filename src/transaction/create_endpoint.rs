//! Defines the endpoint for creating a new transaction.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::{HeaderValue, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    database_id::OwnerId,
    endpoints::{self, format_endpoint},
    extract::JsonBody,
    fiscal::{MutationOutcome, get_fiscal_profile, submit_new_transaction},
    timezone::get_local_date,
    transaction::form::TransactionForm,
};

/// The state needed to create a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Europe/Paris".
    pub local_timezone: String,
}

impl FromRef<AppState> for CreateTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// A route handler for creating a new transaction.
///
/// Responds with 201 and the saved transactions, or with 202 and an
/// activation prompt when the income must wait for a VAT decision.
pub async fn create_transaction_endpoint(
    State(state): State<CreateTransactionState>,
    Path(owner_id): Path<OwnerId>,
    JsonBody(form): JsonBody<TransactionForm>,
) -> Result<Response, Error> {
    form.validate()?;
    let today = get_local_date(&state.local_timezone)?;
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let default_vat_rate = get_fiscal_profile(owner_id, &connection)?.default_vat_rate();
    let builder = form.into_builder(owner_id, default_vat_rate)?;
    let outcome = submit_new_transaction(builder, today, &connection)?;

    let (status, location) = match &outcome {
        MutationOutcome::Committed { transactions } => {
            tracing::info!(
                "Created {} transactions for owner {owner_id}",
                transactions.len()
            );
            let location = transactions
                .first()
                .map(|created| format_endpoint(endpoints::TRANSACTION, &[owner_id, created.id]));

            (StatusCode::CREATED, location)
        }
        MutationOutcome::ActivationRequired { .. } => (StatusCode::ACCEPTED, None),
        MutationOutcome::ReversionRequired { .. } => (StatusCode::OK, None),
    };

    let mut response = (status, Json(outcome)).into_response();
    if let Some(location) = location.and_then(|location| HeaderValue::from_str(&location).ok()) {
        response.headers_mut().insert(LOCATION, location);
    }

    Ok(response)
}
