//! Defines the endpoint for deleting a transaction.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    database_id::{OwnerId, TransactionId},
    fiscal::{MutationOutcome, submit_delete},
};

/// The state needed to delete a transaction.
#[derive(Debug, Clone)]
pub struct DeleteTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for deleting a transaction.
pub async fn delete_transaction_endpoint(
    State(state): State<DeleteTransactionState>,
    Path((owner_id, transaction_id)): Path<(OwnerId, TransactionId)>,
) -> Result<Json<MutationOutcome>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let outcome = submit_delete(owner_id, transaction_id, &connection)?;
    tracing::info!("Deleted transaction {transaction_id} of owner {owner_id}");

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json,
        extract::{Path, State},
    };
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        fiscal::MutationOutcome,
        transaction::{Transaction, TransactionKind, count_transactions, create_transaction},
    };

    use super::{DeleteTransactionState, delete_transaction_endpoint};

    fn get_test_state() -> DeleteTransactionState {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        DeleteTransactionState {
            db_connection: Arc::new(Mutex::new(conn)),
        }
    }

    #[tokio::test]
    async fn can_delete_transaction() {
        let state = get_test_state();
        let transaction = {
            let connection = state.db_connection.lock().unwrap();
            create_transaction(
                Transaction::build(1, TransactionKind::Expense, dec!(42), date!(2024 - 03 - 01)),
                &connection,
            )
            .unwrap()
        };

        let Json(outcome) = delete_transaction_endpoint(State(state.clone()), Path((1, transaction.id)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            MutationOutcome::Committed {
                transactions: vec![transaction]
            }
        );
        let connection = state.db_connection.lock().unwrap();
        assert_eq!(count_transactions(&connection).unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_missing_transaction_fails() {
        let state = get_test_state();

        let result = delete_transaction_endpoint(State(state), Path((1, 1337))).await;

        assert_eq!(result.err(), Some(Error::DeleteMissingTransaction));
    }
}
