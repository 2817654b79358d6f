//! Defines the endpoint for listing the transactions of a fiscal year.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    database_id::OwnerId,
    fiscal::{NetRevenue, calculate_net_revenue, get_fiscal_profile},
    platform::{FeeSchedule, get_fee_schedules},
    settings::get_rate_settings,
    timezone::get_local_date,
    transaction::{Transaction, TransactionKind, list_transactions},
};

/// The state needed to list transactions.
#[derive(Debug, Clone)]
pub struct ListTransactionsState {
    /// The database connection for reading transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Europe/Paris".
    pub local_timezone: String,
}

impl FromRef<AppState> for ListTransactionsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Filters for listing transactions.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// The fiscal year, the current one when absent.
    #[serde(default)]
    pub year: Option<i32>,
    /// Only list incomes or expenses.
    #[serde(default)]
    pub kind: Option<TransactionKind>,
}

/// A transaction with the decomposition of its amount.
#[derive(Debug, Serialize)]
pub struct TransactionWithBreakdown {
    /// The stored transaction.
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Fees, contributions and net revenue of the transaction.
    pub breakdown: NetRevenue,
}

/// A route handler listing the transactions of a fiscal year, each with its net revenue breakdown.
pub async fn list_transactions_endpoint(
    State(state): State<ListTransactionsState>,
    Path(owner_id): Path<OwnerId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TransactionWithBreakdown>>, Error> {
    let year = match query.year {
        Some(year) => year,
        None => get_local_date(&state.local_timezone)?.year(),
    };
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let profile = get_fiscal_profile(owner_id, &connection)?;
    let settings = get_rate_settings(owner_id, &connection)?;
    let fee_schedules = get_fee_schedules(owner_id, &connection)?;
    let no_fees = FeeSchedule::default();

    let transactions = list_transactions(owner_id, year, query.kind, &connection)?
        .into_iter()
        .map(|transaction| {
            let fees = transaction
                .platform_id
                .and_then(|id| fee_schedules.get(&id))
                .unwrap_or(&no_fees);
            let breakdown = calculate_net_revenue(&transaction, fees, &profile, &settings);

            TransactionWithBreakdown {
                transaction,
                breakdown,
            }
        })
        .collect();

    Ok(Json(transactions))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json,
        extract::{Path, Query, State},
    };
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        db::initialize,
        platform::{FeeSchedule, NewPlatform, create_platform},
        transaction::{TaxCategory, Transaction, TransactionKind, create_transaction},
    };

    use super::{ListQuery, ListTransactionsState, list_transactions_endpoint};

    fn get_test_state() -> ListTransactionsState {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        ListTransactionsState {
            db_connection: Arc::new(Mutex::new(conn)),
            local_timezone: "Etc/UTC".to_owned(),
        }
    }

    #[tokio::test]
    async fn lists_year_with_breakdown() {
        let state = get_test_state();
        {
            let connection = state.db_connection.lock().unwrap();
            let etsy = create_platform(
                1,
                NewPlatform {
                    name: "Etsy".to_owned(),
                    fees: FeeSchedule {
                        percentage_rate: dec!(6.5),
                        fixed_fee: dec!(0.20),
                        fee_vat_rate: dec!(20),
                    },
                },
                &connection,
            )
            .unwrap();
            create_transaction(
                Transaction::build(1, TransactionKind::Income, dec!(100), date!(2024 - 03 - 01))
                    .platform_id(Some(etsy.id))
                    .tax_category(Some(TaxCategory::Vente)),
                &connection,
            )
            .unwrap();
            create_transaction(
                Transaction::build(1, TransactionKind::Expense, dec!(30), date!(2024 - 03 - 02)),
                &connection,
            )
            .unwrap();
            create_transaction(
                Transaction::build(1, TransactionKind::Income, dec!(500), date!(2023 - 03 - 01)),
                &connection,
            )
            .unwrap();
        }

        let Json(all) = list_transactions_endpoint(
            State(state.clone()),
            Path(1),
            Query(ListQuery {
                year: Some(2024),
                kind: None,
            }),
        )
        .await
        .unwrap();
        let Json(incomes) = list_transactions_endpoint(
            State(state),
            Path(1),
            Query(ListQuery {
                year: Some(2024),
                kind: Some(TransactionKind::Income),
            }),
        )
        .await
        .unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].breakdown.net, dec!(79.66));
        assert_eq!(all[1].breakdown.net, dec!(30));
        assert_eq!(incomes.len(), 1);
    }
}
