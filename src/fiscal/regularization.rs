//! Corrects the incomes recorded without VAT in the month an owner became subject to VAT.
//!
//! After activation, the owner says for each zero-VAT income of the crossing
//! month whether its amount already included VAT ("forgotten") or not
//! ("already correct"). Each income is corrected on its own: a failure on one
//! income is reported and the others are still processed.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    database_id::{OwnerId, TransactionId},
    fiscal::threshold::apply_revenue_delta,
    money::{STANDARD_VAT_RATE, exclude_standard_vat},
    transaction::{
        Transaction, TransactionKind, get_transaction, list_transactions,
        map_transaction_row, update_amount_and_vat_rate,
    },
};

// ============================================================================
// MODELS
// ============================================================================

/// An income the owner must classify.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegularizationItem {
    /// The ID of the income.
    pub id: TransactionId,
    /// The amount as currently stored.
    pub amount: Decimal,
    /// When the income happened.
    pub date: Date,
}

/// The incomes waiting for a regularization decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegularizationPrompt {
    /// The incomes, in date order.
    pub items: Vec<RegularizationItem>,
}

impl From<&[Transaction]> for RegularizationPrompt {
    fn from(transactions: &[Transaction]) -> Self {
        Self {
            items: transactions
                .iter()
                .map(|transaction| RegularizationItem {
                    id: transaction.id,
                    amount: transaction.amount,
                    date: transaction.date,
                })
                .collect(),
        }
    }
}

/// What happened to one income.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The income was corrected.
    Applied {
        /// The income after the correction.
        transaction: Transaction,
    },
    /// The income could not be corrected.
    Failed {
        /// Why the correction failed.
        reason: String,
    },
}

/// The outcome for one income of the regularization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    /// The ID of the income.
    pub id: TransactionId,
    /// Whether the owner said VAT had been forgotten.
    pub forgotten: bool,
    /// What happened.
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// How much of a regularization went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizationStatus {
    /// Every income was corrected.
    FullyApplied,
    /// Some incomes were corrected and some failed.
    PartiallyApplied,
    /// No income was corrected.
    FullyFailed,
}

/// The result of applying regularization decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegularizationReport {
    /// The overall status.
    pub status: RegularizationStatus,
    /// One entry per income, in the order they were processed.
    pub items: Vec<ItemReport>,
    /// The incomes still waiting for a decision.
    pub remaining: RegularizationPrompt,
}

impl RegularizationReport {
    fn new(items: Vec<ItemReport>, remaining: RegularizationPrompt) -> Self {
        let applied = items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Applied { .. }))
            .count();

        let status = if applied == items.len() {
            RegularizationStatus::FullyApplied
        } else if applied == 0 {
            RegularizationStatus::FullyFailed
        } else {
            RegularizationStatus::PartiallyApplied
        };

        Self {
            status,
            items,
            remaining,
        }
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// The incomes of `owner_id` dated in the same month as `date` that were
/// recorded without VAT, excluding quotes and `excluded_ids`.
pub fn find_candidates(
    owner_id: OwnerId,
    date: Date,
    excluded_ids: &HashSet<TransactionId>,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let incomes = list_transactions(owner_id, date.year(), Some(TransactionKind::Income), connection)?;

    Ok(incomes
        .into_iter()
        .filter(|income| {
            income.date.month() == date.month()
                && income.vat_rate.is_zero()
                && income.revenue_contribution().is_some()
                && !excluded_ids.contains(&income.id)
        })
        .collect())
}

/// Replace the incomes of `owner_id` waiting for a regularization decision.
pub fn record_pending_regularization(
    owner_id: OwnerId,
    transaction_ids: &[TransactionId],
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM pending_regularization WHERE owner_id = ?1",
        (owner_id,),
    )?;

    let mut statement = connection.prepare(
        "INSERT INTO pending_regularization (owner_id, transaction_id) VALUES (?1, ?2)",
    )?;

    for transaction_id in transaction_ids {
        statement.execute((owner_id, transaction_id))?;
    }

    Ok(())
}

/// The incomes of `owner_id` waiting for a regularization decision, in date order.
pub fn get_pending_regularization(
    owner_id: OwnerId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT t.id, t.owner_id, t.kind, t.amount, t.date, t.description, t.category, \
                t.platform_id, t.vat_rate, t.vat_amount, t.recurrence_frequency, \
                t.recurrence_end_date, t.series_id, t.tax_category, t.status
             FROM pending_regularization p
             INNER JOIN \"transaction\" t ON t.id = p.transaction_id
             WHERE p.owner_id = ?1
             ORDER BY t.date ASC, t.id ASC",
        )?
        .query_map((owner_id,), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Apply the owner's decisions to the pending regularization set.
///
/// `decisions` maps income IDs to whether VAT was forgotten. Pending incomes
/// missing from `decisions` are treated as already correct. IDs that are not
/// pending are reported as failures and never written.
///
/// Each income is corrected in its own SQL transaction together with the
/// running total of its year. Corrected incomes leave the pending set, failed
/// ones stay so the decision can be submitted again.
///
/// # Errors
/// Returns [Error::NoPendingDecision] if nothing is pending, or an
/// [Error::SqlError] if the pending set cannot be read.
pub fn apply_regularization(
    owner_id: OwnerId,
    decisions: &HashMap<TransactionId, bool>,
    connection: &Connection,
) -> Result<RegularizationReport, Error> {
    let pending = get_pending_regularization(owner_id, connection)?;

    if pending.is_empty() {
        return Err(Error::NoPendingDecision("regularization"));
    }

    let pending_ids: HashSet<TransactionId> = pending.iter().map(|income| income.id).collect();
    let mut items = Vec::with_capacity(pending.len());

    for income in &pending {
        let forgotten = decisions.get(&income.id).copied().unwrap_or(false);

        let outcome = match regularize_income(owner_id, income.id, forgotten, connection) {
            Ok(transaction) => ItemOutcome::Applied { transaction },
            Err(error) => {
                tracing::warn!(
                    "Could not regularize transaction {} of owner {owner_id}: {error}",
                    income.id
                );
                ItemOutcome::Failed {
                    reason: error.to_string(),
                }
            }
        };

        items.push(ItemReport {
            id: income.id,
            forgotten,
            outcome,
        });
    }

    let mut unknown_ids: Vec<_> = decisions
        .iter()
        .filter(|(id, _)| !pending_ids.contains(*id))
        .collect();
    unknown_ids.sort();

    for (&id, &forgotten) in unknown_ids {
        items.push(ItemReport {
            id,
            forgotten,
            outcome: ItemOutcome::Failed {
                reason: format!("transaction {id} is not waiting for regularization"),
            },
        });
    }

    let remaining = get_pending_regularization(owner_id, connection)?;
    let report = RegularizationReport::new(items, RegularizationPrompt::from(remaining.as_slice()));

    match report.status {
        RegularizationStatus::FullyApplied => {
            tracing::info!("Regularized {} transactions of owner {owner_id}", report.items.len())
        }
        status => tracing::warn!(
            "Regularization of owner {owner_id} finished as {status:?}, {} transactions still pending",
            report.remaining.items.len()
        ),
    }

    Ok(report)
}

fn regularize_income(
    owner_id: OwnerId,
    id: TransactionId,
    forgotten: bool,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let sql_transaction = connection.unchecked_transaction()?;

    let income = get_transaction(owner_id, id, &sql_transaction)?;
    let new_amount = if forgotten {
        exclude_standard_vat(income.amount)
    } else {
        income.amount
    };

    let updated =
        update_amount_and_vat_rate(owner_id, id, new_amount, STANDARD_VAT_RATE, &sql_transaction)?;

    if let Some(contribution) = income.revenue_contribution() {
        let delta = new_amount - contribution.amount;
        if !delta.is_zero() {
            apply_revenue_delta(owner_id, contribution.year, delta, &sql_transaction)?;
        }
    }

    sql_transaction.execute(
        "DELETE FROM pending_regularization WHERE owner_id = ?1 AND transaction_id = ?2",
        (owner_id, id),
    )?;
    sql_transaction.commit()?;

    Ok(updated)
}

/// Create the table holding the incomes waiting for a regularization decision.
pub fn create_pending_regularization_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS pending_regularization (
            owner_id INTEGER NOT NULL,
            transaction_id INTEGER NOT NULL,
            PRIMARY KEY(owner_id, transaction_id),
            FOREIGN KEY(transaction_id) REFERENCES \"transaction\"(id) ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        db::initialize,
        fiscal::threshold::get_year_total,
        transaction::{
            IncomeStatus, Transaction, TransactionKind, create_transaction, get_transaction,
        },
    };

    use super::{
        ItemOutcome, RegularizationStatus, apply_regularization, find_candidates,
        get_pending_regularization, record_pending_regularization,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn create_income(conn: &Connection, amount: rust_decimal::Decimal, date: time::Date) -> i64 {
        create_transaction(Transaction::build(1, TransactionKind::Income, amount, date), conn)
            .unwrap()
            .id
    }

    #[test]
    fn candidates_are_zero_vat_incomes_of_the_month() {
        let conn = get_test_connection();
        let trigger = create_income(&conn, dec!(2000), date!(2024 - 05 - 20));
        let same_month = create_income(&conn, dec!(120), date!(2024 - 05 - 02));
        create_income(&conn, dec!(50), date!(2024 - 04 - 30));
        create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(60), date!(2024 - 05 - 03))
                .vat_rate(dec!(20)),
            &conn,
        )
        .unwrap();
        create_transaction(
            Transaction::build(1, TransactionKind::Expense, dec!(70), date!(2024 - 05 - 04)),
            &conn,
        )
        .unwrap();
        create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(500), date!(2024 - 05 - 05))
                .status(Some(IncomeStatus::QuoteSent)),
            &conn,
        )
        .unwrap();

        let candidates =
            find_candidates(1, date!(2024 - 05 - 20), &HashSet::from([trigger]), &conn).unwrap();

        assert_eq!(
            candidates.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![same_month]
        );
    }

    #[test]
    fn forgotten_vat_is_extracted_from_amount() {
        let conn = get_test_connection();
        let id = create_income(&conn, dec!(120), date!(2024 - 05 - 02));
        assert_eq!(get_year_total(1, 2024, &conn), Ok(dec!(120)));
        record_pending_regularization(1, &[id], &conn).unwrap();

        let report = apply_regularization(1, &HashMap::from([(id, true)]), &conn).unwrap();

        assert_eq!(report.status, RegularizationStatus::FullyApplied);
        let stored = get_transaction(1, id, &conn).unwrap();
        assert_eq!(stored.amount, dec!(100));
        assert_eq!(stored.vat_amount, dec!(20));
        assert_eq!(stored.vat_rate, dec!(20));
        assert_eq!(get_year_total(1, 2024, &conn), Ok(dec!(100)));
        assert!(get_pending_regularization(1, &conn).unwrap().is_empty());
    }

    #[test]
    fn missing_decision_defaults_to_already_correct() {
        let conn = get_test_connection();
        let id = create_income(&conn, dec!(120), date!(2024 - 05 - 02));
        record_pending_regularization(1, &[id], &conn).unwrap();

        apply_regularization(1, &HashMap::new(), &conn).unwrap();

        let stored = get_transaction(1, id, &conn).unwrap();
        assert_eq!(stored.amount, dec!(120));
        assert_eq!(stored.vat_amount, dec!(24));
        assert_eq!(stored.vat_rate, dec!(20));
    }

    #[test]
    fn unknown_id_is_reported_without_stopping_the_others() {
        let conn = get_test_connection();
        let id = create_income(&conn, dec!(120), date!(2024 - 05 - 02));
        record_pending_regularization(1, &[id], &conn).unwrap();

        let report =
            apply_regularization(1, &HashMap::from([(id, true), (999, true)]), &conn).unwrap();

        assert_eq!(report.status, RegularizationStatus::PartiallyApplied);
        assert_eq!(report.items.len(), 2);
        assert!(matches!(report.items[0].outcome, ItemOutcome::Applied { .. }));
        assert_eq!(report.items[1].id, 999);
        assert!(matches!(report.items[1].outcome, ItemOutcome::Failed { .. }));
        assert_eq!(get_transaction(1, id, &conn).unwrap().amount, dec!(100));
    }

    #[test]
    fn deleted_income_leaves_pending_set() {
        let conn = get_test_connection();
        let id = create_income(&conn, dec!(120), date!(2024 - 05 - 02));
        record_pending_regularization(1, &[id], &conn).unwrap();

        crate::transaction::delete_transaction(1, id, &conn).unwrap();

        assert_eq!(
            apply_regularization(1, &HashMap::new(), &conn),
            Err(Error::NoPendingDecision("regularization"))
        );
    }
}
