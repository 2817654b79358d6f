//! Tracks yearly revenue against the VAT franchise threshold and the
//! micro-entreprise ceiling.
//!
//! The revenue of each (owner, year) pair is kept as a running total that is
//! adjusted by signed deltas whenever a mutation is committed. The running
//! total is created from a full recompute the first time it is needed, and
//! [reconcile_year_total] compares it with a full recompute to detect and
//! repair drift.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    Error,
    database_id::OwnerId,
    money::read_decimal,
    settings::RateSettings,
    transaction::{RevenueContribution, Transaction, TransactionKind, list_transactions},
};

/// The owner's position relative to the micro-entreprise ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CeilingStatus {
    /// The year's revenue is at or under the ceiling.
    Below,
    /// The year is over the ceiling but the previous year was not. The regime
    /// still applies for this year.
    ToleranceYear,
    /// Both the year and the previous year are over the ceiling.
    Exceeded,
}

/// Classify a year against the micro-entreprise ceiling.
///
/// Each year is compared to the ceiling independently: only two consecutive
/// years over the ceiling count as exceeding it.
pub fn classify_ceiling(
    year_total: Decimal,
    previous_year_total: Decimal,
    ceiling: Decimal,
) -> CeilingStatus {
    match (year_total > ceiling, previous_year_total > ceiling) {
        (false, _) => CeilingStatus::Below,
        (true, false) => CeilingStatus::ToleranceYear,
        (true, true) => CeilingStatus::Exceeded,
    }
}

/// Whether going from `total` to `new_total` takes revenue over `threshold`.
pub fn crosses_upward(total: Decimal, new_total: Decimal, threshold: Decimal) -> bool {
    total <= threshold && threshold < new_total
}

/// Whether going from `total` to `new_total` brings revenue back to or under `threshold`.
pub fn crosses_downward(total: Decimal, new_total: Decimal, threshold: Decimal) -> bool {
    total > threshold && new_total <= threshold
}

/// The sum of the amounts that count towards revenue.
pub fn sum_revenue(transactions: &[Transaction]) -> Decimal {
    transactions
        .iter()
        .filter_map(Transaction::revenue_contribution)
        .map(|contribution| contribution.amount)
        .sum()
}

/// Group revenue contributions by fiscal year, dropping years whose delta is zero.
///
/// Removals are passed as negative amounts by the caller.
pub fn deltas_by_year(
    contributions: impl IntoIterator<Item = RevenueContribution>,
) -> BTreeMap<i32, Decimal> {
    let mut deltas = BTreeMap::new();

    for contribution in contributions {
        *deltas.entry(contribution.year).or_insert(Decimal::ZERO) += contribution.amount;
    }

    deltas.retain(|_, delta| !delta.is_zero());
    deltas
}

/// A fiscal year classified against both thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdReport {
    /// The fiscal year.
    pub year: i32,
    /// The year's revenue.
    pub year_total: Decimal,
    /// The previous year's revenue.
    pub previous_year_total: Decimal,
    /// The VAT franchise threshold.
    pub vat_threshold: Decimal,
    /// Whether the year's revenue is over the VAT franchise threshold.
    pub vat_threshold_crossed: bool,
    /// How much revenue is left before the VAT threshold is crossed.
    pub vat_threshold_headroom: Decimal,
    /// The micro-entreprise ceiling.
    pub micro_ceiling: Decimal,
    /// The position relative to the micro-entreprise ceiling.
    pub ceiling_status: CeilingStatus,
}

/// Classify `year` for `owner_id` using the running totals.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn build_threshold_report(
    owner_id: OwnerId,
    year: i32,
    settings: &RateSettings,
    connection: &Connection,
) -> Result<ThresholdReport, Error> {
    let year_total = get_year_total(owner_id, year, connection)?;
    let previous_year_total = get_year_total(owner_id, year - 1, connection)?;

    Ok(ThresholdReport {
        year,
        year_total,
        previous_year_total,
        vat_threshold: settings.vat_threshold,
        vat_threshold_crossed: year_total > settings.vat_threshold,
        vat_threshold_headroom: (settings.vat_threshold - year_total).max(Decimal::ZERO),
        micro_ceiling: settings.micro_ceiling,
        ceiling_status: classify_ceiling(year_total, previous_year_total, settings.micro_ceiling),
    })
}

// ============================================================================
// RUNNING TOTALS
// ============================================================================

/// Recompute the revenue of `year` from every income of the year.
pub fn recompute_year_total(
    owner_id: OwnerId,
    year: i32,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let incomes = list_transactions(owner_id, year, Some(TransactionKind::Income), connection)?;

    Ok(sum_revenue(&incomes))
}

/// The revenue of `year`, from the running total.
///
/// The running total is created from a full recompute if it does not exist yet.
pub fn get_year_total(owner_id: OwnerId, year: i32, connection: &Connection) -> Result<Decimal, Error> {
    if let Some(total) = get_stored_total(owner_id, year, connection)? {
        return Ok(total);
    }

    let total = recompute_year_total(owner_id, year, connection)?;
    store_total(owner_id, year, total, connection)?;

    Ok(total)
}

/// Add `delta` to the running total of `year`.
///
/// Must be called after the mutation the delta describes has been written,
/// in the same SQL transaction. A year without a running total is left alone:
/// its total is recomputed, mutation included, when first needed.
pub fn apply_revenue_delta(
    owner_id: OwnerId,
    year: i32,
    delta: Decimal,
    connection: &Connection,
) -> Result<(), Error> {
    if let Some(total) = get_stored_total(owner_id, year, connection)? {
        store_total(owner_id, year, total + delta, connection)?;
    }

    Ok(())
}

/// The outcome of comparing a running total with a full recompute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reconciliation {
    /// The owner.
    pub owner_id: OwnerId,
    /// The fiscal year.
    pub year: i32,
    /// The running total before reconciliation, if one existed.
    pub stored_total: Option<Decimal>,
    /// The recomputed total, now stored as the running total.
    pub recomputed_total: Decimal,
}

impl Reconciliation {
    /// How far the running total had drifted from the recomputed total.
    pub fn drift(&self) -> Decimal {
        self.stored_total
            .map_or(Decimal::ZERO, |stored| stored - self.recomputed_total)
    }
}

/// Replace the running total of `year` with a full recompute, logging any drift.
pub fn reconcile_year_total(
    owner_id: OwnerId,
    year: i32,
    connection: &Connection,
) -> Result<Reconciliation, Error> {
    let stored_total = get_stored_total(owner_id, year, connection)?;
    let recomputed_total = recompute_year_total(owner_id, year, connection)?;
    store_total(owner_id, year, recomputed_total, connection)?;

    let reconciliation = Reconciliation {
        owner_id,
        year,
        stored_total,
        recomputed_total,
    };

    if !reconciliation.drift().is_zero() {
        tracing::warn!(
            "Running total of owner {owner_id} for {year} drifted by {}, repaired to {recomputed_total}",
            reconciliation.drift()
        );
    }

    Ok(reconciliation)
}

/// Reconcile every running total in the database.
pub fn reconcile_all_running_totals(connection: &Connection) -> Result<Vec<Reconciliation>, Error> {
    let keys = connection
        .prepare("SELECT owner_id, year FROM revenue_total ORDER BY owner_id, year")?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<(OwnerId, i32)>, rusqlite::Error>>()?;

    keys.into_iter()
        .map(|(owner_id, year)| reconcile_year_total(owner_id, year, connection))
        .collect()
}

fn get_stored_total(
    owner_id: OwnerId,
    year: i32,
    connection: &Connection,
) -> Result<Option<Decimal>, Error> {
    connection
        .prepare("SELECT total FROM revenue_total WHERE owner_id = ?1 AND year = ?2")?
        .query_row((owner_id, year), |row| read_decimal(row, 0))
        .optional()
        .map_err(|error| error.into())
}

fn store_total(
    owner_id: OwnerId,
    year: i32,
    total: Decimal,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO revenue_total (owner_id, year, total) VALUES (?1, ?2, ?3)
         ON CONFLICT(owner_id, year) DO UPDATE SET total = excluded.total",
        (owner_id, year, total.to_string()),
    )?;

    Ok(())
}

/// Create the table holding the running revenue totals.
pub fn create_revenue_total_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS revenue_total (
            owner_id INTEGER NOT NULL,
            year INTEGER NOT NULL,
            total TEXT NOT NULL,
            PRIMARY KEY(owner_id, year)
        )",
        (),
    )?;

    Ok(())
}

#[cfg(test)]
mod classification_tests {
    use rust_decimal_macros::dec;

    use super::{CeilingStatus, classify_ceiling, crosses_downward, crosses_upward};

    #[test]
    fn adding_income_crosses_threshold() {
        let (total, threshold) = (dec!(36000), dec!(37500));

        assert!(crosses_upward(total, total + dec!(2000), threshold));
    }

    #[test]
    fn reaching_threshold_exactly_does_not_cross() {
        assert!(!crosses_upward(dec!(36000), dec!(37500), dec!(37500)));
        assert!(crosses_upward(dec!(37500), dec!(37500.01), dec!(37500)));
    }

    #[test]
    fn already_over_threshold_does_not_cross_again() {
        assert!(!crosses_upward(dec!(40000), dec!(41000), dec!(37500)));
    }

    #[test]
    fn dropping_to_threshold_crosses_downward() {
        assert!(crosses_downward(dec!(38000), dec!(37500), dec!(37500)));
        assert!(!crosses_downward(dec!(38000), dec!(37500.01), dec!(37500)));
        assert!(!crosses_downward(dec!(37000), dec!(36000), dec!(37500)));
    }

    #[test]
    fn single_year_over_ceiling_is_tolerated() {
        assert_eq!(
            classify_ceiling(dec!(80000), dec!(70000), dec!(77700)),
            CeilingStatus::ToleranceYear
        );
    }

    #[test]
    fn two_consecutive_years_over_ceiling_exceed_it() {
        assert_eq!(
            classify_ceiling(dec!(80000), dec!(78000), dec!(77700)),
            CeilingStatus::Exceeded
        );
    }

    #[test]
    fn year_under_ceiling_is_below_regardless_of_previous_year() {
        assert_eq!(
            classify_ceiling(dec!(77700), dec!(90000), dec!(77700)),
            CeilingStatus::Below
        );
    }
}

#[cfg(test)]
mod running_total_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        db::initialize,
        settings::RateSettings,
        transaction::{IncomeStatus, Transaction, TransactionKind, create_transaction},
    };

    use super::{
        CeilingStatus, apply_revenue_delta, build_threshold_report, get_year_total,
        reconcile_all_running_totals, reconcile_year_total,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn total_excludes_quotes_and_expenses() {
        let conn = get_test_connection();
        let date = date!(2024 - 03 - 01);
        create_transaction(Transaction::build(1, TransactionKind::Income, dec!(100), date), &conn)
            .unwrap();
        create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(500), date)
                .status(Some(IncomeStatus::QuoteSent)),
            &conn,
        )
        .unwrap();
        create_transaction(Transaction::build(1, TransactionKind::Expense, dec!(40), date), &conn)
            .unwrap();

        assert_eq!(get_year_total(1, 2024, &conn), Ok(dec!(100)));
    }

    #[test]
    fn delta_updates_existing_running_total() {
        let conn = get_test_connection();
        assert_eq!(get_year_total(1, 2024, &conn), Ok(dec!(0)));

        apply_revenue_delta(1, 2024, dec!(250.50), &conn).unwrap();
        apply_revenue_delta(1, 2024, dec!(-50.50), &conn).unwrap();

        assert_eq!(get_year_total(1, 2024, &conn), Ok(dec!(200)));
    }

    #[test]
    fn reconcile_repairs_drift() {
        let conn = get_test_connection();
        create_transaction(
            Transaction::build(1, TransactionKind::Income, dec!(100), date!(2024 - 03 - 01)),
            &conn,
        )
        .unwrap();
        get_year_total(1, 2024, &conn).unwrap();
        apply_revenue_delta(1, 2024, dec!(42), &conn).unwrap();

        let reconciliation = reconcile_year_total(1, 2024, &conn).unwrap();

        assert_eq!(reconciliation.drift(), dec!(42));
        assert_eq!(get_year_total(1, 2024, &conn), Ok(dec!(100)));
    }

    #[test]
    fn reconcile_all_visits_every_running_total() {
        let conn = get_test_connection();
        get_year_total(1, 2023, &conn).unwrap();
        get_year_total(2, 2024, &conn).unwrap();

        let reconciliations = reconcile_all_running_totals(&conn).unwrap();

        assert_eq!(
            reconciliations
                .iter()
                .map(|r| (r.owner_id, r.year))
                .collect::<Vec<_>>(),
            vec![(1, 2023), (2, 2024)]
        );
    }

    #[test]
    fn report_uses_previous_year_for_ceiling() {
        let conn = get_test_connection();
        for (amount, date) in [
            (dec!(78000), date!(2023 - 06 - 01)),
            (dec!(80000), date!(2024 - 06 - 01)),
        ] {
            create_transaction(Transaction::build(1, TransactionKind::Income, amount, date), &conn)
                .unwrap();
        }

        let report = build_threshold_report(1, 2024, &RateSettings::default(), &conn).unwrap();

        assert!(report.vat_threshold_crossed);
        assert_eq!(report.vat_threshold_headroom, dec!(0));
        assert_eq!(report.ceiling_status, CeilingStatus::Exceeded);
    }
}
