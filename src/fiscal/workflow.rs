//! Coordinates transaction mutations with the owner's VAT liability.
//!
//! Every mutation that changes revenue goes through this module so that
//! crossing the VAT threshold, in either direction, is detected and turned
//! into a decision the owner must make. Each operation runs in one SQL
//! transaction and writes the fiscal profile last, so a concurrent change to
//! the profile aborts the whole operation.

use std::collections::{BTreeMap, HashSet};

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    database_id::{OwnerId, TransactionId},
    fiscal::{
        profile::{FiscalProfile, FiscalState, PendingTrigger, get_fiscal_profile, write_fiscal_profile},
        regularization::{RegularizationPrompt, find_candidates, record_pending_regularization},
        threshold::{apply_revenue_delta, crosses_downward, crosses_upward, deltas_by_year, get_year_total},
    },
    money::{STANDARD_VAT_RATE, exclude_standard_vat},
    settings::get_rate_settings,
    transaction::{
        RevenueContribution, Transaction, TransactionBuilder, delete_transaction,
        generate_missed_occurrences, get_transaction, insert_transaction_series,
        update_transaction,
    },
};

// ============================================================================
// MODELS
// ============================================================================

/// Asks the owner how VAT was invoiced on the income that crossed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActivationPrompt {
    /// The revenue the submission adds to the crossed year.
    pub trigger_amount: Decimal,
    /// When the submitted income happened.
    pub trigger_date: Date,
    /// The year's revenue before the submission.
    pub year_total: Decimal,
    /// The VAT franchise threshold.
    pub threshold: Decimal,
}

impl From<&PendingTrigger> for ActivationPrompt {
    fn from(trigger: &PendingTrigger) -> Self {
        Self {
            trigger_amount: trigger.amount(),
            trigger_date: trigger.date(),
            year_total: trigger.year_total,
            threshold: trigger.threshold,
        }
    }
}

/// Asks the owner whether to leave VAT liability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReversionPrompt {
    /// The fiscal year whose revenue dropped.
    pub year: i32,
    /// The year's revenue after the change.
    pub current_year_total: Decimal,
    /// The VAT franchise threshold.
    pub threshold: Decimal,
}

/// The result of submitting a new, edited or deleted transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The change was saved.
    Committed {
        /// The saved transactions, or the deleted one.
        transactions: Vec<Transaction>,
    },
    /// Nothing was saved, the owner must first say how VAT was invoiced.
    ActivationRequired {
        /// What the owner is asked.
        prompt: ActivationPrompt,
    },
    /// The change was saved and took revenue back under the VAT threshold.
    ReversionRequired {
        /// The saved transactions, or the deleted one.
        transactions: Vec<Transaction>,
        /// What the owner is asked.
        prompt: ReversionPrompt,
    },
}

/// How VAT was handled on the income that crossed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationChoice {
    /// The amount entered includes VAT that should have been charged separately.
    Forgotten,
    /// The amount entered excludes VAT, which was invoiced on top.
    AlreadyInvoiced,
}

/// The result of resolving a pending activation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationResult {
    /// The profile after activation.
    pub profile: FiscalProfile,
    /// The transactions saved from the pending submission.
    pub transactions: Vec<Transaction>,
    /// The incomes of the crossing month that must now be regularized.
    pub regularization: RegularizationPrompt,
}

/// The revenue of a year before and after a mutation.
#[derive(Debug, Clone, Copy)]
struct YearChange {
    year: i32,
    total: Decimal,
    delta: Decimal,
}

impl YearChange {
    fn new_total(&self) -> Decimal {
        self.total + self.delta
    }
}

// ============================================================================
// MUTATIONS
// ============================================================================

/// Save a new transaction, backfilling past occurrences when it recurs.
///
/// When the owner is not subject to VAT and the submission takes a year over
/// the VAT threshold, nothing is saved: the submission is kept as the pending
/// trigger, replacing any earlier one, and an activation prompt is returned.
///
/// # Errors
/// Returns [Error::InvalidPlatform] for an unknown platform,
/// [Error::FiscalProfileConflict] if the profile changed concurrently, or an
/// [Error::SqlError] if there is some other SQL error. Nothing is saved when
/// an error is returned.
pub fn submit_new_transaction(
    template: TransactionBuilder,
    today: Date,
    connection: &Connection,
) -> Result<MutationOutcome, Error> {
    let owner_id = template.owner_id;
    let occurrences = if template.recurrence.is_some() {
        generate_missed_occurrences(&template, today)
    } else {
        Vec::new()
    };

    let sql_transaction = connection.unchecked_transaction()?;
    let profile = get_fiscal_profile(owner_id, &sql_transaction)?;
    let threshold = get_rate_settings(owner_id, &sql_transaction)?.vat_threshold;

    let contributions = std::iter::once(&template)
        .chain(occurrences.iter())
        .filter_map(TransactionBuilder::revenue_contribution);
    let changes = year_changes(owner_id, deltas_by_year(contributions), &sql_transaction)?;

    if !profile.is_subject_to_vat {
        let crossing = changes
            .iter()
            .find(|change| crosses_upward(change.total, change.new_total(), threshold));

        if let Some(change) = crossing {
            let trigger = PendingTrigger {
                template,
                occurrences,
                year: change.year,
                year_total: change.total,
                threshold,
            };
            let prompt = ActivationPrompt::from(&trigger);

            write_fiscal_profile(
                &profile.with_state(FiscalState::PendingActivation { trigger }),
                &sql_transaction,
            )?;
            sql_transaction.commit()?;

            tracing::info!(
                "Income of {} for owner {owner_id} crosses the VAT threshold of {threshold} in {}, waiting for activation",
                prompt.trigger_amount,
                change.year
            );

            return Ok(MutationOutcome::ActivationRequired { prompt });
        }
    }

    let transactions = insert_transaction_series(template, occurrences, &sql_transaction)?;
    apply_changes(owner_id, &changes, &sql_transaction)?;
    let state = settle_reversion(&profile.state, &changes, threshold);
    if state != profile.state {
        tracing::info!(
            "Owner {owner_id} moved from {} to {}",
            profile.state.name(),
            state.name()
        );
    }
    write_fiscal_profile(&profile.with_state(state), &sql_transaction)?;
    sql_transaction.commit()?;

    Ok(MutationOutcome::Committed { transactions })
}

/// Replace the transaction `id` with `builder`.
///
/// The series a transaction belongs to is left as is and no occurrences are
/// generated.
///
/// # Errors
/// Returns [Error::VatActivationRequired] if the owner is not subject to VAT
/// and the edit would take a year over the VAT threshold,
/// [Error::NotFound] if the transaction does not exist, or any error of
/// [submit_new_transaction]. Nothing is saved when an error is returned.
pub fn submit_edit(
    id: TransactionId,
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<MutationOutcome, Error> {
    let owner_id = builder.owner_id;

    let sql_transaction = connection.unchecked_transaction()?;
    let existing = get_transaction(owner_id, id, &sql_transaction)?;
    let profile = get_fiscal_profile(owner_id, &sql_transaction)?;
    let threshold = get_rate_settings(owner_id, &sql_transaction)?.vat_threshold;

    let contributions = negated(existing.revenue_contribution())
        .into_iter()
        .chain(builder.revenue_contribution());
    let changes = year_changes(owner_id, deltas_by_year(contributions), &sql_transaction)?;

    if !profile.is_subject_to_vat {
        let exceeding = changes
            .iter()
            .find(|change| change.delta.is_sign_positive() && change.new_total() > threshold);

        if let Some(change) = exceeding {
            tracing::info!(
                "Rejected edit of transaction {id} for owner {owner_id}: {} would reach {}",
                change.year,
                change.new_total()
            );
            return Err(Error::VatActivationRequired {
                year: change.year,
                year_total: change.new_total(),
                threshold,
            });
        }
    }

    let updated = update_transaction(id, &builder, &sql_transaction)?;
    apply_changes(owner_id, &changes, &sql_transaction)?;

    commit_with_reversion_check(profile, vec![updated], &changes, threshold, sql_transaction)
}

/// Delete the transaction `id`.
///
/// # Errors
/// Returns [Error::DeleteMissingTransaction] if the transaction does not
/// exist, [Error::FiscalProfileConflict] if the profile changed concurrently,
/// or an [Error::SqlError] if there is some other SQL error.
pub fn submit_delete(
    owner_id: OwnerId,
    id: TransactionId,
    connection: &Connection,
) -> Result<MutationOutcome, Error> {
    let sql_transaction = connection.unchecked_transaction()?;
    let existing = get_transaction(owner_id, id, &sql_transaction).map_err(|error| match error {
        Error::NotFound => Error::DeleteMissingTransaction,
        error => error,
    })?;
    let profile = get_fiscal_profile(owner_id, &sql_transaction)?;
    let threshold = get_rate_settings(owner_id, &sql_transaction)?.vat_threshold;

    let changes = year_changes(
        owner_id,
        deltas_by_year(negated(existing.revenue_contribution())),
        &sql_transaction,
    )?;

    let deleted = delete_transaction(owner_id, id, &sql_transaction)?;
    apply_changes(owner_id, &changes, &sql_transaction)?;

    commit_with_reversion_check(profile, vec![deleted], &changes, threshold, sql_transaction)
}

fn commit_with_reversion_check(
    profile: FiscalProfile,
    transactions: Vec<Transaction>,
    changes: &[YearChange],
    threshold: Decimal,
    sql_transaction: rusqlite::Transaction<'_>,
) -> Result<MutationOutcome, Error> {
    let dropped = match profile.state {
        FiscalState::Subject => changes
            .iter()
            .find(|change| crosses_downward(change.total, change.new_total(), threshold)),
        _ => None,
    };

    let Some(change) = dropped else {
        let state = settle_reversion(&profile.state, changes, threshold);
        write_fiscal_profile(&profile.with_state(state), &sql_transaction)?;
        sql_transaction.commit()?;

        return Ok(MutationOutcome::Committed { transactions });
    };

    let prompt = ReversionPrompt {
        year: change.year,
        current_year_total: change.new_total(),
        threshold,
    };
    let state = FiscalState::PendingReversion {
        year: change.year,
        year_total: change.new_total(),
        threshold,
    };
    write_fiscal_profile(&profile.with_state(state), &sql_transaction)?;
    sql_transaction.commit()?;

    tracing::info!(
        "Revenue of owner {} for {} dropped to {}, waiting for reversion decision",
        profile.owner_id,
        change.year,
        change.new_total()
    );

    Ok(MutationOutcome::ReversionRequired {
        transactions,
        prompt,
    })
}

/// A pending reversion is dropped once its year is back over the threshold.
fn settle_reversion(state: &FiscalState, changes: &[YearChange], threshold: Decimal) -> FiscalState {
    match state {
        FiscalState::PendingReversion { year, .. }
            if changes
                .iter()
                .any(|change| change.year == *year && change.new_total() > threshold) =>
        {
            FiscalState::Subject
        }
        state => state.clone(),
    }
}

fn negated(contribution: Option<RevenueContribution>) -> Option<RevenueContribution> {
    contribution.map(|contribution| RevenueContribution {
        amount: -contribution.amount,
        ..contribution
    })
}

/// Read the running totals of the years in `deltas`, before the mutation is written.
fn year_changes(
    owner_id: OwnerId,
    deltas: BTreeMap<i32, Decimal>,
    connection: &Connection,
) -> Result<Vec<YearChange>, Error> {
    deltas
        .into_iter()
        .map(|(year, delta)| {
            Ok(YearChange {
                year,
                total: get_year_total(owner_id, year, connection)?,
                delta,
            })
        })
        .collect()
}

fn apply_changes(owner_id: OwnerId, changes: &[YearChange], connection: &Connection) -> Result<(), Error> {
    for change in changes {
        apply_revenue_delta(owner_id, change.year, change.delta, connection)?;
    }

    Ok(())
}

// ============================================================================
// DECISIONS
// ============================================================================

/// Save the pending trigger according to `choice` and make the owner subject to VAT.
///
/// With [ActivationChoice::Forgotten] the VAT is taken out of the submitted
/// amounts, with [ActivationChoice::AlreadyInvoiced] they are kept. Either way
/// the submitted transactions are saved at the standard VAT rate. The other
/// zero-VAT incomes of the crossing month are then recorded as waiting for
/// regularization.
///
/// # Errors
/// Returns [Error::NoPendingDecision] if no activation is pending, or any
/// error of [submit_new_transaction]. Nothing is saved when an error is returned.
pub fn resolve_activation(
    owner_id: OwnerId,
    choice: ActivationChoice,
    today: Date,
    connection: &Connection,
) -> Result<ActivationResult, Error> {
    let sql_transaction = connection.unchecked_transaction()?;
    let profile = get_fiscal_profile(owner_id, &sql_transaction)?;

    let FiscalState::PendingActivation { trigger } = &profile.state else {
        return Err(Error::NoPendingDecision("activation"));
    };

    let trigger_date = trigger.date();
    let adjust = |builder: &TransactionBuilder| {
        let amount = match choice {
            ActivationChoice::Forgotten => exclude_standard_vat(builder.amount),
            ActivationChoice::AlreadyInvoiced => builder.amount,
        };

        TransactionBuilder {
            amount,
            ..builder.clone()
        }
        .vat_rate(STANDARD_VAT_RATE)
    };
    let template = adjust(&trigger.template);
    let occurrences: Vec<_> = trigger.occurrences.iter().map(adjust).collect();

    let contributions = std::iter::once(&template)
        .chain(occurrences.iter())
        .filter_map(TransactionBuilder::revenue_contribution);
    let changes = year_changes(owner_id, deltas_by_year(contributions), &sql_transaction)?;

    let transactions = insert_transaction_series(template, occurrences, &sql_transaction)?;
    apply_changes(owner_id, &changes, &sql_transaction)?;

    let saved_ids: HashSet<TransactionId> = transactions.iter().map(|t| t.id).collect();
    let candidates = find_candidates(owner_id, trigger_date, &saved_ids, &sql_transaction)?;
    let candidate_ids: Vec<_> = candidates.iter().map(|t| t.id).collect();
    record_pending_regularization(owner_id, &candidate_ids, &sql_transaction)?;

    let profile = write_fiscal_profile(&profile.activated(today), &sql_transaction)?;
    sql_transaction.commit()?;

    tracing::info!(
        "Owner {owner_id} is now subject to VAT ({choice:?}), {} transactions to regularize",
        candidates.len()
    );

    Ok(ActivationResult {
        profile,
        transactions,
        regularization: RegularizationPrompt::from(candidates.as_slice()),
    })
}

/// Drop the pending trigger without saving it.
///
/// # Errors
/// Returns [Error::NoPendingDecision] if no activation is pending.
pub fn discard_pending_activation(
    owner_id: OwnerId,
    connection: &Connection,
) -> Result<FiscalProfile, Error> {
    let profile = get_fiscal_profile(owner_id, connection)?;

    if !matches!(profile.state, FiscalState::PendingActivation { .. }) {
        return Err(Error::NoPendingDecision("activation"));
    }

    let profile = write_fiscal_profile(&profile.with_state(FiscalState::NotSubject), connection)?;
    tracing::info!("Discarded pending VAT activation of owner {owner_id}");

    Ok(profile)
}

/// Leave VAT liability when `confirm` is true, otherwise stay subject to VAT.
///
/// No transaction is changed either way. Leaving VAT liability drops the
/// incomes waiting for regularization.
///
/// # Errors
/// Returns [Error::NoPendingDecision] if no reversion is pending.
pub fn resolve_reversion(
    owner_id: OwnerId,
    confirm: bool,
    connection: &Connection,
) -> Result<FiscalProfile, Error> {
    let sql_transaction = connection.unchecked_transaction()?;
    let profile = get_fiscal_profile(owner_id, &sql_transaction)?;

    if !matches!(profile.state, FiscalState::PendingReversion { .. }) {
        return Err(Error::NoPendingDecision("reversion"));
    }

    let next = if confirm {
        record_pending_regularization(owner_id, &[], &sql_transaction)?;
        profile.reverted()
    } else {
        profile.with_state(FiscalState::Subject)
    };
    let profile = write_fiscal_profile(&next, &sql_transaction)?;
    sql_transaction.commit()?;

    tracing::info!(
        "Owner {owner_id} {} VAT liability",
        if confirm { "left" } else { "kept" }
    );

    Ok(profile)
}

/// Set whether the owner is subject to VAT, clearing any pending decision.
///
/// An owner who is already subject keeps their activation date. Leaving VAT
/// liability also drops the incomes waiting for regularization.
pub fn set_vat_subjection(
    owner_id: OwnerId,
    is_subject_to_vat: bool,
    today: Date,
    connection: &Connection,
) -> Result<FiscalProfile, Error> {
    let sql_transaction = connection.unchecked_transaction()?;
    let profile = get_fiscal_profile(owner_id, &sql_transaction)?;

    let previous_state = profile.state.name();
    let next = match (is_subject_to_vat, profile.vat_activation_date) {
        (true, Some(activation_date)) => profile.activated(activation_date),
        (true, None) => profile.activated(today),
        (false, _) => {
            record_pending_regularization(owner_id, &[], &sql_transaction)?;
            profile.reverted()
        }
    };
    let profile = write_fiscal_profile(&next, &sql_transaction)?;
    sql_transaction.commit()?;

    tracing::info!(
        "Set VAT subjection of owner {owner_id} to {is_subject_to_vat}, moving from {previous_state} to {}",
        profile.state.name()
    );

    Ok(profile)
}
