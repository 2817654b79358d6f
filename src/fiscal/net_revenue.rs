//! Decomposes a transaction into platform fees, social contributions and net revenue.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    database_id::PlatformId,
    fiscal::FiscalProfile,
    money::{percent_of, round_cents},
    platform::FeeSchedule,
    settings::RateSettings,
    transaction::{Transaction, TransactionKind},
};

/// The decomposition of a transaction's gross amount.
///
/// `net = gross - effective_fee - social_contribution` always holds exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NetRevenue {
    /// The tax-exclusive amount of the transaction.
    pub gross: Decimal,
    /// The platform fee before VAT.
    pub fee_excl_vat: Decimal,
    /// The VAT the platform charges on its fee.
    pub fee_vat: Decimal,
    /// The platform fee including VAT.
    pub fee_incl_vat: Decimal,
    /// The part of the fee that is a real cost to the owner.
    pub effective_fee: Decimal,
    /// The social contribution due on the gross amount.
    pub social_contribution: Decimal,
    /// What the owner keeps.
    pub net: Decimal,
}

/// Decompose `transaction` into fees, social contribution and net revenue.
///
/// An owner who is not subject to VAT cannot reclaim the VAT charged on
/// platform fees, so for them the VAT-inclusive fee is the cost. Expenses
/// carry no fees nor contributions, their net is their gross amount.
///
/// The function has no side effects and always returns the same result for
/// the same inputs.
pub fn calculate_net_revenue(
    transaction: &Transaction,
    fees: &FeeSchedule,
    profile: &FiscalProfile,
    settings: &RateSettings,
) -> NetRevenue {
    let gross = transaction.amount;

    if transaction.kind == TransactionKind::Expense {
        return NetRevenue {
            gross,
            net: gross,
            ..Default::default()
        };
    }

    let fee_excl_vat = round_cents(percent_of(gross, fees.percentage_rate) + fees.fixed_fee);
    let fee_vat = round_cents(percent_of(fee_excl_vat, fees.fee_vat_rate));
    let fee_incl_vat = fee_excl_vat + fee_vat;
    let effective_fee = if profile.is_subject_to_vat {
        fee_excl_vat
    } else {
        fee_incl_vat
    };

    let rate = settings.social_contribution_rate(transaction.tax_category);
    let social_contribution = round_cents(percent_of(gross, rate));

    NetRevenue {
        gross,
        fee_excl_vat,
        fee_vat,
        fee_incl_vat,
        effective_fee,
        social_contribution,
        net: gross - effective_fee - social_contribution,
    }
}

/// Totals of [NetRevenue] over the incomes of a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NetRevenueSummary {
    /// The number of incomes summed.
    pub income_count: usize,
    /// The sum of the decomposed amounts.
    #[serde(flatten)]
    pub totals: NetRevenue,
    /// The sum of expenses, for reference.
    pub expenses: Decimal,
}

/// Sum the decompositions of `transactions`.
///
/// Quote-stage incomes are skipped. A platform ID missing from `fee_schedules`
/// is treated as charging no fee.
pub fn summarize_net_revenue(
    transactions: &[Transaction],
    fee_schedules: &HashMap<PlatformId, FeeSchedule>,
    profile: &FiscalProfile,
    settings: &RateSettings,
) -> NetRevenueSummary {
    let no_fees = FeeSchedule::default();
    let mut summary = NetRevenueSummary::default();

    for transaction in transactions {
        if transaction.kind == TransactionKind::Expense {
            summary.expenses += transaction.amount;
            continue;
        }

        if transaction.revenue_contribution().is_none() {
            continue;
        }

        let fees = transaction
            .platform_id
            .and_then(|id| fee_schedules.get(&id))
            .unwrap_or(&no_fees);
        let breakdown = calculate_net_revenue(transaction, fees, profile, settings);

        summary.income_count += 1;
        summary.totals.gross += breakdown.gross;
        summary.totals.fee_excl_vat += breakdown.fee_excl_vat;
        summary.totals.fee_vat += breakdown.fee_vat;
        summary.totals.fee_incl_vat += breakdown.fee_incl_vat;
        summary.totals.effective_fee += breakdown.effective_fee;
        summary.totals.social_contribution += breakdown.social_contribution;
        summary.totals.net += breakdown.net;
    }

    summary
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        fiscal::{FiscalProfile, FiscalState},
        platform::FeeSchedule,
        settings::RateSettings,
        transaction::{IncomeStatus, TaxCategory, Transaction, TransactionKind},
    };

    use super::{calculate_net_revenue, summarize_net_revenue};

    fn income(amount: rust_decimal::Decimal) -> Transaction {
        Transaction {
            id: 1,
            owner_id: 1,
            kind: TransactionKind::Income,
            amount,
            date: date!(2024 - 03 - 01),
            description: String::new(),
            category: None,
            platform_id: Some(1),
            vat_rate: dec!(0),
            vat_amount: dec!(0),
            recurrence: None,
            series_id: None,
            tax_category: Some(TaxCategory::Vente),
            status: Some(IncomeStatus::Confirmed),
        }
    }

    fn profile(is_subject_to_vat: bool) -> FiscalProfile {
        FiscalProfile {
            owner_id: 1,
            is_subject_to_vat,
            vat_activation_date: None,
            state: if is_subject_to_vat {
                FiscalState::Subject
            } else {
                FiscalState::NotSubject
            },
            version: 0,
        }
    }

    fn etsy_fees() -> FeeSchedule {
        FeeSchedule {
            percentage_rate: dec!(6.5),
            fixed_fee: dec!(0.20),
            fee_vat_rate: dec!(20),
        }
    }

    #[test]
    fn unregistered_seller_pays_fee_vat() {
        let breakdown = calculate_net_revenue(
            &income(dec!(100)),
            &etsy_fees(),
            &profile(false),
            &RateSettings::default(),
        );

        assert_eq!(breakdown.fee_excl_vat, dec!(6.70));
        assert_eq!(breakdown.fee_vat, dec!(1.34));
        assert_eq!(breakdown.fee_incl_vat, dec!(8.04));
        assert_eq!(breakdown.effective_fee, dec!(8.04));
        assert_eq!(breakdown.social_contribution, dec!(12.30));
        assert_eq!(breakdown.net, dec!(79.66));
    }

    #[test]
    fn registered_seller_recovers_fee_vat() {
        let breakdown = calculate_net_revenue(
            &income(dec!(100)),
            &etsy_fees(),
            &profile(true),
            &RateSettings::default(),
        );

        assert_eq!(breakdown.effective_fee, dec!(6.70));
        assert_eq!(breakdown.net, dec!(81.00));
    }

    #[test]
    fn net_is_gross_minus_costs() {
        for amount in [dec!(0.01), dec!(19.99), dec!(1234.56), dec!(40000)] {
            for subject in [true, false] {
                let breakdown = calculate_net_revenue(
                    &income(amount),
                    &etsy_fees(),
                    &profile(subject),
                    &RateSettings::default(),
                );

                assert_eq!(
                    breakdown.net,
                    breakdown.gross - breakdown.effective_fee - breakdown.social_contribution
                );
                assert_eq!(
                    breakdown.effective_fee == breakdown.fee_excl_vat + breakdown.fee_vat,
                    !subject || breakdown.fee_vat.is_zero()
                );
            }
        }
    }

    #[test]
    fn missing_schedule_and_category_default_to_zero_fee_and_bnc() {
        let mut transaction = income(dec!(200));
        transaction.tax_category = None;

        let breakdown = calculate_net_revenue(
            &transaction,
            &FeeSchedule::default(),
            &profile(false),
            &RateSettings::default(),
        );

        assert_eq!(breakdown.effective_fee, dec!(0));
        assert_eq!(breakdown.social_contribution, dec!(46.20));
        assert_eq!(breakdown.net, dec!(153.80));
    }

    #[test]
    fn expense_has_no_fees_or_contribution() {
        let mut transaction = income(dec!(50));
        transaction.kind = TransactionKind::Expense;

        let breakdown = calculate_net_revenue(
            &transaction,
            &etsy_fees(),
            &profile(false),
            &RateSettings::default(),
        );

        assert_eq!(breakdown.net, dec!(50));
        assert_eq!(breakdown.social_contribution, dec!(0));
    }

    #[test]
    fn calculation_is_idempotent() {
        let transaction = income(dec!(321.09));
        let fees = etsy_fees();
        let profile = profile(false);
        let settings = RateSettings::default();

        let first = calculate_net_revenue(&transaction, &fees, &profile, &settings);
        let second = calculate_net_revenue(&transaction, &fees, &profile, &settings);

        assert_eq!(first, second);
    }

    #[test]
    fn summary_skips_quotes_and_counts_expenses() {
        let mut quote = income(dec!(1000));
        quote.status = Some(IncomeStatus::QuoteSent);
        let mut expense = income(dec!(30));
        expense.kind = TransactionKind::Expense;
        let fees = HashMap::from([(1, etsy_fees())]);

        let summary = summarize_net_revenue(
            &[income(dec!(100)), quote, expense],
            &fees,
            &profile(false),
            &RateSettings::default(),
        );

        assert_eq!(summary.income_count, 1);
        assert_eq!(summary.totals.gross, dec!(100));
        assert_eq!(summary.totals.net, dec!(79.66));
        assert_eq!(summary.expenses, dec!(30));
    }
}
