//! The request body for creating or replacing a transaction, and its validation.

use rust_decimal::Decimal;
use serde::Deserialize;
use time::Date;

use crate::{
    Error,
    database_id::{OwnerId, PlatformId},
    transaction::{IncomeStatus, Recurrence, TaxCategory, Transaction, TransactionBuilder, TransactionKind},
};

/// The JSON body for creating or replacing a transaction.
///
/// Every field is optional at the parsing stage so that a missing field is
/// reported as a validation error naming the field.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransactionForm {
    /// Whether the transaction is an income or an expense.
    #[serde(default)]
    pub kind: Option<TransactionKind>,
    /// The tax-exclusive amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// When the transaction happened.
    #[serde(default)]
    pub date: Option<Date>,
    /// What the transaction was for.
    #[serde(default)]
    pub description: Option<String>,
    /// A free text category.
    #[serde(default)]
    pub category: Option<String>,
    /// The platform the income was made through.
    #[serde(default)]
    pub platform_id: Option<PlatformId>,
    /// The VAT rate as a percentage. Defaults to the owner's current rate.
    #[serde(default)]
    pub vat_rate: Option<Decimal>,
    /// How the transaction repeats.
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// The tax category, incomes only.
    #[serde(default)]
    pub tax_category: Option<TaxCategory>,
    /// The status, incomes only. Defaults to confirmed.
    #[serde(default)]
    pub status: Option<IncomeStatus>,
}

impl TransactionForm {
    /// Check the form without touching any stored data, returning its kind,
    /// amount and date.
    ///
    /// # Errors
    /// Returns [Error::MissingField] when the kind, amount or date is missing,
    /// or [Error::InvalidField] when:
    /// - the amount is not positive,
    /// - the VAT rate is negative or above 100 %,
    /// - the recurrence ends before the transaction date,
    /// - an expense has a platform, tax category or status.
    pub fn validate(&self) -> Result<(TransactionKind, Decimal, Date), Error> {
        let kind = self.kind.ok_or(Error::MissingField("kind"))?;
        let amount = self.amount.ok_or(Error::MissingField("amount"))?;
        let date = self.date.ok_or(Error::MissingField("date"))?;

        if amount <= Decimal::ZERO {
            return Err(Error::InvalidField {
                field: "amount",
                reason: format!("{amount} is not a positive amount"),
            });
        }

        if let Some(vat_rate) = self.vat_rate
            && (vat_rate < Decimal::ZERO || vat_rate > Decimal::ONE_HUNDRED)
        {
            return Err(Error::InvalidField {
                field: "vat_rate",
                reason: format!("{vat_rate} is not a percentage between 0 and 100"),
            });
        }

        if let Some(end_date) = self.recurrence.and_then(|recurrence| recurrence.end_date)
            && end_date < date
        {
            return Err(Error::InvalidField {
                field: "end_date",
                reason: format!("the recurrence ends on {end_date}, before the transaction on {date}"),
            });
        }

        if kind == TransactionKind::Expense {
            let income_only_field = [
                ("platform_id", self.platform_id.is_some()),
                ("tax_category", self.tax_category.is_some()),
                ("status", self.status.is_some()),
            ]
            .into_iter()
            .find_map(|(field, is_set)| is_set.then_some(field));

            if let Some(field) = income_only_field {
                return Err(Error::InvalidField {
                    field,
                    reason: "only incomes can have this field".to_owned(),
                });
            }
        }

        Ok((kind, amount, date))
    }

    /// Validate the form and turn it into a transaction of `owner_id`.
    ///
    /// Incomes without a VAT rate get `default_vat_rate`, expenses get zero.
    ///
    /// # Errors
    /// Returns the errors of [TransactionForm::validate].
    pub fn into_builder(
        self,
        owner_id: OwnerId,
        default_vat_rate: Decimal,
    ) -> Result<TransactionBuilder, Error> {
        let (kind, amount, date) = self.validate()?;

        let vat_rate = match (self.vat_rate, kind) {
            (Some(vat_rate), _) => vat_rate,
            (None, TransactionKind::Income) => default_vat_rate,
            (None, TransactionKind::Expense) => Decimal::ZERO,
        };

        let mut builder = Transaction::build(owner_id, kind, amount, date)
            .description(self.description.as_deref().unwrap_or_default())
            .category(self.category)
            .platform_id(self.platform_id)
            .vat_rate(vat_rate)
            .recurrence(self.recurrence)
            .tax_category(self.tax_category);

        if self.status.is_some() {
            builder = builder.status(self.status);
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error,
        transaction::{Frequency, IncomeStatus, Recurrence, TaxCategory, TransactionKind},
    };

    use super::TransactionForm;

    fn income_form() -> TransactionForm {
        TransactionForm {
            kind: Some(TransactionKind::Income),
            amount: Some(dec!(150)),
            date: Some(date!(2024 - 05 - 20)),
            description: Some("Logo design".to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn income_gets_default_vat_rate_and_confirmed_status() {
        let builder = income_form().into_builder(1, dec!(20)).unwrap();

        assert_eq!(builder.vat_rate, dec!(20));
        assert_eq!(builder.status, Some(IncomeStatus::Confirmed));
        assert_eq!(builder.description, "Logo design");
    }

    #[test]
    fn explicit_values_are_kept() {
        let form = TransactionForm {
            vat_rate: Some(dec!(5.5)),
            tax_category: Some(TaxCategory::Bic),
            status: Some(IncomeStatus::QuoteSent),
            ..income_form()
        };

        let builder = form.into_builder(1, dec!(20)).unwrap();

        assert_eq!(builder.vat_rate, dec!(5.5));
        assert_eq!(builder.tax_category, Some(TaxCategory::Bic));
        assert_eq!(builder.status, Some(IncomeStatus::QuoteSent));
    }

    #[test]
    fn expense_defaults_to_no_vat() {
        let form = TransactionForm {
            kind: Some(TransactionKind::Expense),
            ..income_form()
        };

        let builder = form.into_builder(1, dec!(20)).unwrap();

        assert_eq!(builder.vat_rate, dec!(0));
        assert_eq!(builder.status, None);
    }

    #[test]
    fn missing_fields_are_named() {
        let form = TransactionForm {
            amount: None,
            ..income_form()
        };

        assert_eq!(
            form.into_builder(1, dec!(0)),
            Err(Error::MissingField("amount"))
        );
        assert_eq!(
            TransactionForm::default().into_builder(1, dec!(0)),
            Err(Error::MissingField("kind"))
        );
    }

    #[test]
    fn rejects_non_positive_amount() {
        let form = TransactionForm {
            amount: Some(dec!(0)),
            ..income_form()
        };

        assert!(matches!(
            form.into_builder(1, dec!(0)),
            Err(Error::InvalidField { field: "amount", .. })
        ));
    }

    #[test]
    fn rejects_negative_vat_rate() {
        let form = TransactionForm {
            vat_rate: Some(dec!(-1)),
            ..income_form()
        };

        assert!(matches!(
            form.into_builder(1, dec!(0)),
            Err(Error::InvalidField { field: "vat_rate", .. })
        ));
    }

    #[test]
    fn rejects_recurrence_ending_before_start() {
        let form = TransactionForm {
            recurrence: Some(Recurrence {
                frequency: Frequency::Monthly,
                end_date: Some(date!(2024 - 01 - 01)),
            }),
            ..income_form()
        };

        assert!(matches!(
            form.into_builder(1, dec!(0)),
            Err(Error::InvalidField { field: "end_date", .. })
        ));
    }

    #[test]
    fn rejects_income_fields_on_expense() {
        let form = TransactionForm {
            kind: Some(TransactionKind::Expense),
            tax_category: Some(TaxCategory::Bnc),
            ..income_form()
        };

        assert!(matches!(
            form.into_builder(1, dec!(0)),
            Err(Error::InvalidField { field: "tax_category", .. })
        ));
    }
}
