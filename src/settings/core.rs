//! Rate settings and their storage.

use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{
    Error, database_id::OwnerId, money::read_optional_decimal, transaction::TaxCategory,
};

/// The thresholds and rates used by the fiscal calculations.
///
/// Rates are percentages, e.g. `23.1` for 23.1 %.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSettings {
    /// Yearly revenue above which the owner must charge VAT.
    pub vat_threshold: Decimal,
    /// Yearly revenue above which the micro-entreprise regime no longer applies.
    pub micro_ceiling: Decimal,
    /// Social contribution rate for liberal services.
    pub bnc_rate: Decimal,
    /// Social contribution rate for commercial services.
    pub bic_rate: Decimal,
    /// Social contribution rate for sales of goods.
    pub vente_rate: Decimal,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            vat_threshold: dec!(37500),
            micro_ceiling: dec!(77700),
            bnc_rate: dec!(23.1),
            bic_rate: dec!(21.2),
            vente_rate: dec!(12.3),
        }
    }
}

impl RateSettings {
    /// The social contribution rate for `tax_category`, the BNC rate when unset.
    pub fn social_contribution_rate(&self, tax_category: Option<TaxCategory>) -> Decimal {
        match tax_category {
            Some(TaxCategory::Bic) => self.bic_rate,
            Some(TaxCategory::Vente) => self.vente_rate,
            Some(TaxCategory::Bnc) | None => self.bnc_rate,
        }
    }

    fn with_overrides(self, overrides: &RateSettingsOverrides) -> Self {
        Self {
            vat_threshold: overrides.vat_threshold.unwrap_or(self.vat_threshold),
            micro_ceiling: overrides.micro_ceiling.unwrap_or(self.micro_ceiling),
            bnc_rate: overrides.bnc_rate.unwrap_or(self.bnc_rate),
            bic_rate: overrides.bic_rate.unwrap_or(self.bic_rate),
            vente_rate: overrides.vente_rate.unwrap_or(self.vente_rate),
        }
    }
}

/// Owner specific values replacing the defaults. `None` keeps the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSettingsOverrides {
    /// See [RateSettings::vat_threshold].
    #[serde(default)]
    pub vat_threshold: Option<Decimal>,
    /// See [RateSettings::micro_ceiling].
    #[serde(default)]
    pub micro_ceiling: Option<Decimal>,
    /// See [RateSettings::bnc_rate].
    #[serde(default)]
    pub bnc_rate: Option<Decimal>,
    /// See [RateSettings::bic_rate].
    #[serde(default)]
    pub bic_rate: Option<Decimal>,
    /// See [RateSettings::vente_rate].
    #[serde(default)]
    pub vente_rate: Option<Decimal>,
}

impl RateSettingsOverrides {
    fn validate(&self) -> Result<(), Error> {
        let values = [
            ("vat_threshold", self.vat_threshold),
            ("micro_ceiling", self.micro_ceiling),
            ("bnc_rate", self.bnc_rate),
            ("bic_rate", self.bic_rate),
            ("vente_rate", self.vente_rate),
        ];

        for (field, value) in values {
            match value {
                Some(value) if value.is_sign_negative() && !value.is_zero() => {
                    return Err(Error::InvalidField {
                        field,
                        reason: format!("{value} is negative"),
                    });
                }
                Some(value) if field.ends_with("_rate") && value > dec!(100) => {
                    return Err(Error::InvalidField {
                        field,
                        reason: format!("{value} is more than 100 percent"),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// The settings in effect for `owner_id`: the defaults with the owner's overrides applied.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn get_rate_settings(owner_id: OwnerId, connection: &Connection) -> Result<RateSettings, Error> {
    let overrides = get_overrides(owner_id, connection)?.unwrap_or_default();

    Ok(RateSettings::default().with_overrides(&overrides))
}

/// Replace the overrides of `owner_id` and return the settings now in effect.
///
/// # Errors
/// Returns a validation error for negative values or rates above 100 %, or
/// an [Error::SqlError] if there is an SQL error.
pub fn save_rate_settings(
    owner_id: OwnerId,
    overrides: RateSettingsOverrides,
    connection: &Connection,
) -> Result<RateSettings, Error> {
    overrides.validate()?;

    connection.execute(
        "INSERT INTO rate_settings (owner_id, vat_threshold, micro_ceiling, bnc_rate, bic_rate, vente_rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(owner_id) DO UPDATE SET
            vat_threshold = excluded.vat_threshold,
            micro_ceiling = excluded.micro_ceiling,
            bnc_rate = excluded.bnc_rate,
            bic_rate = excluded.bic_rate,
            vente_rate = excluded.vente_rate",
        (
            owner_id,
            overrides.vat_threshold.map(|value| value.to_string()),
            overrides.micro_ceiling.map(|value| value.to_string()),
            overrides.bnc_rate.map(|value| value.to_string()),
            overrides.bic_rate.map(|value| value.to_string()),
            overrides.vente_rate.map(|value| value.to_string()),
        ),
    )?;

    tracing::info!("Saved rate settings overrides for owner {owner_id}");

    Ok(RateSettings::default().with_overrides(&overrides))
}

fn get_overrides(
    owner_id: OwnerId,
    connection: &Connection,
) -> Result<Option<RateSettingsOverrides>, Error> {
    connection
        .prepare(
            "SELECT vat_threshold, micro_ceiling, bnc_rate, bic_rate, vente_rate
             FROM rate_settings WHERE owner_id = ?1",
        )?
        .query_row((owner_id,), map_overrides_row)
        .optional()
        .map_err(|error| error.into())
}

fn map_overrides_row(row: &Row) -> Result<RateSettingsOverrides, rusqlite::Error> {
    Ok(RateSettingsOverrides {
        vat_threshold: read_optional_decimal(row, 0)?,
        micro_ceiling: read_optional_decimal(row, 1)?,
        bnc_rate: read_optional_decimal(row, 2)?,
        bic_rate: read_optional_decimal(row, 3)?,
        vente_rate: read_optional_decimal(row, 4)?,
    })
}

/// Create the table holding per-owner rate overrides.
pub fn create_rate_settings_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS rate_settings (
            owner_id INTEGER PRIMARY KEY,
            vat_threshold TEXT,
            micro_ceiling TEXT,
            bnc_rate TEXT,
            bic_rate TEXT,
            vente_rate TEXT
        )",
        (),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;

    use crate::{
        Error,
        db::initialize,
        settings::{RateSettings, RateSettingsOverrides, get_rate_settings, save_rate_settings},
        transaction::TaxCategory,
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = RateSettings::default();

        assert_eq!(settings.vat_threshold, dec!(37500));
        assert_eq!(settings.micro_ceiling, dec!(77700));
        assert_eq!(settings.bnc_rate, dec!(23.1));
        assert_eq!(settings.bic_rate, dec!(21.2));
        assert_eq!(settings.vente_rate, dec!(12.3));
    }

    #[test]
    fn contribution_rate_defaults_to_bnc() {
        let settings = RateSettings::default();

        assert_eq!(settings.social_contribution_rate(None), dec!(23.1));
        assert_eq!(
            settings.social_contribution_rate(Some(TaxCategory::Vente)),
            dec!(12.3)
        );
    }

    #[test]
    fn owner_without_overrides_gets_defaults() {
        let conn = get_test_connection();

        assert_eq!(get_rate_settings(1, &conn), Ok(RateSettings::default()));
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let conn = get_test_connection();

        save_rate_settings(
            1,
            RateSettingsOverrides {
                vat_threshold: Some(dec!(36800)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();
        let settings = get_rate_settings(1, &conn).unwrap();

        assert_eq!(settings.vat_threshold, dec!(36800));
        assert_eq!(settings.micro_ceiling, dec!(77700));
        assert_eq!(get_rate_settings(2, &conn), Ok(RateSettings::default()));
    }

    #[test]
    fn saving_again_replaces_previous_overrides() {
        let conn = get_test_connection();
        save_rate_settings(
            1,
            RateSettingsOverrides {
                bnc_rate: Some(dec!(24.6)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        save_rate_settings(1, RateSettingsOverrides::default(), &conn).unwrap();

        assert_eq!(get_rate_settings(1, &conn), Ok(RateSettings::default()));
    }

    #[test]
    fn rejects_rate_above_one_hundred_percent() {
        let conn = get_test_connection();

        let result = save_rate_settings(
            1,
            RateSettingsOverrides {
                bic_rate: Some(dec!(120)),
                ..Default::default()
            },
            &conn,
        );

        assert!(matches!(
            result,
            Err(Error::InvalidField {
                field: "bic_rate",
                ..
            })
        ));
    }
}
