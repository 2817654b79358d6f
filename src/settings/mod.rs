//! Fiscal thresholds and social contribution rates, with per-owner overrides.

mod core;
mod endpoints;

pub use core::{
    RateSettings, RateSettingsOverrides, create_rate_settings_table, get_rate_settings,
    save_rate_settings,
};
pub use endpoints::{get_rate_settings_endpoint, update_rate_settings_endpoint};
