//! Platforms (marketplaces, payment processors) and the fees they charge on incomes.

mod core;
mod endpoints;

pub use core::{
    FeeSchedule, NewPlatform, Platform, create_platform, create_platform_table,
    get_fee_schedules, get_platform, list_platforms,
};
pub use endpoints::{create_platform_endpoint, get_platform_endpoint, list_platforms_endpoint};
