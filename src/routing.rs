//! Application router configuration.

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::{
    AppState, Error, endpoints,
    fiscal::{
        apply_regularization_endpoint, discard_activation_endpoint, get_fiscal_profile_endpoint,
        get_fiscal_summary_endpoint, get_pending_regularization_endpoint, reconcile_endpoint,
        resolve_activation_endpoint, resolve_reversion_endpoint, set_vat_subjection_endpoint,
    },
    platform::{create_platform_endpoint, get_platform_endpoint, list_platforms_endpoint},
    settings::{get_rate_settings_endpoint, update_rate_settings_endpoint},
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, edit_transaction_endpoint,
        list_transactions_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::TRANSACTIONS,
            post(create_transaction_endpoint).get(list_transactions_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            put(edit_transaction_endpoint).delete(delete_transaction_endpoint),
        )
        .route(endpoints::FISCAL, get(get_fiscal_profile_endpoint))
        .route(endpoints::FISCAL_VAT, put(set_vat_subjection_endpoint))
        .route(endpoints::FISCAL_SUMMARY, get(get_fiscal_summary_endpoint))
        .route(
            endpoints::FISCAL_ACTIVATION,
            post(resolve_activation_endpoint).delete(discard_activation_endpoint),
        )
        .route(
            endpoints::FISCAL_REGULARIZATION,
            get(get_pending_regularization_endpoint).post(apply_regularization_endpoint),
        )
        .route(endpoints::FISCAL_REVERSION, post(resolve_reversion_endpoint))
        .route(endpoints::FISCAL_RECONCILE, post(reconcile_endpoint))
        .route(
            endpoints::SETTINGS,
            get(get_rate_settings_endpoint).put(update_rate_settings_endpoint),
        )
        .route(
            endpoints::PLATFORMS,
            post(create_platform_endpoint).get(list_platforms_endpoint),
        )
        .route(endpoints::PLATFORM, get(get_platform_endpoint))
        .fallback(get_404_not_found)
        .with_state(state)
}

async fn get_404_not_found() -> Error {
    Error::NotFound
}
