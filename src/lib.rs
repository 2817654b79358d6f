//! Fiscal ledger is a JSON API for independent workers recording income and
//! expenses under a French micro-entrepreneur style regime.
//!
//! <br>
//!
//! Besides storing transactions, the library tracks each owner's yearly
//! revenue against the VAT franchise threshold and the micro-entreprise
//! ceiling, drives the confirmation workflow for entering and leaving VAT
//! liability, regularizes the transactions of the crossing month, and
//! backfills past occurrences of recurring transactions.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::signal;

mod app_state;
mod database_id;
mod db;
mod endpoints;
mod extract;
mod fiscal;
mod logging;
mod money;
mod platform;
mod routing;
mod settings;
mod timezone;
mod transaction;

pub use app_state::AppState;
pub use database_id::{DatabaseId, OwnerId, PlatformId, TransactionId};
pub use db::initialize as initialize_db;
pub use fiscal::{
    ActivationChoice, CeilingStatus, FiscalProfile, FiscalState, NetRevenue, RegularizationReport,
    calculate_net_revenue, reconcile_all_running_totals,
};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;
pub use settings::RateSettings;
pub use timezone::get_local_offset;
pub use transaction::{
    Frequency, IncomeStatus, Recurrence, TaxCategory, Transaction, TransactionBuilder,
    TransactionKind, create_transaction, create_transaction_series, delete_transaction,
    get_transaction, list_transactions, update_transaction,
};

/// How long in-flight requests are given to finish once a shutdown signal arrives.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Could not listen for the ctrl+c signal: {error}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!("Could not install the terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::debug!("Received ctrl+c signal."),
        _ = terminate => tracing::debug!("Received terminate signal."),
    }

    handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
}

/// The errors that may occur in the application.
///
/// Errors fall into four groups which clients can tell apart by the `code`
/// field of the JSON error body:
/// - validation errors, raised before any fiscal logic runs,
/// - domain errors, where the request is well formed but conflicts with the
///   owner's fiscal state,
/// - missing resources,
/// - persistence errors, which leave all state unchanged and can be retried.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A required field was missing from a request.
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    /// A field was present but held a value that is not allowed.
    #[error("invalid value for \"{field}\": {reason}")]
    InvalidField {
        /// The name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A fiscal year that cannot be represented as a calendar date range.
    #[error("{0} is not a valid fiscal year")]
    InvalidYear(i32),

    /// Editing a transaction would take the year's revenue over the VAT
    /// franchise threshold while the owner is not subject to VAT.
    ///
    /// The owner must go through the VAT activation flow first.
    #[error(
        "this change brings the {year} revenue to {year_total}, above the VAT threshold of \
        {threshold}. Activate VAT before making this change"
    )]
    VatActivationRequired {
        /// The fiscal year that would cross the threshold.
        year: i32,
        /// The revenue total the year would reach.
        year_total: Decimal,
        /// The VAT franchise threshold in effect.
        threshold: Decimal,
    },

    /// A decision was submitted but the owner's fiscal profile is not waiting
    /// for a decision of that kind.
    #[error("there is no pending {0} decision")]
    NoPendingDecision(&'static str),

    /// The fiscal profile was changed by another request between being read
    /// and being written.
    #[error("the fiscal profile was modified by another request")]
    FiscalProfileConflict,

    /// The platform ID used for a transaction did not match a platform of the owner.
    #[error("the platform ID does not refer to a valid platform")]
    InvalidPlatform(Option<crate::PlatformId>),

    /// The request body was not valid JSON or did not match the expected shape.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An error occurred while converting the workflow state to or from JSON.
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::JSONSerializationError(value.to_string())
    }
}

/// The JSON body sent to clients when a request fails.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    retryable: bool,
}

impl Error {
    /// A stable, machine readable identifier for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingField(_) | Error::InvalidField { .. } => "validation_error",
            Error::InvalidYear(_) | Error::InvalidBody(_) => "validation_error",
            Error::InvalidPlatform(_) => "invalid_platform",
            Error::VatActivationRequired { .. } => "vat_activation_required",
            Error::NoPendingDecision(_) => "no_pending_decision",
            Error::FiscalProfileConflict => "fiscal_profile_conflict",
            Error::NotFound | Error::UpdateMissingTransaction | Error::DeleteMissingTransaction => {
                "not_found"
            }
            Error::InvalidTimezoneError(_) => "invalid_timezone",
            Error::JSONSerializationError(_) | Error::SqlError(_) | Error::DatabaseLockError => {
                "persistence_error"
            }
        }
    }

    /// Whether re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FiscalProfileConflict | Error::SqlError(_) | Error::DatabaseLockError
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Error::MissingField(_)
            | Error::InvalidField { .. }
            | Error::InvalidYear(_)
            | Error::InvalidPlatform(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::VatActivationRequired { .. }
            | Error::NoPendingDecision(_)
            | Error::FiscalProfileConflict => StatusCode::CONFLICT,
            Error::NotFound | Error::UpdateMissingTransaction | Error::DeleteMissingTransaction => {
                StatusCode::NOT_FOUND
            }
            Error::SqlError(_) | Error::DatabaseLockError => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidTimezoneError(_) | Error::JSONSerializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // SQL details are for the server logs only.
            Error::SqlError(_) | Error::JSONSerializationError(_) => {
                tracing::error!("An unexpected error occurred: {}", self);
                "An unexpected error occurred, try again later.".to_owned()
            }
            Error::DatabaseLockError => {
                tracing::error!("Could not acquire the database lock");
                "The server is busy, try again later.".to_owned()
            }
            error => error.to_string(),
        };

        let body = ErrorBody {
            code: self.code(),
            message,
            retryable: self.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}
