//! Route handlers for the fiscal profile and the VAT decisions.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, Path, Query, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    database_id::{OwnerId, TransactionId},
    extract::JsonBody,
    fiscal::{
        ActivationChoice, ActivationResult, FiscalProfile, NetRevenueSummary, Reconciliation,
        RegularizationPrompt, RegularizationReport, ThresholdReport, apply_regularization,
        build_threshold_report, discard_pending_activation, get_fiscal_profile,
        get_pending_regularization, reconcile_year_total, resolve_activation, resolve_reversion,
        set_vat_subjection, summarize_net_revenue,
    },
    platform::get_fee_schedules,
    settings::get_rate_settings,
    timezone::get_local_date,
    transaction::list_transactions,
};

/// The state needed by the fiscal endpoints.
#[derive(Debug, Clone)]
pub struct FiscalEndpointState {
    /// The database connection for reading and changing fiscal data.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Europe/Paris".
    pub local_timezone: String,
}

impl FromRef<AppState> for FiscalEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Selects a fiscal year, the current one when absent.
#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    /// The fiscal year.
    #[serde(default)]
    pub year: Option<i32>,
}

impl YearQuery {
    fn year_or_current(&self, local_timezone: &str) -> Result<i32, Error> {
        match self.year {
            Some(year) => Ok(year),
            None => Ok(get_local_date(local_timezone)?.year()),
        }
    }
}

/// The request body for setting VAT subjection by hand.
#[derive(Debug, Deserialize)]
pub struct VatSubjectionForm {
    /// Whether the owner charges VAT.
    pub is_subject_to_vat: bool,
}

/// The request body for resolving a pending activation.
#[derive(Debug, Deserialize)]
pub struct ActivationForm {
    /// How VAT was handled on the income that crossed the threshold.
    pub choice: ActivationChoice,
}

/// The request body for regularizing the incomes of the crossing month.
#[derive(Debug, Deserialize)]
pub struct RegularizationForm {
    /// Whether VAT was forgotten, per income ID.
    #[serde(default)]
    pub decisions: HashMap<TransactionId, bool>,
}

/// The request body for resolving a pending reversion.
#[derive(Debug, Deserialize)]
pub struct ReversionForm {
    /// Whether to leave VAT liability.
    pub confirm: bool,
}

/// Everything the owner needs to know about a fiscal year.
#[derive(Debug, Serialize)]
pub struct FiscalSummary {
    /// The owner's fiscal profile.
    pub profile: FiscalProfile,
    /// The year against the VAT threshold and the micro-entreprise ceiling.
    pub thresholds: ThresholdReport,
    /// The year's revenue after fees and contributions.
    pub net_revenue: NetRevenueSummary,
}

/// A route handler returning an owner's fiscal profile, including any pending decision.
pub async fn get_fiscal_profile_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<Json<FiscalProfile>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    get_fiscal_profile(owner_id, &connection).map(Json)
}

/// A route handler for setting whether an owner is subject to VAT.
pub async fn set_vat_subjection_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
    JsonBody(form): JsonBody<VatSubjectionForm>,
) -> Result<Json<FiscalProfile>, Error> {
    let today = get_local_date(&state.local_timezone)?;
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    set_vat_subjection(owner_id, form.is_subject_to_vat, today, &connection).map(Json)
}

/// A route handler summarizing a fiscal year.
pub async fn get_fiscal_summary_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
    Query(query): Query<YearQuery>,
) -> Result<Json<FiscalSummary>, Error> {
    let year = query.year_or_current(&state.local_timezone)?;
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let profile = get_fiscal_profile(owner_id, &connection)?;
    let settings = get_rate_settings(owner_id, &connection)?;
    let thresholds = build_threshold_report(owner_id, year, &settings, &connection)?;
    let transactions = list_transactions(owner_id, year, None, &connection)?;
    let fee_schedules = get_fee_schedules(owner_id, &connection)?;
    let net_revenue = summarize_net_revenue(&transactions, &fee_schedules, &profile, &settings);

    Ok(Json(FiscalSummary {
        profile,
        thresholds,
        net_revenue,
    }))
}

/// A route handler saving the pending trigger and making the owner subject to VAT.
pub async fn resolve_activation_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
    JsonBody(form): JsonBody<ActivationForm>,
) -> Result<Json<ActivationResult>, Error> {
    let today = get_local_date(&state.local_timezone)?;
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    resolve_activation(owner_id, form.choice, today, &connection).map(Json)
}

/// A route handler dropping the pending trigger.
pub async fn discard_activation_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<Json<FiscalProfile>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    discard_pending_activation(owner_id, &connection).map(Json)
}

/// A route handler listing the incomes waiting for a regularization decision.
pub async fn get_pending_regularization_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<Json<RegularizationPrompt>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let pending = get_pending_regularization(owner_id, &connection)?;

    Ok(Json(RegularizationPrompt::from(pending.as_slice())))
}

/// A route handler applying regularization decisions.
pub async fn apply_regularization_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
    JsonBody(form): JsonBody<RegularizationForm>,
) -> Result<Json<RegularizationReport>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    apply_regularization(owner_id, &form.decisions, &connection).map(Json)
}

/// A route handler resolving a pending reversion.
pub async fn resolve_reversion_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
    JsonBody(form): JsonBody<ReversionForm>,
) -> Result<Json<FiscalProfile>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    resolve_reversion(owner_id, form.confirm, &connection).map(Json)
}

/// A route handler recomputing the running revenue total of a year.
pub async fn reconcile_endpoint(
    State(state): State<FiscalEndpointState>,
    Path(owner_id): Path<OwnerId>,
    Query(query): Query<YearQuery>,
) -> Result<Json<Reconciliation>, Error> {
    let year = query.year_or_current(&state.local_timezone)?;
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    reconcile_year_total(owner_id, year, &connection).map(Json)
}
