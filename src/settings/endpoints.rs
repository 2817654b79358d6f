//! Route handlers for reading and changing an owner's rate settings.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    database_id::OwnerId,
    extract::JsonBody,
    settings::{RateSettings, RateSettingsOverrides, get_rate_settings, save_rate_settings},
};

/// The state needed to manage rate settings.
#[derive(Debug, Clone)]
pub struct SettingsState {
    /// The database connection for reading and saving settings.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for SettingsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler returning the settings in effect for an owner.
pub async fn get_rate_settings_endpoint(
    State(state): State<SettingsState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<Json<RateSettings>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    get_rate_settings(owner_id, &connection).map(Json)
}

/// A route handler replacing an owner's overrides, responds with the settings now in effect.
pub async fn update_rate_settings_endpoint(
    State(state): State<SettingsState>,
    Path(owner_id): Path<OwnerId>,
    JsonBody(overrides): JsonBody<RateSettingsOverrides>,
) -> Result<Json<RateSettings>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    save_rate_settings(owner_id, overrides, &connection).map(Json)
}
