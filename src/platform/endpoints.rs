//! Route handlers for creating and listing platforms.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    database_id::{OwnerId, PlatformId},
    endpoints::{self, format_endpoint},
    extract::JsonBody,
    platform::{NewPlatform, Platform, create_platform, get_platform, list_platforms},
};

/// The state needed to manage platforms.
#[derive(Debug, Clone)]
pub struct PlatformState {
    /// The database connection for managing platforms.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for PlatformState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for creating a platform, responds with the created platform.
pub async fn create_platform_endpoint(
    State(state): State<PlatformState>,
    Path(owner_id): Path<OwnerId>,
    JsonBody(platform): JsonBody<NewPlatform>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let platform = create_platform(owner_id, platform, &connection)?;
    tracing::info!("Created platform {} for owner {owner_id}", platform.id);

    let location = format_endpoint(endpoints::PLATFORM, &[owner_id, platform.id]);

    Ok((StatusCode::CREATED, [(LOCATION, location)], Json(platform)).into_response())
}

/// A route handler returning a single platform of an owner.
pub async fn get_platform_endpoint(
    State(state): State<PlatformState>,
    Path((owner_id, platform_id)): Path<(OwnerId, PlatformId)>,
) -> Result<Json<Platform>, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    get_platform(owner_id, platform_id, &connection).map(Json)
}

/// A route handler for listing the platforms of an owner.
pub async fn list_platforms_endpoint(
    State(state): State<PlatformState>,
    Path(owner_id): Path<OwnerId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let platforms = list_platforms(owner_id, &connection)?;

    Ok(Json(platforms).into_response())
}
