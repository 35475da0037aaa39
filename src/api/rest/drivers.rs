use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::caller::Caller;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", delete(delete_driver))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub phone: String,
    pub vehicle: Option<String>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    caller.require_admin()?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let phone = payload.phone.trim();
    if phone.is_empty() {
        return Err(AppError::BadRequest("phone cannot be empty".to_string()));
    }

    let driver = state.store.insert_driver(Driver {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone: phone.to_string(),
        vehicle: payload
            .vehicle
            .map(|vehicle| vehicle.trim().to_string())
            .filter(|vehicle| !vehicle.is_empty()),
    })?;

    info!(driver_id = %driver.id, "driver registered");
    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Driver>>, AppError> {
    caller.require_admin()?;
    Ok(Json(state.store.drivers()))
}

async fn delete_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<StatusCode, AppError> {
    caller.require_admin()?;
    state.store.remove_driver(&id)?;

    info!(driver_id = %id, "driver removed");
    Ok(StatusCode::NO_CONTENT)
}
