use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::caller::Caller;
use crate::engine::intake::{create_delivery, NewDelivery};
use crate::engine::lifecycle::{self, AssignmentOutcome};
use crate::engine::route::{optimize_pending, OptimizedRoute};
use crate::engine::simulator::start_simulation;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::delivery::{DeliveryRequest, DeliveryStage, DeliveryStatus, DriverDetails};
use crate::models::driver::Driver;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(request_delivery).get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery).delete(delete_delivery))
        .route("/deliveries/:id/status", put(update_status))
        .route("/deliveries/:id/track", put(update_tracking))
        .route("/deliveries/:id/unlock", post(unlock_delivery))
        .route(
            "/deliveries/:id/simulation",
            post(start_delivery_simulation).delete(cancel_delivery_simulation),
        )
        .route("/deliveries/:id/map", get(live_map))
        .route("/me/deliveries", get(my_deliveries))
        .route("/routes/optimized", get(optimized_route))
        .route("/drivers/:id/assignments", post(assign_driver))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
}

#[derive(Deserialize)]
pub struct UpdateTrackingRequest {
    pub stage: DeliveryStage,
    #[serde(flatten)]
    pub details: DriverDetails,
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub delivery_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct SimulationAccepted {
    pub delivery_id: Uuid,
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct LiveMap {
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
    pub stage: DeliveryStage,
    pub location: Option<GeoPoint>,
    pub driver: Option<Driver>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub driver_vehicle: Option<String>,
    pub estimated_delivery_time: Option<String>,
}

fn find_delivery(state: &AppState, id: &Uuid) -> Result<DeliveryRequest, AppError> {
    state
        .store
        .delivery(id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", id)))
}

async fn request_delivery(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<NewDelivery>,
) -> Result<Json<DeliveryRequest>, AppError> {
    let delivery = create_delivery(&state, caller.user_id, payload).await?;
    Ok(Json(delivery))
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<DeliveryRequest>>, AppError> {
    caller.require_admin()?;
    Ok(Json(state.store.deliveries_where(|_| true)))
}

async fn my_deliveries(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Json<Vec<DeliveryRequest>> {
    Json(
        state
            .store
            .deliveries_where(|delivery| delivery.user_id == caller.user_id),
    )
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<Json<DeliveryRequest>, AppError> {
    let delivery = find_delivery(&state, &id)?;
    caller.require_owner_or_admin(delivery.user_id)?;
    Ok(Json(delivery))
}

async fn delete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<StatusCode, AppError> {
    caller.require_admin()?;
    lifecycle::delete(&state, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    caller.require_admin()?;
    let delivery = lifecycle::set_status(&state, &id, payload.status)?;
    Ok(Json(delivery))
}

async fn update_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    Json(payload): Json<UpdateTrackingRequest>,
) -> Result<Json<DeliveryRequest>, AppError> {
    caller.require_admin()?;
    let delivery = lifecycle::advance_stage(&state, &id, payload.stage, payload.details)?;
    Ok(Json(delivery))
}

async fn unlock_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<Json<DeliveryRequest>, AppError> {
    caller.require_admin()?;
    let delivery = lifecycle::unlock(&state, &id)?;
    Ok(Json(delivery))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
    caller: Caller,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    caller.require_admin()?;
    let outcome = lifecycle::assign_driver(&state, &payload.delivery_ids, driver_id)?;
    Ok(Json(outcome))
}

async fn optimized_route(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<OptimizedRoute>, AppError> {
    caller.require_admin()?;
    Ok(Json(optimize_pending(&state)?))
}

async fn start_delivery_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<(StatusCode, Json<SimulationAccepted>), AppError> {
    caller.require_admin()?;
    start_simulation(&state, id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SimulationAccepted {
            delivery_id: id,
            message: "simulation started",
        }),
    ))
}

async fn cancel_delivery_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<StatusCode, AppError> {
    caller.require_admin()?;
    if state.simulations.cancel(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "no simulation running for delivery {}",
            id
        )))
    }
}

async fn live_map(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    caller: Caller,
) -> Result<Json<LiveMap>, AppError> {
    let delivery = find_delivery(&state, &id)?;
    caller.require_owner_or_admin(delivery.user_id)?;

    let driver = delivery
        .driver_id
        .and_then(|driver_id| state.store.driver(&driver_id));

    Ok(Json(LiveMap {
        delivery_id: delivery.id,
        status: delivery.status,
        stage: delivery.stage,
        location: delivery.location,
        driver,
        driver_name: delivery.driver_name,
        driver_phone: delivery.driver_phone,
        driver_vehicle: delivery.driver_vehicle,
        estimated_delivery_time: delivery.estimated_delivery_time,
    }))
}
