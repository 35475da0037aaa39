use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{DeliveryRequest, DeliveryStage, DeliveryStatus, DriverDetails};
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub driver_id: Uuid,
    pub updated: usize,
}

fn not_found(id: &Uuid) -> AppError {
    AppError::NotFound(format!("delivery {id} not found"))
}

/// Overwrites the status. Any status may replace any other.
pub fn set_status(
    state: &AppState,
    id: &Uuid,
    status: DeliveryStatus,
) -> Result<DeliveryRequest, AppError> {
    let delivery = state
        .store
        .update_delivery(id, |delivery| {
            delivery.status = status;
            delivery.clone()
        })
        .ok_or_else(|| not_found(id))?;

    info!(delivery_id = %id, status = ?status, "delivery status updated");
    Ok(delivery)
}

/// Sets the stage, in any direction, and records any non-empty driver details.
pub fn advance_stage(
    state: &AppState,
    id: &Uuid,
    stage: DeliveryStage,
    details: DriverDetails,
) -> Result<DeliveryRequest, AppError> {
    let delivery = state
        .store
        .update_delivery(id, |delivery| {
            delivery.stage = stage;
            overwrite_if_present(&mut delivery.driver_name, details.driver_name);
            overwrite_if_present(&mut delivery.driver_phone, details.driver_phone);
            overwrite_if_present(&mut delivery.driver_vehicle, details.driver_vehicle);
            delivery.clone()
        })
        .ok_or_else(|| not_found(id))?;

    state.publish(TrackingEvent::from_delivery(&delivery));
    info!(delivery_id = %id, stage = ?stage, "delivery stage updated");
    Ok(delivery)
}

fn overwrite_if_present(field: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
        *field = Some(value);
    }
}

/// Attaches `driver_id` to every listed delivery that is not locked yet.
///
/// Unknown driver: nothing is touched and the call fails. Unknown or locked
/// deliveries are skipped and simply not counted. The lock check and the
/// assignment happen under the same write guard, so concurrent callers can
/// never both win the same delivery.
pub fn assign_driver(
    state: &AppState,
    delivery_ids: &[Uuid],
    driver_id: Uuid,
) -> Result<AssignmentOutcome, AppError> {
    let updated = state
        .store
        .with_driver(&driver_id, |_driver| {
            let mut updated = 0usize;
            for delivery_id in delivery_ids {
                let assigned = state.store.update_delivery(delivery_id, |delivery| {
                    if delivery.is_locked {
                        return false;
                    }
                    delivery.driver_id = Some(driver_id);
                    delivery.is_locked = true;
                    true
                });

                let outcome = match assigned {
                    Some(true) => {
                        updated += 1;
                        "assigned"
                    }
                    Some(false) => {
                        debug!(delivery_id = %delivery_id, "delivery locked; skipping");
                        "skipped"
                    }
                    None => {
                        debug!(delivery_id = %delivery_id, "delivery missing; skipping");
                        "skipped"
                    }
                };
                state
                    .metrics
                    .driver_assignments_total
                    .with_label_values(&[outcome])
                    .inc();
            }
            updated
        })
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    info!(
        driver_id = %driver_id,
        requested = delivery_ids.len(),
        updated,
        "driver assigned"
    );

    Ok(AssignmentOutcome { driver_id, updated })
}

/// Clears the lock. The driver reference is left in place.
pub fn unlock(state: &AppState, id: &Uuid) -> Result<DeliveryRequest, AppError> {
    let delivery = state
        .store
        .update_delivery(id, |delivery| {
            delivery.is_locked = false;
            delivery.clone()
        })
        .ok_or_else(|| not_found(id))?;

    info!(delivery_id = %id, "delivery unlocked");
    Ok(delivery)
}

/// Hard delete. A simulation running for the delivery is cancelled.
pub fn delete(state: &AppState, id: &Uuid) -> Result<DeliveryRequest, AppError> {
    let delivery = state.store.remove_delivery(id).ok_or_else(|| not_found(id))?;
    state.simulations.cancel(id);

    info!(delivery_id = %id, "delivery deleted");
    Ok(delivery)
}
