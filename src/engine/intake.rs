use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::eta::estimate_eta;
use crate::geo::haversine_km;
use crate::models::delivery::DeliveryRequest;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewDelivery {
    pub product_id: Uuid,
    /// Signed so that negative input reaches validation instead of failing
    /// deserialization.
    pub quantity: i64,
    pub address: String,
}

/// Geocodes the address, derives the ETA from the warehouse and stores a new
/// pending request. An unresolved address still produces a delivery, without
/// location or ETA.
pub async fn create_delivery(
    state: &AppState,
    user_id: Uuid,
    request: NewDelivery,
) -> Result<DeliveryRequest, AppError> {
    if request.quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be > 0".to_string()));
    }
    let quantity = u32::try_from(request.quantity).map_err(|_| {
        AppError::BadRequest(format!("quantity must be at most {}", u32::MAX))
    })?;

    let address = request.address.trim();
    if address.is_empty() {
        return Err(AppError::BadRequest("address cannot be empty".to_string()));
    }

    let timer = state.metrics.geocode_latency_seconds.start_timer();
    let location = state.geocoder.locate(address).await;
    timer.observe_duration();

    let eta = location.map(|point| {
        let distance_km = haversine_km(&state.settings.warehouse, &point);
        estimate_eta(distance_km, state.settings.average_speed_kmh)
    });

    let delivery = DeliveryRequest::new(
        user_id,
        request.product_id,
        quantity,
        address.to_string(),
        location,
        eta,
    );
    state.store.insert_delivery(delivery.clone());

    let geocoded = if location.is_some() { "true" } else { "false" };
    state
        .metrics
        .deliveries_created_total
        .with_label_values(&[geocoded])
        .inc();

    match &delivery.estimated_delivery_time {
        Some(eta) => info!(
            delivery_id = %delivery.id,
            user_id = %user_id,
            eta = %eta,
            "delivery requested"
        ),
        None => warn!(
            delivery_id = %delivery.id,
            user_id = %user_id,
            geocoder = state.geocoder.name(),
            "delivery requested without location"
        ),
    }

    Ok(delivery)
}
