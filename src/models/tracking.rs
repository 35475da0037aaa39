use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::delivery::{DeliveryRequest, DeliveryStage};

/// Position/stage change broadcast to live-map subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub delivery_id: Uuid,
    pub stage: DeliveryStage,
    pub location: Option<GeoPoint>,
    pub at: DateTime<Utc>,
}

impl TrackingEvent {
    pub fn from_delivery(delivery: &DeliveryRequest) -> Self {
        Self {
            delivery_id: delivery.id,
            stage: delivery.stage,
            location: delivery.location,
            at: Utc::now(),
        }
    }
}
