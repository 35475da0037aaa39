use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// Administrative outcome of a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Approved,
    Rejected,
}

/// Physical fulfillment progress. Independent of [`DeliveryStatus`]: any
/// combination of the two is valid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub address: String,
    /// `None` when the address could not be resolved.
    pub location: Option<GeoPoint>,
    pub status: DeliveryStatus,
    pub stage: DeliveryStage,
    pub driver_id: Option<Uuid>,
    /// Set together with `driver_id`; a locked delivery is never reassigned.
    pub is_locked: bool,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub driver_vehicle: Option<String>,
    pub estimated_delivery_time: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryRequest {
    pub fn new(
        user_id: Uuid,
        product_id: Uuid,
        quantity: u32,
        address: String,
        location: Option<GeoPoint>,
        estimated_delivery_time: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            quantity,
            address,
            location,
            status: DeliveryStatus::Pending,
            stage: DeliveryStage::Confirmed,
            driver_id: None,
            is_locked: false,
            driver_name: None,
            driver_phone: None,
            driver_vehicle: None,
            estimated_delivery_time,
            created_at: Utc::now(),
        }
    }

    pub fn is_routable(&self) -> bool {
        self.status == DeliveryStatus::Pending && self.location.is_some()
    }
}

/// Free-text driver details recorded on a delivery during a tracking update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverDetails {
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub driver_vehicle: Option<String>,
}
