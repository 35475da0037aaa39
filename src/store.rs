//! In-memory persistence for deliveries and drivers.
//!
//! A [`Store`] is a handle: cloning it is cheap and every clone sees the same
//! data. Background jobs take their own handle with [`Store::handle`].

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{DeliveryRequest, DeliveryStage};
use crate::models::driver::Driver;

#[derive(Clone, Default)]
pub struct Store {
    deliveries: Arc<DashMap<Uuid, DeliveryRequest>>,
    drivers: Arc<DashMap<Uuid, Driver>>,
    driver_phones: Arc<DashMap<String, Uuid>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn insert_delivery(&self, delivery: DeliveryRequest) {
        self.deliveries.insert(delivery.id, delivery);
    }

    pub fn delivery(&self, id: &Uuid) -> Option<DeliveryRequest> {
        self.deliveries.get(id).map(|entry| entry.value().clone())
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }

    /// Applies `update` while holding the write guard for this delivery, so
    /// the closure observes and mutates the row atomically.
    pub fn update_delivery<R>(
        &self,
        id: &Uuid,
        update: impl FnOnce(&mut DeliveryRequest) -> R,
    ) -> Option<R> {
        self.deliveries
            .get_mut(id)
            .map(|mut entry| update(entry.value_mut()))
    }

    pub fn remove_delivery(&self, id: &Uuid) -> Option<DeliveryRequest> {
        self.deliveries.remove(id).map(|(_, delivery)| delivery)
    }

    /// Deliveries matching `predicate`, oldest first.
    pub fn deliveries_where(
        &self,
        predicate: impl Fn(&DeliveryRequest) -> bool,
    ) -> Vec<DeliveryRequest> {
        let mut deliveries: Vec<DeliveryRequest> = self
            .deliveries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        deliveries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        deliveries
    }

    pub fn insert_driver(&self, driver: Driver) -> Result<Driver, AppError> {
        match self.driver_phones.entry(driver.phone.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "a driver with phone {} already exists",
                driver.phone
            ))),
            Entry::Vacant(slot) => {
                slot.insert(driver.id);
                self.drivers.insert(driver.id, driver.clone());
                Ok(driver)
            }
        }
    }

    pub fn driver(&self, id: &Uuid) -> Option<Driver> {
        self.drivers.get(id).map(|entry| entry.value().clone())
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn drivers(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        drivers
    }

    /// Runs `work` while holding a read guard on the driver, so the driver
    /// cannot be deleted until `work` returns. `None` if the driver is unknown.
    pub fn with_driver<R>(&self, id: &Uuid, work: impl FnOnce(&Driver) -> R) -> Option<R> {
        self.drivers.get(id).map(|entry| work(entry.value()))
    }

    /// Removes a driver unless a delivery that is not yet delivered still
    /// references it. References held by delivered deliveries are cleared
    /// together with their lock.
    pub fn remove_driver(&self, id: &Uuid) -> Result<Driver, AppError> {
        let mut in_flight = 0usize;
        let removed = self.drivers.remove_if(id, |_, _| {
            in_flight = self
                .deliveries
                .iter()
                .filter(|entry| {
                    let delivery = entry.value();
                    delivery.driver_id == Some(*id) && delivery.stage != DeliveryStage::Delivered
                })
                .count();
            in_flight == 0
        });

        let Some((_, driver)) = removed else {
            if in_flight > 0 {
                return Err(AppError::Conflict(format!(
                    "driver {id} is assigned to {in_flight} deliveries in progress"
                )));
            }
            return Err(AppError::NotFound(format!("driver {id} not found")));
        };

        self.driver_phones.remove(&driver.phone);
        for mut entry in self.deliveries.iter_mut() {
            let delivery = entry.value_mut();
            if delivery.driver_id == Some(*id) {
                delivery.driver_id = None;
                delivery.is_locked = false;
            }
        }

        Ok(driver)
    }
}
