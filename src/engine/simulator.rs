//! Background delivery simulation.
//!
//! A simulation walks one delivery through `confirmed -> out_for_delivery ->
//! delivered`, nudging its position at every step and pausing between steps.
//! Each run is detached from the request that started it: it owns a store
//! handle, a metrics handle and an event sender, and registers a
//! cancellation token that is observed at every pause.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::IntGauge;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::delivery::DeliveryStage;
use crate::models::tracking::TrackingEvent;
use crate::observability::metrics::Metrics;
use crate::state::AppState;
use crate::store::Store;

/// `preparing` is deliberately absent.
pub const SIMULATED_STAGES: [DeliveryStage; 3] = [
    DeliveryStage::Confirmed,
    DeliveryStage::OutForDelivery,
    DeliveryStage::Delivered,
];

struct RunningSimulation {
    run_id: Uuid,
    token: CancellationToken,
}

/// Running simulations keyed by delivery id.
#[derive(Clone, Default)]
pub struct SimulationRegistry {
    running: Arc<DashMap<Uuid, RunningSimulation>>,
}

/// Keeps a simulation registered; dropping it deregisters the run.
pub struct SimulationGuard {
    delivery_id: Uuid,
    run_id: Uuid,
    token: CancellationToken,
    registry: SimulationRegistry,
}

impl SimulationGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for SimulationGuard {
    fn drop(&mut self) {
        let run_id = self.run_id;
        self.registry
            .running
            .remove_if(&self.delivery_id, |_, entry| entry.run_id == run_id);
    }
}

impl SimulationRegistry {
    pub fn register(&self, delivery_id: Uuid) -> Result<SimulationGuard, AppError> {
        match self.running.entry(delivery_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "a simulation is already running for delivery {delivery_id}"
            ))),
            Entry::Vacant(slot) => {
                let run_id = Uuid::new_v4();
                let token = CancellationToken::new();
                slot.insert(RunningSimulation {
                    run_id,
                    token: token.clone(),
                });
                Ok(SimulationGuard {
                    delivery_id,
                    run_id,
                    token,
                    registry: self.clone(),
                })
            }
        }
    }

    /// Returns `false` when nothing was running for the delivery.
    pub fn cancel(&self, delivery_id: &Uuid) -> bool {
        match self.running.get(delivery_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, delivery_id: &Uuid) -> bool {
        self.running.contains_key(delivery_id)
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}

/// Counts a run in `active_simulations` for as long as it is alive, including
/// when the task unwinds.
struct ActiveSimulation(IntGauge);

impl ActiveSimulation {
    fn enter(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for ActiveSimulation {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// How a simulation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationEnd {
    Delivered,
    Cancelled,
    /// The delivery was deleted while the run was in progress.
    Vanished,
}

pub struct SimulationJob {
    delivery_id: Uuid,
    store: Store,
    metrics: Metrics,
    events_tx: broadcast::Sender<TrackingEvent>,
    jitter_deg: f64,
    step_delay: Duration,
    guard: SimulationGuard,
}

impl SimulationJob {
    pub async fn run(self) -> SimulationEnd {
        let active = ActiveSimulation::enter(&self.metrics.active_simulations);
        info!(delivery_id = %self.delivery_id, "simulation started");

        let end = self.walk_stages().await;

        drop(active);
        match end {
            SimulationEnd::Delivered => {
                info!(delivery_id = %self.delivery_id, "simulation finished")
            }
            SimulationEnd::Cancelled => {
                info!(delivery_id = %self.delivery_id, "simulation cancelled")
            }
            SimulationEnd::Vanished => {
                warn!(delivery_id = %self.delivery_id, "delivery removed during simulation")
            }
        }
        end
    }

    async fn walk_stages(&self) -> SimulationEnd {
        let token = self.guard.token();

        for (step, stage) in SIMULATED_STAGES.into_iter().enumerate() {
            if token.is_cancelled() {
                return SimulationEnd::Cancelled;
            }

            let updated = self.store.update_delivery(&self.delivery_id, |delivery| {
                delivery.stage = stage;
                if let Some(location) = delivery.location.as_mut() {
                    *location = drift(*location, self.jitter_deg, &mut rand::thread_rng());
                }
                delivery.clone()
            });
            let Some(delivery) = updated else {
                return SimulationEnd::Vanished;
            };

            self.metrics.simulation_steps_total.inc();
            let _ = self.events_tx.send(TrackingEvent::from_delivery(&delivery));

            if stage == DeliveryStage::Delivered {
                return SimulationEnd::Delivered;
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!(delivery_id = %self.delivery_id, step, "simulation interrupted");
                    return SimulationEnd::Cancelled;
                }
                _ = sleep(self.step_delay) => {}
            }
        }

        SimulationEnd::Delivered
    }
}

/// Shifts both coordinates by independent offsets in `[-bound, bound]`. A
/// bound that is not a positive finite number leaves the point where it is.
pub fn drift(point: GeoPoint, bound: f64, rng: &mut impl Rng) -> GeoPoint {
    if !bound.is_finite() || bound <= 0.0 {
        return point;
    }

    GeoPoint {
        lat: point.lat + rng.gen_range(-bound..=bound),
        lng: point.lng + rng.gen_range(-bound..=bound),
    }
}

/// Validates the delivery and registers a run for it. The returned job still
/// has to be driven, usually by [`start_simulation`].
pub fn prepare_simulation(state: &AppState, delivery_id: Uuid) -> Result<SimulationJob, AppError> {
    let delivery = state
        .store
        .delivery(&delivery_id)
        .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

    if delivery.stage == DeliveryStage::Delivered {
        return Err(AppError::InvalidState(format!(
            "delivery {delivery_id} is already delivered"
        )));
    }

    let guard = state.simulations.register(delivery_id)?;

    Ok(SimulationJob {
        delivery_id,
        store: state.store.handle(),
        metrics: state.metrics.clone(),
        events_tx: state.tracking_events_tx.clone(),
        jitter_deg: state.settings.position_jitter_deg,
        step_delay: state.settings.simulation_step,
        guard,
    })
}

/// Schedules a simulation and returns without waiting for it.
pub fn start_simulation(
    state: &AppState,
    delivery_id: Uuid,
) -> Result<tokio::task::JoinHandle<SimulationEnd>, AppError> {
    let job = prepare_simulation(state, delivery_id)?;
    Ok(tokio::spawn(job.run()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    use super::{drift, start_simulation, ActiveSimulation, SimulationEnd, SIMULATED_STAGES};
    use crate::config::DispatchSettings;
    use crate::error::AppError;
    use crate::geo::geocoder::StaticGeocoder;
    use crate::geo::GeoPoint;
    use crate::models::delivery::{DeliveryRequest, DeliveryStage};
    use crate::observability::metrics::Metrics;
    use crate::state::AppState;

    const ORIGIN: GeoPoint = GeoPoint {
        lat: 3.9,
        lng: 11.52,
    };

    fn state(step: Duration) -> AppState {
        AppState::new(
            Arc::new(StaticGeocoder::new(None)),
            DispatchSettings {
                simulation_step: step,
                ..DispatchSettings::default()
            },
            64,
        )
    }

    fn seed(state: &AppState, location: Option<GeoPoint>, stage: DeliveryStage) -> Uuid {
        let mut delivery = DeliveryRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            "Biyem-Assi".to_string(),
            location,
            None,
        );
        delivery.stage = stage;
        let id = delivery.id;
        state.store.insert_delivery(delivery);
        id
    }

    #[test]
    fn drift_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let moved = drift(ORIGIN, 0.0002, &mut rng);
            assert!((moved.lat - ORIGIN.lat).abs() <= 0.0002 + 1e-12);
            assert!((moved.lng - ORIGIN.lng).abs() <= 0.0002 + 1e-12);
        }
    }

    #[test]
    fn zero_bound_does_not_move() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(drift(ORIGIN, 0.0, &mut rng), ORIGIN);
    }

    #[test]
    fn non_finite_bound_does_not_move() {
        let mut rng = StdRng::seed_from_u64(3);
        for bound in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(drift(ORIGIN, bound, &mut rng), ORIGIN);
        }
    }

    #[tokio::test]
    async fn active_gauge_is_released_when_a_run_panics() {
        let metrics = Metrics::new();
        let gauge = metrics.active_simulations.clone();

        let handle = tokio::spawn(async move {
            let _active = ActiveSimulation::enter(&gauge);
            assert_eq!(gauge.get(), 1);
            panic!("simulation step failed");
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(metrics.active_simulations.get(), 0);
    }

    #[test]
    fn stage_sequence_skips_preparing() {
        assert!(!SIMULATED_STAGES.contains(&DeliveryStage::Preparing));
        assert_eq!(SIMULATED_STAGES.last(), Some(&DeliveryStage::Delivered));
    }

    #[tokio::test]
    async fn runs_through_every_stage_to_delivered() {
        let state = state(Duration::from_millis(5));
        let id = seed(&state, Some(ORIGIN), DeliveryStage::Preparing);
        let mut rx = state.tracking_events_tx.subscribe();

        let handle = start_simulation(&state, id).unwrap();
        assert_eq!(handle.await.unwrap(), SimulationEnd::Delivered);

        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            stages.push(event.stage);
        }
        assert_eq!(stages, SIMULATED_STAGES.to_vec());

        let delivery = state.store.delivery(&id).unwrap();
        assert_eq!(delivery.stage, DeliveryStage::Delivered);
        let location = delivery.location.unwrap();
        assert!((location.lat - ORIGIN.lat).abs() <= 3.0 * 0.0002 + 1e-12);
        assert!((location.lng - ORIGIN.lng).abs() <= 3.0 * 0.0002 + 1e-12);
        assert!(!state.simulations.is_running(&id));
        assert_eq!(state.metrics.active_simulations.get(), 0);
    }

    #[tokio::test]
    async fn delivery_without_location_keeps_none() {
        let state = state(Duration::from_millis(1));
        let id = seed(&state, None, DeliveryStage::Confirmed);

        let handle = start_simulation(&state, id).unwrap();
        handle.await.unwrap();

        let delivery = state.store.delivery(&id).unwrap();
        assert_eq!(delivery.stage, DeliveryStage::Delivered);
        assert!(delivery.location.is_none());
    }

    #[tokio::test]
    async fn delivered_delivery_is_rejected_without_scheduling() {
        let state = state(Duration::from_millis(1));
        let id = seed(&state, Some(ORIGIN), DeliveryStage::Delivered);

        let result = start_simulation(&state, id);

        assert!(matches!(result, Err(AppError::InvalidState(_))));
        assert!(!state.simulations.is_running(&id));
        assert_eq!(state.store.delivery(&id).unwrap().location, Some(ORIGIN));
    }

    #[tokio::test]
    async fn unknown_delivery_is_not_found() {
        let state = state(Duration::from_millis(1));
        assert!(matches!(
            start_simulation(&state, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn second_run_for_same_delivery_conflicts() {
        let state = state(Duration::from_secs(60));
        let id = seed(&state, Some(ORIGIN), DeliveryStage::Confirmed);

        let handle = start_simulation(&state, id).unwrap();
        assert!(matches!(
            start_simulation(&state, id),
            Err(AppError::Conflict(_))
        ));

        assert!(state.simulations.cancel(&id));
        assert_eq!(handle.await.unwrap(), SimulationEnd::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_next_pause() {
        let state = state(Duration::from_secs(60));
        let id = seed(&state, Some(ORIGIN), DeliveryStage::Confirmed);

        let handle = start_simulation(&state, id).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.simulations.cancel(&id));

        let end = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, SimulationEnd::Cancelled);
        assert_ne!(state.store.delivery(&id).unwrap().stage, DeliveryStage::Delivered);
        assert!(!state.simulations.is_running(&id));
        assert!(!state.simulations.cancel(&id));
    }

    #[tokio::test]
    async fn deleted_delivery_ends_the_run() {
        let state = state(Duration::from_millis(50));
        let id = seed(&state, Some(ORIGIN), DeliveryStage::Confirmed);

        let handle = start_simulation(&state, id).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        state.store.remove_delivery(&id);

        let end = handle.await.unwrap();
        assert_eq!(end, SimulationEnd::Vanished);
    }
}
