use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::DispatchSettings;
use crate::engine::simulator::SimulationRegistry;
use crate::geo::geocoder::Geocoder;
use crate::models::tracking::TrackingEvent;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub geocoder: Arc<dyn Geocoder>,
    pub settings: DispatchSettings,
    pub simulations: SimulationRegistry,
    pub tracking_events_tx: broadcast::Sender<TrackingEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        settings: DispatchSettings,
        event_buffer_size: usize,
    ) -> Self {
        let (tracking_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store: Store::new(),
            geocoder,
            settings,
            simulations: SimulationRegistry::default(),
            tracking_events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn publish(&self, event: TrackingEvent) {
        let _ = self.tracking_events_tx.send(event);
    }
}
