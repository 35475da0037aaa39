use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub deliveries_created_total: IntCounterVec,
    pub driver_assignments_total: IntCounterVec,
    pub route_optimizations_total: IntCounterVec,
    pub active_simulations: IntGauge,
    pub simulation_steps_total: IntCounter,
    pub geocode_latency_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deliveries_created_total = IntCounterVec::new(
            Opts::new(
                "deliveries_created_total",
                "Delivery requests created, by geocoding outcome",
            ),
            &["geocoded"],
        )
        .expect("valid deliveries_created_total metric");

        let driver_assignments_total = IntCounterVec::new(
            Opts::new(
                "driver_assignments_total",
                "Per-delivery driver assignment attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid driver_assignments_total metric");

        let route_optimizations_total = IntCounterVec::new(
            Opts::new("route_optimizations_total", "Route optimizations by outcome"),
            &["outcome"],
        )
        .expect("valid route_optimizations_total metric");

        let active_simulations =
            IntGauge::new("active_simulations", "Delivery simulations currently running")
                .expect("valid active_simulations metric");

        let simulation_steps_total = IntCounter::new(
            "simulation_steps_total",
            "Stage transitions applied by the delivery simulator",
        )
        .expect("valid simulation_steps_total metric");

        let geocode_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "geocode_latency_seconds",
            "Latency of address lookups in seconds",
        ))
        .expect("valid geocode_latency_seconds metric");

        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");
        registry
            .register(Box::new(driver_assignments_total.clone()))
            .expect("register driver_assignments_total");
        registry
            .register(Box::new(route_optimizations_total.clone()))
            .expect("register route_optimizations_total");
        registry
            .register(Box::new(active_simulations.clone()))
            .expect("register active_simulations");
        registry
            .register(Box::new(simulation_steps_total.clone()))
            .expect("register simulation_steps_total");
        registry
            .register(Box::new(geocode_latency_seconds.clone()))
            .expect("register geocode_latency_seconds");

        Self {
            registry,
            deliveries_created_total,
            driver_assignments_total,
            route_optimizations_total,
            active_simulations,
            simulation_steps_total,
            geocode_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
