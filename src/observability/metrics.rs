use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ride_events_total: IntCounterVec,
    pub driver_search_latency_seconds: HistogramVec,
    pub driver_search_candidates: Histogram,
    pub ledger_postings_total: IntCounterVec,
    pub settlements_total: IntCounterVec,
    pub active_rides: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ride_events_total = IntCounterVec::new(
            Opts::new("ride_events_total", "Ride lifecycle transitions by event"),
            &["event"],
        )
        .expect("valid ride_events_total metric");

        let driver_search_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "driver_search_latency_seconds",
                "Latency of nearby driver discovery in seconds",
            ),
            &["outcome"],
        )
        .expect("valid driver_search_latency_seconds metric");

        let driver_search_candidates = Histogram::with_opts(
            HistogramOpts::new(
                "driver_search_candidates",
                "Number of eligible drivers returned per search",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0]),
        )
        .expect("valid driver_search_candidates metric");

        let ledger_postings_total = IntCounterVec::new(
            Opts::new("ledger_postings_total", "Rides posted to driver ledgers"),
            &["payment_mode"],
        )
        .expect("valid ledger_postings_total metric");

        let settlements_total = IntCounterVec::new(
            Opts::new("settlements_total", "Resolved due requests by type and outcome"),
            &["request_type", "outcome"],
        )
        .expect("valid settlements_total metric");

        let active_rides = IntGauge::new("active_rides", "Rides accepted but not yet ended")
            .expect("valid active_rides metric");

        registry
            .register(Box::new(ride_events_total.clone()))
            .expect("register ride_events_total");
        registry
            .register(Box::new(driver_search_latency_seconds.clone()))
            .expect("register driver_search_latency_seconds");
        registry
            .register(Box::new(driver_search_candidates.clone()))
            .expect("register driver_search_candidates");
        registry
            .register(Box::new(ledger_postings_total.clone()))
            .expect("register ledger_postings_total");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("register settlements_total");
        registry
            .register(Box::new(active_rides.clone()))
            .expect("register active_rides");

        Self {
            registry,
            ride_events_total,
            driver_search_latency_seconds,
            driver_search_candidates,
            ledger_postings_total,
            settlements_total,
            active_rides,
        }
    }

    pub fn ride_event(&self, event: &str) {
        self.ride_events_total.with_label_values(&[event]).inc();
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
