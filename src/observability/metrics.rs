use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub acceptances_total: IntCounterVec,
    pub acceptance_latency_seconds: HistogramVec,
    pub reconciliation_required_total: IntCounter,
    pub shipment_transitions_total: IntCounterVec,
    pub applications_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let acceptances_total = IntCounterVec::new(
            Opts::new("acceptances_total", "Bid acceptances by strategy and outcome"),
            &["strategy", "outcome"],
        )
        .expect("valid acceptances_total metric");

        let acceptance_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "acceptance_latency_seconds",
                "Latency of the acceptance protocol in seconds",
            ),
            &["strategy"],
        )
        .expect("valid acceptance_latency_seconds metric");

        let reconciliation_required_total = IntCounter::new(
            "reconciliation_required_total",
            "Acceptances that left application and shipment out of step",
        )
        .expect("valid reconciliation_required_total metric");

        let shipment_transitions_total = IntCounterVec::new(
            Opts::new("shipment_transitions_total", "Shipment status transitions by target status"),
            &["status"],
        )
        .expect("valid shipment_transitions_total metric");

        let applications_total = IntCounterVec::new(
            Opts::new("applications_total", "Application lifecycle events by outcome"),
            &["outcome"],
        )
        .expect("valid applications_total metric");

        registry
            .register(Box::new(acceptances_total.clone()))
            .expect("register acceptances_total");
        registry
            .register(Box::new(acceptance_latency_seconds.clone()))
            .expect("register acceptance_latency_seconds");
        registry
            .register(Box::new(reconciliation_required_total.clone()))
            .expect("register reconciliation_required_total");
        registry
            .register(Box::new(shipment_transitions_total.clone()))
            .expect("register shipment_transitions_total");
        registry
            .register(Box::new(applications_total.clone()))
            .expect("register applications_total");

        Self {
            registry,
            acceptances_total,
            acceptance_latency_seconds,
            reconciliation_required_total,
            shipment_transitions_total,
            applications_total,
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
