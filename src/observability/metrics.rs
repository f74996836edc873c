use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub permission_denials_total: IntCounterVec,
    pub upgrade_reviews_total: IntCounterVec,
    pub badges_awarded_total: IntCounter,
    pub badge_sweeps_in_queue: IntGauge,
    pub notification_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Task assignments by strategy and outcome"),
            &["strategy", "outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of task assignment in seconds",
            ),
            &["strategy"],
        )
        .expect("valid assignment_latency_seconds metric");

        let permission_denials_total = IntCounterVec::new(
            Opts::new("permission_denials_total", "Rejected authorizations by rule"),
            &["rule"],
        )
        .expect("valid permission_denials_total metric");

        let upgrade_reviews_total = IntCounterVec::new(
            Opts::new("upgrade_reviews_total", "Processed level upgrade reviews"),
            &["action"],
        )
        .expect("valid upgrade_reviews_total metric");

        let badges_awarded_total =
            IntCounter::new("badges_awarded_total", "Badges granted by the award sweep")
                .expect("valid badges_awarded_total metric");

        let badge_sweeps_in_queue =
            IntGauge::new("badge_sweeps_in_queue", "Pending badge sweeps in queue")
                .expect("valid badge_sweeps_in_queue metric");

        let notification_failures_total = IntCounter::new(
            "notification_failures_total",
            "Domain events the sink failed to accept",
        )
        .expect("valid notification_failures_total metric");

        let collectors: [Box<dyn Collector>; 7] = [
            Box::new(assignments_total.clone()),
            Box::new(assignment_latency_seconds.clone()),
            Box::new(permission_denials_total.clone()),
            Box::new(upgrade_reviews_total.clone()),
            Box::new(badges_awarded_total.clone()),
            Box::new(badge_sweeps_in_queue.clone()),
            Box::new(notification_failures_total.clone()),
        ];
        for collector in collectors {
            registry.register(collector).expect("register metric");
        }

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            permission_denials_total,
            upgrade_reviews_total,
            badges_awarded_total,
            badge_sweeps_in_queue,
            notification_failures_total,
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
