use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub notifications_total: IntCounterVec,
    pub order_transitions_total: IntCounterVec,
    pub webhook_events_total: IntCounterVec,
    pub driver_responses_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "WhatsApp notifications by message type and outcome",
            ),
            &["kind", "outcome"],
        )
        .expect("valid notifications_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Applied order status transitions"),
            &["from", "to"],
        )
        .expect("valid order_transitions_total metric");

        let webhook_events_total = IntCounterVec::new(
            Opts::new("webhook_events_total", "Inbound gateway events by outcome"),
            &["outcome"],
        )
        .expect("valid webhook_events_total metric");

        let driver_responses_total = IntCounterVec::new(
            Opts::new(
                "driver_responses_total",
                "Driver accept/reject replies by intent and outcome",
            ),
            &["intent", "outcome"],
        )
        .expect("valid driver_responses_total metric");

        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(webhook_events_total.clone()))
            .expect("register webhook_events_total");
        registry
            .register(Box::new(driver_responses_total.clone()))
            .expect("register driver_responses_total");

        Self {
            registry,
            notifications_total,
            order_transitions_total,
            webhook_events_total,
            driver_responses_total,
        }
    }

    pub fn notification(&self, kind: &str, outcome: &str) {
        self.notifications_total
            .with_label_values(&[kind, outcome])
            .inc();
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
