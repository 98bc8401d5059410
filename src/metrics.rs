// Numan Thabit 2026
// metrics.rs - Prometheus mirror of scheduler state
use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus registry mirroring the scheduler's dispatch counters and
/// queue state. Attach with `attach_metrics` on either facade.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    pub submissions: IntCounter,
    pub rejected_submissions: IntCounter,
    pub reservation_dispatches: IntCounter,
    pub priority_dispatches: IntCounter,
    pub limit_break_dispatches: IntCounter,
    pub evicted_clients: IntCounter,
    pub active_clients: IntGauge,
    pub queued_requests: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some("numiqos".into()), None)?;

        macro_rules! register_counter {
            ($name:expr, $help:expr) => {{
                let counter = IntCounter::new($name, $help)?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        macro_rules! register_gauge {
            ($name:expr, $help:expr) => {{
                let gauge = IntGauge::new($name, $help)?;
                registry.register(Box::new(gauge.clone()))?;
                gauge
            }};
        }

        let submissions = register_counter!("submissions_total", "Requests submitted");
        let rejected_submissions = register_counter!(
            "rejected_submissions_total",
            "Submissions rejected for invalid client parameters"
        );
        let reservation_dispatches = register_counter!(
            "reservation_dispatches_total",
            "Dispatches granted in the reservation phase"
        );
        let priority_dispatches = register_counter!(
            "priority_dispatches_total",
            "Dispatches granted in the priority phase"
        );
        let limit_break_dispatches = register_counter!(
            "limit_break_dispatches_total",
            "Dispatches granted from the proportion ordering"
        );
        let evicted_clients =
            register_counter!("evicted_clients_total", "Clients aged out of the registry");
        let active_clients = register_gauge!("active_clients", "Clients currently registered");
        let queued_requests = register_gauge!("queued_requests", "Requests currently queued");

        Ok(Self {
            registry,
            submissions,
            rejected_submissions,
            reservation_dispatches,
            priority_dispatches,
            limit_break_dispatches,
            evicted_clients,
            active_clients,
            queued_requests,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_metrics_registry() {
        let metrics = Metrics::new().expect("metrics");
        metrics.submissions.inc();
        metrics.reservation_dispatches.inc();
        metrics.active_clients.set(3);
        assert!(!metrics.gather().is_empty());
    }
}
