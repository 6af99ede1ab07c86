use fleetcommon::observability::{InMemoryLogSink, InMemoryMetricsRegistry, LogEvent, LogPipeline};
use std::sync::Arc;

pub const PROVISION_DISPATCHED: &str = "vehicle_provision_dispatched";
pub const PROVISION_CONFIRMED: &str = "vehicle_provision_confirmed";
pub const PROVISION_REJECTED: &str = "vehicle_provision_rejected";
pub const PROVISION_UNRESOLVED: &str = "vehicle_provision_unresolved";
pub const DECOMMISSION_DISPATCHED: &str = "vehicle_decommission_dispatched";
pub const DECOMMISSION_REMOVED: &str = "vehicle_decommission_removed";

/// Outcome counters plus a log pipeline with a bounded in-memory sink.
#[derive(Clone)]
pub struct Diagnostics {
    metrics: InMemoryMetricsRegistry,
    logs: LogPipeline,
    recent: Arc<InMemoryLogSink>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        let logs = LogPipeline::new();
        let recent = Arc::new(InMemoryLogSink::new());
        logs.register_sink(recent.clone());
        Self {
            metrics: InMemoryMetricsRegistry::new(),
            logs,
            recent,
        }
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &InMemoryMetricsRegistry {
        &self.metrics
    }

    pub fn recent_events(&self) -> Vec<LogEvent> {
        self.recent.snapshot()
    }

    pub fn events_for_vehicle(&self, vehicle: &str) -> Vec<LogEvent> {
        self.recent.for_vehicle(vehicle)
    }

    /// Bumps `counter` and forwards `event` to every sink.
    pub(crate) fn record(&self, counter: &str, event: LogEvent) {
        self.metrics.increment_counter(counter);
        self.logs.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcommon::observability::LogLevel;
    use serde_json::json;

    #[test]
    fn record_counts_and_logs() {
        let diagnostics = Diagnostics::new();
        diagnostics.record(
            PROVISION_REJECTED,
            LogEvent::new(LogLevel::Warn, "provisioning rejected")
                .with_component("provisioning")
                .with_registry("fleet.testnet")
                .with_vehicle("car1")
                .with_metadata(json!({"ticket": "t"})),
        );
        assert_eq!(diagnostics.metrics().counter(PROVISION_REJECTED), 1);
        let events = diagnostics.events_for_vehicle("car1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, LogLevel::Warn);
        assert_eq!(events[0].registry.as_deref(), Some("fleet.testnet"));
    }
}
