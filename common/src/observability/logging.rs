use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured diagnostic record. Asynchronous outcomes that the caller never
/// sees (rejected provisioning, failed decommission) are reported here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub component: Option<String>,
    pub registry: Option<String>,
    pub vehicle: Option<String>,
    pub metadata: serde_json::Value,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            component: None,
            registry: None,
            vehicle: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn with_vehicle(mut self, vehicle: impl Into<String>) -> Self {
        self.vehicle = Some(vehicle.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub trait LogSink: Send + Sync {
    fn on_event(&self, event: &LogEvent);
}

#[derive(Clone, Default)]
pub struct LogPipeline {
    sinks: Arc<RwLock<Vec<Arc<dyn LogSink>>>>,
}

impl LogPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sink(&self, sink: Arc<dyn LogSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn emit(&self, event: LogEvent) {
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sink in sinks {
            sink.on_event(&event);
        }
    }
}

/// Keeps the most recent `capacity` events.
#[derive(Clone)]
pub struct InMemoryLogSink {
    events: Arc<RwLock<VecDeque<LogEvent>>>,
    capacity: usize,
}

impl Default for InMemoryLogSink {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl InMemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn for_vehicle(&self, vehicle: &str) -> Vec<LogEvent> {
        self.snapshot()
            .into_iter()
            .filter(|event| event.vehicle.as_deref() == Some(vehicle))
            .collect()
    }
}

impl LogSink for InMemoryLogSink {
    fn on_event(&self, event: &LogEvent) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn pipeline_forwards_events_to_sink() {
        let pipeline = LogPipeline::new();
        let sink = Arc::new(InMemoryLogSink::new());
        pipeline.register_sink(sink.clone());

        pipeline.emit(
            LogEvent::new(LogLevel::Warn, "provisioning rejected")
                .with_component("provisioning")
                .with_vehicle("car1"),
        );

        let events = sink.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "provisioning rejected");
        assert_eq!(sink.for_vehicle("car1").len(), 1);
        assert!(sink.for_vehicle("car2").is_empty());
    }

    #[test]
    fn sink_drops_oldest_past_capacity() {
        let sink = InMemoryLogSink::with_capacity(2);
        for n in 0..3 {
            sink.on_event(&LogEvent::new(LogLevel::Info, format!("event {n}")));
        }
        let messages: Vec<_> = sink.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["event 1", "event 2"]);
    }
}
