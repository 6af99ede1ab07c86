pub mod logging;
pub mod metrics;

pub use logging::{InMemoryLogSink, LogEvent, LogLevel, LogPipeline, LogSink};
pub use metrics::{CounterSample, InMemoryMetricsRegistry};
