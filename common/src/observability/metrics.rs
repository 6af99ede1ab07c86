use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSample {
    pub name: String,
    pub value: u64,
    pub updated_at: DateTime<Utc>,
}

/// Monotonic counters keyed by name, shared by cloning.
#[derive(Clone, Default)]
pub struct InMemoryMetricsRegistry {
    inner: Arc<RwLock<BTreeMap<String, CounterSample>>>,
}

impl InMemoryMetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_counter(&self, name: impl Into<String>) {
        self.add(name, 1);
    }

    pub fn add(&self, name: impl Into<String>, value: u64) {
        let name = name.into();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let sample = guard.entry(name.clone()).or_insert(CounterSample {
            name,
            value: 0,
            updated_at: now,
        });
        sample.value = sample.value.saturating_add(value);
        sample.updated_at = now;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|sample| sample.value)
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<CounterSample> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
