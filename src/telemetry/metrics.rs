//! Metric instruments for work groups.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`, so
//! recording is a no-op until [`init_telemetry`](super::init_telemetry) (or
//! the host application) installs one.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for workgroup instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("workgroup")
}

/// Counter: worker invocations that returned normally.
/// Labels: `group`.
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("workgroup.items.processed")
        .with_description("Number of work items processed by a worker")
        .build()
}

/// Counter: idle-timeout events.
/// Labels: `group`.
pub fn idle_timeouts() -> Counter<u64> {
    meter()
        .u64_counter("workgroup.worker.idle_timeouts")
        .with_description("Times a worker waited a full timeout without work")
        .build()
}

/// Counter: worker invocations that panicked.
/// Labels: `group`.
pub fn worker_panics() -> Counter<u64> {
    meter()
        .u64_counter("workgroup.worker.panics")
        .with_description("Number of worker invocations that panicked")
        .build()
}

/// Histogram: single-task duration in milliseconds. Only recorded when
/// timing is enabled on the group.
/// Labels: `group`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workgroup.task.duration_ms")
        .with_description("Worker invocation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Instruments built once per running group and shared by its workers.
#[derive(Clone)]
pub struct GroupInstruments {
    labels: [KeyValue; 1],
    processed: Counter<u64>,
    idle_timeouts: Counter<u64>,
    panics: Counter<u64>,
    duration: Histogram<f64>,
}

impl GroupInstruments {
    pub fn new(group: &str) -> Self {
        Self {
            labels: [KeyValue::new("group", group.to_string())],
            processed: items_processed(),
            idle_timeouts: idle_timeouts(),
            panics: worker_panics(),
            duration: task_duration_ms(),
        }
    }

    pub fn record_processed(&self) {
        self.processed.add(1, &self.labels);
    }

    pub fn record_idle_timeout(&self) {
        self.idle_timeouts.add(1, &self.labels);
    }

    pub fn record_panic(&self) {
        self.panics.add(1, &self.labels);
    }

    pub fn record_duration(&self, elapsed: std::time::Duration) {
        self.duration
            .record(elapsed.as_secs_f64() * 1000.0, &self.labels);
    }
}
