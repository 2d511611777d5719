//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"courseforge"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("courseforge")
}

/// Counter: queue-level operations.
/// Labels: `operation` ("enqueue" | "claim" | "claim_empty" | "acknowledge" |
/// "requeue"), plus `job_type` on enqueue.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("courseforge.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: run status transitions.
/// Labels: `from`, `to`.
pub fn run_transitions() -> Counter<u64> {
    meter()
        .u64_counter("courseforge.run.transitions")
        .with_description("Number of run status transitions")
        .build()
}

/// Counter: validate-and-repair rounds.
/// Labels: `kind` ("outline" | "module"), `round` ("primary" | "extracted" |
/// "repaired"), `result` ("ok" | "invalid").
pub fn generation_rounds() -> Counter<u64> {
    meter()
        .u64_counter("courseforge.generation.rounds")
        .with_description("Validation-repair rounds by outcome")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation` (e.g. "job.outline", "job.content").
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("courseforge.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
