//! Metric instrument factories.
//!
//! Instruments come from the `"helpdesk-core"` meter on the globally
//! registered `MeterProvider`; without one they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("helpdesk-core")
}

/// Counter: lifecycle commands by outcome.
/// Labels: `action`, `result` ("applied" | "unchanged" | error kind).
pub fn ticket_transitions() -> Counter<u64> {
    meter()
        .u64_counter("helpdesk.ticket.transitions")
        .with_description("Ticket lifecycle commands by outcome")
        .build()
}

/// Counter: Accept attempts that lost the claim race.
pub fn claim_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("helpdesk.ticket.claim_conflicts")
        .with_description("Accept attempts that lost to a concurrent claim")
        .build()
}

/// Counter: tickets examined by the backfill reconciler.
/// Labels: `result` ("updated" | "skipped" | "unchanged").
pub fn reconcile_tickets() -> Counter<u64> {
    meter()
        .u64_counter("helpdesk.reconcile.tickets")
        .with_description("Tickets examined by the SLA backfill")
        .build()
}

/// Histogram: lifecycle command latency in milliseconds.
/// Labels: `action`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("helpdesk.operation.duration_ms")
        .with_description("Lifecycle command duration in milliseconds")
        .with_unit("ms")
        .build()
}
