//! Integration tests for telemetry initialization and span helpers.

use helpdesk_core::model::{Action, TicketId};

#[test]
fn telemetry_initializes_without_endpoint() {
    // Tracing subscriber can only be set once per process; `try_init()`
    // returns Err instead of panicking if another test got there first.
    let config = helpdesk_core::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "helpdesk-test".to_string(),
        default_filter: "debug".to_string(),
    };
    let _guard = helpdesk_core::telemetry::init_telemetry(config);
}

#[test]
fn transition_span_creates_and_records_outcome() {
    let span =
        helpdesk_core::telemetry::ticket::start_transition_span(&Action::Accept, TicketId::new());
    helpdesk_core::telemetry::ticket::record_outcome(&span, "applied");
}

#[test]
fn metric_instruments_work_without_a_provider() {
    helpdesk_core::telemetry::metrics::ticket_transitions().add(1, &[]);
    helpdesk_core::telemetry::metrics::claim_conflicts().add(1, &[]);
    helpdesk_core::telemetry::metrics::reconcile_tickets().add(0, &[]);
    helpdesk_core::telemetry::metrics::operation_duration_ms().record(1.5, &[]);
}
