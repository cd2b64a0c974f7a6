//! Span helpers for ticket lifecycle commands.

use tracing::Span;

use crate::model::{Action, TicketId};

/// Start a span for one lifecycle command.
///
/// `ticket.outcome` is declared empty and filled by [`record_outcome`].
pub fn start_transition_span(action: &Action, ticket_id: TicketId) -> Span {
    tracing::info_span!(
        "ticket.transition",
        "ticket.action" = %action,
        "ticket.id" = %ticket_id,
        "ticket.outcome" = tracing::field::Empty,
    )
}

/// Record how the command ended on its span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("ticket.outcome", outcome);
}
