//! Backfill of missing SLA timestamps from the activity log.
//!
//! Tickets raised before the timestamp columns existed, or touched by a write
//! that skipped them, are repaired by replaying their activity log. Values
//! already on the row are ground truth and are never replaced; only nulls are
//! filled. That rule is what makes a second run a no-op.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;
use tracing::{Instrument, debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Action, ActivityLogEntry, Status, Ticket, TicketId};
use crate::sla::SlaTimes;
use crate::store::TicketRepository;
use crate::telemetry::metrics;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Values to fill on one ticket. `None` means leave the column alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillPatch {
    ticket_id: TicketId,
    accepted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    response_time: Option<i64>,
    resolution_time: Option<i64>,
    /// `completed_at` came from the last-modified timestamp, not a log entry.
    approximated: bool,
}

impl BackfillPatch {
    pub fn ticket_id(&self) -> TicketId {
        self.ticket_id
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn response_time(&self) -> Option<i64> {
        self.response_time
    }

    pub fn resolution_time(&self) -> Option<i64> {
        self.resolution_time
    }

    pub fn is_approximated(&self) -> bool {
        self.approximated
    }

    fn is_empty(&self) -> bool {
        self.accepted_at.is_none()
            && self.completed_at.is_none()
            && self.response_time.is_none()
            && self.resolution_time.is_none()
    }

    /// Apply to an in-memory row, filling nulls only.
    pub(crate) fn fill(&self, ticket: &mut Ticket) -> bool {
        let before = (
            ticket.accepted_at,
            ticket.completed_at,
            ticket.response_time,
            ticket.resolution_time,
        );
        ticket.accepted_at = ticket.accepted_at.or(self.accepted_at);
        ticket.completed_at = ticket.completed_at.or(self.completed_at);
        ticket.response_time = ticket.response_time.or(self.response_time);
        ticket.resolution_time = ticket.resolution_time.or(self.resolution_time);
        before
            != (
                ticket.accepted_at,
                ticket.completed_at,
                ticket.response_time,
                ticket.resolution_time,
            )
    }
}

/// Work out what the activity log can restore on `ticket`.
///
/// Returns `Ok(None)` when nothing is missing or nothing can be derived, and
/// `ReconciliationGap` when a required timestamp has no supporting entry.
pub fn plan_backfill(ticket: &Ticket, log: &[ActivityLogEntry]) -> Result<Option<BackfillPatch>> {
    let mut entries: Vec<&ActivityLogEntry> = log.iter().collect();
    entries.sort_by_key(|entry| entry.created_at);

    let first = |action: Action| {
        entries
            .iter()
            .find(|entry| entry.action == action)
            .map(|entry| entry.created_at)
    };

    let accepted_at = ticket.accepted_at.or_else(|| first(Action::Accept));
    if ticket.status == Status::InProgress && accepted_at.is_none() {
        return Err(Error::ReconciliationGap {
            ticket: ticket.id,
            reason: "in-progress ticket has no accept entry".to_string(),
        });
    }

    let mut approximated = false;
    let completed_at = match (ticket.status, ticket.completed_at) {
        (_, Some(completed)) => Some(completed),
        (Status::Completed, None) => Some(first(Action::Complete).unwrap_or_else(|| {
            approximated = true;
            ticket.updated_at
        })),
        _ => None,
    };

    let derived = SlaTimes::derive(ticket.created_at, accepted_at, completed_at);
    let patch = BackfillPatch {
        ticket_id: ticket.id,
        accepted_at: ticket.accepted_at.is_none().then_some(accepted_at).flatten(),
        completed_at: ticket.completed_at.is_none().then_some(completed_at).flatten(),
        response_time: ticket
            .response_time
            .is_none()
            .then_some(derived.response_time)
            .flatten(),
        resolution_time: ticket
            .resolution_time
            .is_none()
            .then_some(derived.resolution_time)
            .flatten(),
        approximated,
    };

    Ok((!patch.is_empty()).then_some(patch))
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Eligible tickets examined.
    pub scanned: usize,
    /// Tickets with at least one field written.
    pub updated: usize,
    /// Tickets left for manual review.
    pub skipped: usize,
}

/// Batch job that walks every ticket with missing SLA data.
pub struct Reconciler<R> {
    repo: Arc<R>,
    batch_size: usize,
}

impl<R: TicketRepository> Reconciler<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run one full pass. Safe to interrupt and to repeat.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let span = tracing::info_span!("ticket.reconcile", batch_size = self.batch_size);
        async {
            let mut summary = ReconcileSummary::default();
            let mut cursor = None;

            loop {
                let batch = self
                    .repo
                    .backfill_candidates(cursor, self.batch_size)
                    .await?;
                let Some(last) = batch.last() else {
                    break;
                };
                cursor = Some(last.id);
                let exhausted = batch.len() < self.batch_size;

                for ticket in &batch {
                    summary.scanned += 1;
                    match self.reconcile_one(ticket).await {
                        Ok(true) => summary.updated += 1,
                        Ok(false) => {}
                        Err(e) => {
                            summary.skipped += 1;
                            warn!(ticket_id = %ticket.id, error = %e, "ticket left for manual review");
                        }
                    }
                }

                if exhausted {
                    break;
                }
            }

            record(&summary);
            info!(
                scanned = summary.scanned,
                updated = summary.updated,
                skipped = summary.skipped,
                "reconciliation finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn reconcile_one(&self, ticket: &Ticket) -> Result<bool> {
        let log = self.repo.activity_log(ticket.id).await?;
        let Some(patch) = plan_backfill(ticket, &log)? else {
            debug!(ticket_id = %ticket.id, "nothing to restore");
            return Ok(false);
        };
        if patch.approximated {
            warn!(
                ticket_id = %ticket.id,
                completed_at = %ticket.updated_at,
                "no complete entry, using last-modified time as completion"
            );
        }
        self.repo.backfill(&patch).await
    }
}

fn record(summary: &ReconcileSummary) {
    let counter = metrics::reconcile_tickets();
    counter.add(summary.updated as u64, &[KeyValue::new("result", "updated")]);
    counter.add(summary.skipped as u64, &[KeyValue::new("result", "skipped")]);
    counter.add(
        (summary.scanned - summary.updated - summary.skipped) as u64,
        &[KeyValue::new("result", "unchanged")],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActorId, NewTicket};
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2024-03-04T09:00:00Z".parse().unwrap()
    }

    fn legacy(status: Status) -> Ticket {
        let mut ticket = Ticket::open(NewTicket::new("wifi", ActorId::new("req")), t0());
        ticket.status = status;
        ticket.updated_at = t0() + Duration::minutes(90);
        ticket
    }

    fn entry(ticket: &Ticket, verb: &str, minutes: i64) -> ActivityLogEntry {
        ActivityLogEntry::new(
            ticket.id,
            Action::from(verb),
            ActorId::new("tech"),
            t0() + Duration::minutes(minutes),
        )
    }

    #[test]
    fn replays_out_of_order_log() {
        let ticket = legacy(Status::Completed);
        let log = vec![
            entry(&ticket, "Complete", 40),
            entry(&ticket, "accept", 10),
            entry(&ticket, "Accept", 25),
        ];
        let patch = plan_backfill(&ticket, &log).unwrap().unwrap();
        assert_eq!(patch.accepted_at(), Some(t0() + Duration::minutes(10)));
        assert_eq!(patch.completed_at(), Some(t0() + Duration::minutes(40)));
        assert_eq!(patch.response_time(), Some(10));
        assert_eq!(patch.resolution_time(), Some(30));
        assert!(!patch.is_approximated());
    }

    #[test]
    fn missing_complete_entry_falls_back_to_last_modified() {
        let ticket = legacy(Status::Completed);
        let patch = plan_backfill(&ticket, &[]).unwrap().unwrap();
        assert_eq!(patch.completed_at(), Some(ticket.updated_at));
        assert_eq!(patch.response_time(), Some(0));
        assert_eq!(patch.resolution_time(), Some(90));
        assert!(patch.is_approximated());
    }

    #[test]
    fn in_progress_without_accept_entry_is_a_gap() {
        let ticket = legacy(Status::InProgress);
        let err = plan_backfill(&ticket, &[entry(&ticket, "Create", 0)]).unwrap_err();
        assert!(matches!(err, Error::ReconciliationGap { .. }));
    }

    #[test]
    fn existing_values_are_not_in_the_patch() {
        let mut ticket = legacy(Status::InProgress);
        ticket.accepted_at = Some(t0() + Duration::minutes(3));
        let log = vec![entry(&ticket, "Accept", 20)];

        let patch = plan_backfill(&ticket, &log).unwrap().unwrap();
        assert_eq!(patch.accepted_at(), None);
        assert_eq!(patch.response_time(), Some(3));
    }

    #[test]
    fn complete_ticket_has_nothing_to_restore() {
        let mut ticket = legacy(Status::Completed);
        ticket.completed_at = Some(t0());
        ticket.response_time = Some(0);
        ticket.resolution_time = Some(0);
        assert_eq!(plan_backfill(&ticket, &[]).unwrap(), None);
    }

    #[test]
    fn fill_never_overwrites() {
        let mut ticket = legacy(Status::Completed);
        ticket.resolution_time = Some(12);
        let patch = BackfillPatch {
            ticket_id: ticket.id,
            accepted_at: None,
            completed_at: Some(t0()),
            response_time: Some(0),
            resolution_time: Some(99),
            approximated: false,
        };
        assert!(patch.fill(&mut ticket));
        assert_eq!(ticket.resolution_time, Some(12));
        assert!(!patch.fill(&mut ticket));
    }
}
