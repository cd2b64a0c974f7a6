//! Lifecycle engine. The public API for raising and moving tickets.
//!
//! The engine owns the clock and the notifier and drives every transition
//! through the state machine and the store's compare-and-set commit. It is
//! shared across request handlers behind an `Arc`; no operation takes a lock
//! wider than one ticket row.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::event::{EventKind, LifecycleEvent};
use crate::lifecycle::{self, Command, Plan};
use crate::model::*;
use crate::notify::{EventNotifier, TracingNotifier};
use crate::store::TicketRepository;
use crate::telemetry::metrics;
use crate::telemetry::ticket::{record_outcome, start_transition_span};

/// The lifecycle engine.
pub struct Engine<R> {
    repo: Arc<R>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn EventNotifier>,
}

impl<R> Clone for Engine<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            clock: Arc::clone(&self.clock),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<R: TicketRepository> Engine<R> {
    /// Engine over `repo` with the system clock and log-only notifications.
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock::new()),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Raise a ticket: `not_start`, unassigned, with a `Create` log entry.
    pub async fn create(&self, new: NewTicket) -> Result<Ticket> {
        if new.title.trim().is_empty() {
            return Err(Error::Validation("a ticket title is required".to_string()));
        }
        let now = self.clock.now();
        let ticket = Ticket::open(new, now);
        let entry =
            ActivityLogEntry::new(ticket.id, Action::Create, ticket.requester_id.clone(), now);

        self.repo.insert(&ticket, &entry).await?;
        info!(ticket_id = %ticket.id, requester = %ticket.requester_id, "ticket raised");
        self.notifier.notify(&LifecycleEvent {
            ticket_id: ticket.id,
            kind: EventKind::Created,
            actor_id: ticket.requester_id.clone(),
            occurred_at: now,
        });
        Ok(ticket)
    }

    /// Claim an unassigned ticket for `actor`.
    ///
    /// Exactly one of several concurrent callers succeeds; the others get
    /// `AlreadyClaimed`.
    pub async fn accept(&self, id: TicketId, actor: &ActorId) -> Result<Ticket> {
        self.execute(
            id,
            Command::Accept {
                actor: actor.clone(),
            },
        )
        .await
    }

    /// Turn down an unclaimed ticket. `reason` must not be blank.
    pub async fn reject(&self, id: TicketId, actor: &ActorId, reason: &str) -> Result<Ticket> {
        self.execute(
            id,
            Command::Reject {
                actor: actor.clone(),
                reason: reason.to_string(),
            },
        )
        .await
    }

    /// Resolve a ticket. Only its assignee may; repeating the call returns the
    /// stored record unchanged.
    pub async fn complete(&self, id: TicketId, actor: &ActorId) -> Result<Ticket> {
        self.execute(
            id,
            Command::Complete {
                actor: actor.clone(),
            },
        )
        .await
    }

    /// Hand an in-progress ticket to another technician. Administrative.
    pub async fn reassign(&self, id: TicketId, to: &ActorId) -> Result<Ticket> {
        self.execute(id, Command::Reassign { to: to.clone() }).await
    }

    /// Get a ticket by ID.
    pub async fn get(&self, id: TicketId) -> Result<Ticket> {
        self.repo.get(id).await
    }

    /// List tickets, newest first.
    pub async fn list(&self, status: Option<Status>, limit: usize) -> Result<Vec<Ticket>> {
        self.repo.list(status, limit).await
    }

    /// The ticket's activity log, oldest first.
    pub async fn history(&self, id: TicketId) -> Result<Vec<ActivityLogEntry>> {
        self.repo.activity_log(id).await
    }

    async fn execute(&self, id: TicketId, command: Command) -> Result<Ticket> {
        let action = command.action();
        let span = start_transition_span(&action, id);
        let started = Instant::now();

        let result = self.run(id, &command).instrument(span.clone()).await;

        let outcome = match &result {
            Ok((_, true)) => "applied",
            Ok((_, false)) => "unchanged",
            Err(e) => error_kind(e),
        };
        record_outcome(&span, outcome);
        metrics::ticket_transitions().add(
            1,
            &[
                KeyValue::new("action", action.to_string()),
                KeyValue::new("result", outcome),
            ],
        );
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("action", action.to_string())],
        );

        result.map(|(ticket, _)| ticket)
    }

    /// Plan against the current row and commit. The flag says whether
    /// anything was written.
    async fn run(&self, id: TicketId, command: &Command) -> Result<(Ticket, bool)> {
        let ticket = self.repo.get(id).await?;
        let now = self.clock.now();

        let transition = match lifecycle::plan(&ticket, command, now)? {
            Plan::Unchanged => {
                debug!(status = %ticket.status, "command already satisfied");
                return Ok((ticket, false));
            }
            Plan::Apply(transition) => transition,
        };

        match self.repo.commit(&transition).await {
            Ok(updated) => {
                info!(
                    from = %ticket.status,
                    to = %updated.status,
                    actor = %transition.entry().actor_id,
                    "ticket transition committed"
                );
                self.notifier.notify(transition.event());
                Ok((updated, true))
            }
            Err(Error::Conflict(_)) => self.lost_race(id, command, now).await,
            Err(e) => Err(e),
        }
    }

    /// The row changed between read and commit. Report why without retrying.
    async fn lost_race(
        &self,
        id: TicketId,
        command: &Command,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(Ticket, bool)> {
        if let Command::Accept { actor } = command {
            metrics::claim_conflicts().add(1, &[]);
            info!(actor = %actor, "claim lost to a concurrent accept");
            return Err(Error::AlreadyClaimed(id));
        }

        let fresh = self.repo.get(id).await?;
        match lifecycle::plan(&fresh, command, now)? {
            Plan::Unchanged => Ok((fresh, false)),
            Plan::Apply(_) => Err(Error::Conflict(id)),
        }
    }
}

fn error_kind(e: &Error) -> &'static str {
    match e {
        Error::NotFound(_) => "not_found",
        Error::AlreadyClaimed(_) => "already_claimed",
        Error::InvalidTransition { .. } => "invalid_transition",
        Error::Forbidden { .. } => "forbidden",
        Error::Validation(_) => "validation",
        Error::Conflict(_) => "conflict",
        _ => "error",
    }
}
