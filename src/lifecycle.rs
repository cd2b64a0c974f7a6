//! Ticket state machine.
//!
//! Planning is pure: given the ticket as last read and a command, decide the
//! next row, the activity log entry and the event, or refuse. The store then
//! commits the plan only if the row still matches what was read, which turns
//! every transition into a compare-and-set.
//!
//! ```text
//! not_start ──Accept──▶ in_progress ──Complete──▶ completed
//!     │                   ▲      │
//!   Reject             Accept  Reassign
//!     ▼                   │      │
//!  rejected ──────────────┘      └──▶ in_progress
//! ```

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::event::{EventKind, LifecycleEvent};
use crate::model::{Action, ActivityLogEntry, ActorId, Status, Ticket, TicketId};
use crate::sla::SlaTimes;

/// A lifecycle command issued by a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Accept { actor: ActorId },
    Reject { actor: ActorId, reason: String },
    Complete { actor: ActorId },
    /// Administrative override; authorisation happens upstream.
    Reassign { to: ActorId },
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Command::Accept { .. } => Action::Accept,
            Command::Reject { .. } => Action::Reject,
            Command::Complete { .. } => Action::Complete,
            Command::Reassign { .. } => Action::Reassign,
        }
    }
}

/// What the stored row must still look like for a transition to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    pub status: Status,
    pub assigned_to_id: Option<ActorId>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Precondition {
    fn of(ticket: &Ticket) -> Self {
        Self {
            status: ticket.status,
            assigned_to_id: ticket.assigned_to_id.clone(),
            accepted_at: ticket.accepted_at,
        }
    }

    /// Does `ticket` still satisfy this precondition?
    pub fn holds_for(&self, ticket: &Ticket) -> bool {
        ticket.status == self.status
            && ticket.assigned_to_id == self.assigned_to_id
            && ticket.accepted_at == self.accepted_at
    }
}

/// A planned, not yet committed, state change.
///
/// Only the planner constructs these, so a store cannot be asked to write a
/// row the state machine did not approve.
#[derive(Debug, Clone)]
pub struct Transition {
    expected: Precondition,
    next: Ticket,
    entry: ActivityLogEntry,
    event: LifecycleEvent,
}

impl Transition {
    pub fn ticket_id(&self) -> TicketId {
        self.next.id
    }

    pub fn expected(&self) -> &Precondition {
        &self.expected
    }

    /// The row to write.
    pub fn next(&self) -> &Ticket {
        &self.next
    }

    /// The activity log entry to append in the same unit of work.
    pub fn entry(&self) -> &ActivityLogEntry {
        &self.entry
    }

    pub fn event(&self) -> &LifecycleEvent {
        &self.event
    }

    /// Whether this transition closes the ticket and so owns `resolution_time`.
    pub fn completes(&self) -> bool {
        self.entry.action == Action::Complete
    }

    /// The row to store over `stored`.
    ///
    /// SLA durations already present in the store win over the planned ones,
    /// since a backfill may have filled them after the plan was read. The one
    /// exception is completion, which always writes its resolution time.
    pub fn resolve(&self, stored: &Ticket) -> Ticket {
        let mut row = self.next.clone();
        row.response_time = stored.response_time.or(row.response_time);
        if !self.completes() {
            row.resolution_time = stored.resolution_time.or(row.resolution_time);
        }
        row
    }
}

/// Outcome of planning a command.
#[derive(Debug, Clone)]
pub enum Plan {
    Apply(Box<Transition>),
    /// The command is already satisfied; nothing to write.
    Unchanged,
}

/// Decide what `command` does to `ticket` at time `now`.
pub fn plan(ticket: &Ticket, command: &Command, now: DateTime<Utc>) -> Result<Plan> {
    match command {
        Command::Accept { actor } => plan_accept(ticket, actor, now),
        Command::Reject { actor, reason } => plan_reject(ticket, actor, reason, now),
        Command::Complete { actor } => plan_complete(ticket, actor, now),
        Command::Reassign { to } => plan_reassign(ticket, to, now),
    }
}

fn plan_accept(ticket: &Ticket, actor: &ActorId, now: DateTime<Utc>) -> Result<Plan> {
    match ticket.status {
        Status::Completed => return Err(invalid(ticket, Action::Accept)),
        Status::InProgress => return Err(Error::AlreadyClaimed(ticket.id)),
        Status::NotStart if ticket.assigned_to_id.is_some() => {
            return Err(Error::AlreadyClaimed(ticket.id));
        }
        Status::NotStart | Status::Rejected => {}
    }

    let mut next = ticket.clone();
    next.status = Status::InProgress;
    next.assigned_to_id = Some(actor.clone());
    next.rejection_reason = None;
    next.accepted_at = Some(ticket.accepted_at.unwrap_or(now.max(ticket.created_at)));
    let derived = SlaTimes::derive(next.created_at, next.accepted_at, None);
    next.response_time = ticket.response_time.or(derived.response_time);
    next.updated_at = now;

    Ok(apply(ticket, next, Action::Accept, actor, None, EventKind::Accepted, now))
}

fn plan_reject(
    ticket: &Ticket,
    actor: &ActorId,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Plan> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Error::Validation(
            "a rejection reason is required".to_string(),
        ));
    }
    if matches!(ticket.status, Status::InProgress | Status::Completed) {
        return Err(invalid(ticket, Action::Reject));
    }

    let mut next = ticket.clone();
    next.status = Status::Rejected;
    next.assigned_to_id = None;
    next.rejection_reason = Some(reason.to_string());
    next.updated_at = now;

    Ok(apply(
        ticket,
        next,
        Action::Reject,
        actor,
        Some(reason),
        EventKind::Rejected,
        now,
    ))
}

fn plan_complete(ticket: &Ticket, actor: &ActorId, now: DateTime<Utc>) -> Result<Plan> {
    match ticket.status {
        Status::Completed => {
            // Retried request: hand back the record as it stands.
            return match &ticket.assigned_to_id {
                Some(assignee) if assignee != actor => Err(forbidden(ticket, actor)),
                _ => Ok(Plan::Unchanged),
            };
        }
        Status::NotStart | Status::Rejected => return Err(invalid(ticket, Action::Complete)),
        Status::InProgress => {}
    }
    if ticket.assigned_to_id.as_ref() != Some(actor) {
        return Err(forbidden(ticket, actor));
    }

    let started = ticket.accepted_at.unwrap_or(ticket.created_at);
    let mut next = ticket.clone();
    next.status = Status::Completed;
    next.completed_at = Some(now.max(started));
    let derived = SlaTimes::derive(next.created_at, next.accepted_at, next.completed_at);
    next.response_time = ticket.response_time.or(derived.response_time);
    next.resolution_time = derived.resolution_time;
    next.updated_at = now;

    Ok(apply(ticket, next, Action::Complete, actor, None, EventKind::Completed, now))
}

fn plan_reassign(ticket: &Ticket, to: &ActorId, now: DateTime<Utc>) -> Result<Plan> {
    if ticket.status != Status::InProgress {
        return Err(invalid(ticket, Action::Reassign));
    }
    if ticket.assigned_to_id.as_ref() == Some(to) {
        return Ok(Plan::Unchanged);
    }

    // accepted_at and response_time describe the original claim and stay.
    let mut next = ticket.clone();
    next.assigned_to_id = Some(to.clone());
    next.updated_at = now;

    Ok(apply(ticket, next, Action::Reassign, to, None, EventKind::Reassigned, now))
}

fn apply(
    current: &Ticket,
    next: Ticket,
    action: Action,
    actor: &ActorId,
    note: Option<&str>,
    kind: EventKind,
    now: DateTime<Utc>,
) -> Plan {
    let mut entry = ActivityLogEntry::new(current.id, action, actor.clone(), now);
    if let Some(note) = note {
        entry = entry.with_note(note);
    }
    Plan::Apply(Box::new(Transition {
        expected: Precondition::of(current),
        next,
        entry,
        event: LifecycleEvent {
            ticket_id: current.id,
            kind,
            actor_id: actor.clone(),
            occurred_at: now,
        },
    }))
}

fn invalid(ticket: &Ticket, action: Action) -> Error {
    Error::InvalidTransition {
        from: ticket.status,
        action,
    }
}

fn forbidden(ticket: &Ticket, actor: &ActorId) -> Error {
    Error::Forbidden {
        ticket: ticket.id,
        actor: actor.clone(),
        action: Action::Complete,
    }
}
