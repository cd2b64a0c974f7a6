//! Core data model.
//!
//! A ticket is a support request raised by a requester and claimed by at most
//! one technician at a time. Its lifecycle fields are private to the crate:
//! the only writers are the store implementations, fed by transitions the
//! lifecycle planner builds and patches the backfill reconciler builds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Newtype for ticket IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TicketId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(TicketId)
            .map_err(|e| Error::Validation(format!("invalid ticket id {s:?}: {e}")))
    }
}

/// A requester, technician or administrator, as known to the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Raised, waiting for a technician.
    NotStart,
    /// Claimed by exactly one technician.
    InProgress,
    /// Resolved. Terminal.
    Completed,
    /// Turned down. Terminal, but a fresh Accept may reopen it.
    Rejected,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotStart => "not_start",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_start" => Ok(Status::NotStart),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "rejected" => Ok(Status::Rejected),
            _ => Err(Error::Other(format!("unknown ticket status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// A support ticket as held by the ticket store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub(crate) id: TicketId,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) requester_id: ActorId,
    pub(crate) status: Status,
    pub(crate) assigned_to_id: Option<ActorId>,
    pub(crate) rejection_reason: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) accepted_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    /// Minutes from creation to acceptance.
    pub(crate) response_time: Option<i64>,
    /// Minutes from acceptance (or creation) to completion.
    pub(crate) resolution_time: Option<i64>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Ticket {
    /// A freshly raised ticket: `not_start`, unassigned, no SLA data.
    pub(crate) fn open(new: NewTicket, now: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(),
            title: new.title,
            description: new.description,
            requester_id: new.requester_id,
            status: Status::NotStart,
            assigned_to_id: None,
            rejection_reason: None,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            response_time: None,
            resolution_time: None,
            updated_at: now,
        }
    }

    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn requester_id(&self) -> &ActorId {
        &self.requester_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn assigned_to_id(&self) -> Option<&ActorId> {
        self.assigned_to_id.as_ref()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
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

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Does this ticket lack SLA data the reconciler could restore?
    pub fn needs_backfill(&self) -> bool {
        match self.status {
            Status::InProgress => self.accepted_at.is_none() || self.response_time.is_none(),
            Status::Completed => {
                self.completed_at.is_none()
                    || self.response_time.is_none()
                    || self.resolution_time.is_none()
            }
            Status::NotStart | Status::Rejected => false,
        }
    }
}

/// A ticket row exactly as found in a historical dataset.
///
/// Used to import rows that predate the lifecycle engine. Any field may be
/// missing or inconsistent; the backfill reconciler repairs what the activity
/// log can justify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedTicket {
    pub id: TicketId,
    pub title: String,
    pub description: Option<String>,
    pub requester_id: ActorId,
    pub status: Status,
    pub assigned_to_id: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub response_time: Option<i64>,
    pub resolution_time: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl From<ImportedTicket> for Ticket {
    fn from(row: ImportedTicket) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            requester_id: row.requester_id,
            status: row.status,
            assigned_to_id: row.assigned_to_id,
            rejection_reason: None,
            created_at: row.created_at,
            accepted_at: row.accepted_at,
            completed_at: row.completed_at,
            response_time: row.response_time,
            resolution_time: row.resolution_time,
            updated_at: row.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Activity Log
// ---------------------------------------------------------------------------

/// A recorded action. Stored as free-form text; known verbs are recognised
/// case-insensitively, anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Create,
    Accept,
    Reject,
    Complete,
    Reassign,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Create => "Create",
            Action::Accept => "Accept",
            Action::Reject => "Reject",
            Action::Complete => "Complete",
            Action::Reassign => "Reassign",
            Action::Other(verb) => verb,
        }
    }
}

impl From<&str> for Action {
    fn from(verb: &str) -> Self {
        let lower = verb.trim().to_ascii_lowercase();
        if lower.starts_with("create") {
            Action::Create
        } else if lower.starts_with("accept") {
            Action::Accept
        } else if lower.starts_with("reject") {
            Action::Reject
        } else if lower.starts_with("complet") {
            Action::Complete
        } else if lower.starts_with("reassign") {
            Action::Reassign
        } else {
            Action::Other(verb.to_string())
        }
    }
}

impl From<String> for Action {
    fn from(verb: String) -> Self {
        Action::from(verb.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only activity log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub ticket_id: TicketId,
    pub action: Action,
    pub actor_id: ActorId,
    /// Free text attached to the action, e.g. a rejection reason.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(
        ticket_id: TicketId,
        action: Action,
        actor_id: ActorId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            action,
            actor_id,
            note: None,
            created_at,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for raising new tickets.
pub struct NewTicket {
    pub(crate) title: String,
    pub(crate) requester_id: ActorId,
    pub(crate) description: Option<String>,
}

impl NewTicket {
    pub fn new(title: impl Into<String>, requester: ActorId) -> Self {
        Self {
            title: title.into(),
            requester_id: requester,
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_verbs_are_case_insensitive() {
        assert_eq!(Action::from("ACCEPT"), Action::Accept);
        assert_eq!(Action::from("accepted"), Action::Accept);
        assert_eq!(Action::from(" Completed "), Action::Complete);
        assert_eq!(Action::from("reassign"), Action::Reassign);
        assert_eq!(
            Action::from("Escalate"),
            Action::Other("Escalate".to_string())
        );
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            Status::NotStart,
            Status::InProgress,
            Status::Completed,
            Status::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("closed".parse::<Status>().is_err());
    }

    #[test]
    fn only_in_progress_and_completed_tickets_need_backfill() {
        let now = Utc::now();
        let mut ticket = Ticket::open(NewTicket::new("printer", ActorId::new("req")), now);
        assert!(!ticket.needs_backfill());

        ticket.status = Status::Completed;
        ticket.completed_at = Some(now);
        assert!(ticket.needs_backfill());

        ticket.response_time = Some(0);
        ticket.resolution_time = Some(0);
        assert!(!ticket.needs_backfill());
    }
}
