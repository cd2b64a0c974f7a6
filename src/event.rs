//! Lifecycle events emitted by the engine on every successful transition.
//!
//! The engine hands each event to an [`EventNotifier`](crate::notify::EventNotifier)
//! exactly once, after the store write has committed. Delivery (socket push,
//! email) belongs to whoever implements the notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ActorId, TicketId};

/// A structured event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub ticket_id: TicketId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Who caused it. For reassignment this is the new assignee.
    pub actor_id: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Accepted,
    Rejected,
    Completed,
    Reassigned,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Created => "created",
            EventKind::Accepted => "accepted",
            EventKind::Rejected => "rejected",
            EventKind::Completed => "completed",
            EventKind::Reassigned => "reassigned",
        };
        write!(f, "{s}")
    }
}
