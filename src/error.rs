//! Error types for helpdesk-core.

use thiserror::Error;

use crate::model::{Action, ActorId, Status, TicketId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// Lost a claim race. The caller should refetch the queue.
    #[error("ticket {0} is already claimed by another technician")]
    AlreadyClaimed(TicketId),

    #[error("cannot {action} a ticket that is {from}")]
    InvalidTransition { from: Status, action: Action },

    #[error("{actor} is not allowed to {action} ticket {ticket}")]
    Forbidden {
        ticket: TicketId,
        actor: ActorId,
        action: Action,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    /// The activity log holds no entry that justifies a required timestamp.
    #[error("reconciliation gap on ticket {ticket}: {reason}")]
    ReconciliationGap { ticket: TicketId, reason: String },

    /// The stored row no longer matches the state a transition was planned against.
    #[error("concurrent modification of ticket {0}")]
    Conflict(TicketId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
