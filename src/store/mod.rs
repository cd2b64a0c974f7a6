//! Ticket store contract.
//!
//! A repository persists tickets and their activity log. It never decides a
//! transition itself: it is handed a [`Transition`] the state machine planned
//! and commits it only if the stored row still matches the plan's
//! precondition, appending the log entry in the same unit of work.

pub mod memory;

use std::future::Future;

use crate::error::Result;
use crate::lifecycle::Transition;
use crate::model::{ActivityLogEntry, Status, Ticket, TicketId};
use crate::reconcile::BackfillPatch;

pub use memory::MemoryStore;

pub trait TicketRepository: Send + Sync {
    /// Insert a newly raised ticket together with its `Create` log entry.
    fn insert(
        &self,
        ticket: &Ticket,
        entry: &ActivityLogEntry,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch one ticket. Fails with `NotFound` for unknown IDs.
    fn get(&self, id: TicketId) -> impl Future<Output = Result<Ticket>> + Send;

    /// Newest first, optionally filtered by status.
    fn list(
        &self,
        status: Option<Status>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Ticket>>> + Send;

    /// The ticket's activity log in ascending `created_at` order.
    fn activity_log(
        &self,
        id: TicketId,
    ) -> impl Future<Output = Result<Vec<ActivityLogEntry>>> + Send;

    /// Atomically write `transition.next()` and append `transition.entry()`.
    ///
    /// Fails with `Conflict` and writes nothing if the stored row no longer
    /// satisfies `transition.expected()`.
    fn commit(&self, transition: &Transition) -> impl Future<Output = Result<Ticket>> + Send;

    /// Up to `limit` tickets with missing SLA data, ordered by ID, strictly
    /// after `after`.
    fn backfill_candidates(
        &self,
        after: Option<TicketId>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Ticket>>> + Send;

    /// Fill the patch's fields where the stored value is still null.
    /// Returns whether anything was written.
    fn backfill(&self, patch: &BackfillPatch) -> impl Future<Output = Result<bool>> + Send;
}
