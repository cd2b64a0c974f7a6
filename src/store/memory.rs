//! In-process ticket store.
//!
//! One mutex guards both the rows and the log, so a commit's compare, row
//! write and log append form a single critical section.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::lifecycle::Transition;
use crate::model::{ActivityLogEntry, ImportedTicket, Status, Ticket, TicketId};
use crate::reconcile::BackfillPatch;

use super::TicketRepository;

#[derive(Debug, Default)]
struct Inner {
    tickets: BTreeMap<TicketId, Ticket>,
    log: Vec<ActivityLogEntry>,
}

/// Ticket store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a historical row and its log as-is, bypassing the state machine.
    pub fn import(&self, ticket: ImportedTicket, log: Vec<ActivityLogEntry>) -> Result<()> {
        let mut inner = self.lock()?;
        let ticket = Ticket::from(ticket);
        if inner.tickets.contains_key(&ticket.id) {
            return Err(Error::Validation(format!(
                "ticket {} already exists",
                ticket.id
            )));
        }
        inner.tickets.insert(ticket.id, ticket);
        inner.log.extend(log);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Other("memory store lock poisoned".to_string()))
    }
}

impl TicketRepository for MemoryStore {
    async fn insert(&self, ticket: &Ticket, entry: &ActivityLogEntry) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.tickets.contains_key(&ticket.id) {
            return Err(Error::Validation(format!(
                "ticket {} already exists",
                ticket.id
            )));
        }
        inner.tickets.insert(ticket.id, ticket.clone());
        inner.log.push(entry.clone());
        Ok(())
    }

    async fn get(&self, id: TicketId) -> Result<Ticket> {
        self.lock()?
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))
    }

    async fn list(&self, status: Option<Status>, limit: usize) -> Result<Vec<Ticket>> {
        let inner = self.lock()?;
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tickets.truncate(limit);
        Ok(tickets)
    }

    async fn activity_log(&self, id: TicketId) -> Result<Vec<ActivityLogEntry>> {
        let inner = self.lock()?;
        if !inner.tickets.contains_key(&id) {
            return Err(Error::NotFound(format!("ticket {id}")));
        }
        let mut entries: Vec<ActivityLogEntry> = inner
            .log
            .iter()
            .filter(|e| e.ticket_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn commit(&self, transition: &Transition) -> Result<Ticket> {
        let id = transition.ticket_id();
        let mut inner = self.lock()?;
        let current = inner
            .tickets
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))?;
        if !transition.expected().holds_for(current) {
            return Err(Error::Conflict(id));
        }

        let next = transition.resolve(current);
        inner.tickets.insert(id, next.clone());
        inner.log.push(transition.entry().clone());
        Ok(next)
    }

    async fn backfill_candidates(
        &self,
        after: Option<TicketId>,
        limit: usize,
    ) -> Result<Vec<Ticket>> {
        let inner = self.lock()?;
        Ok(inner
            .tickets
            .values()
            .filter(|t| after.is_none_or(|cursor| t.id > cursor))
            .filter(|t| t.needs_backfill())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn backfill(&self, patch: &BackfillPatch) -> Result<bool> {
        let id = patch.ticket_id();
        let mut inner = self.lock()?;
        let ticket = inner
            .tickets
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))?;
        Ok(patch.fill(ticket))
    }
}
