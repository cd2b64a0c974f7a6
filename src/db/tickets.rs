//! Ticket rows and activity log over SQLx.
//!
//! Every lifecycle commit is a single conditional `UPDATE` whose `WHERE`
//! clause restates the planned precondition, followed by the log insert in
//! the same transaction. No row returned means another writer got there
//! first; the transaction is dropped and nothing is written.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::lifecycle::Transition;
use crate::model::*;
use crate::reconcile::BackfillPatch;
use crate::store::TicketRepository;

impl super::Db {
    /// Load a historical row and its log as-is, bypassing the state machine.
    pub async fn import(&self, ticket: ImportedTicket, log: &[ActivityLogEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_ticket(&mut tx, &Ticket::from(ticket)).await?;
        for entry in log {
            insert_entry(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

impl TicketRepository for super::Db {
    async fn insert(&self, ticket: &Ticket, entry: &ActivityLogEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_ticket(&mut tx, ticket).await?;
        insert_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: TicketId) -> Result<Ticket> {
        let row: Option<TicketRow> = sqlx::query_as(
            "SELECT id, title, description, requester_id, status, assigned_to_id, rejection_reason, created_at, accepted_at, completed_at, response_time, resolution_time, updated_at
             FROM tickets WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("ticket {id}")))?
            .try_into_ticket()
    }

    async fn list(&self, status: Option<Status>, limit: usize) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT id, title, description, requester_id, status, assigned_to_id, rejection_reason, created_at, accepted_at, completed_at, response_time, resolution_time, updated_at
             FROM tickets
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(status.map(Status::as_str))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TicketRow::try_into_ticket).collect()
    }

    async fn activity_log(&self, id: TicketId) -> Result<Vec<ActivityLogEntry>> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tickets WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("ticket {id}")));
        }

        let rows: Vec<ActivityRow> = sqlx::query_as(
            "SELECT ticket_id, action, actor_id, note, created_at
             FROM activity_log WHERE ticket_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityRow::into_entry).collect())
    }

    async fn commit(&self, transition: &Transition) -> Result<Ticket> {
        let id = transition.ticket_id();
        let next = transition.next();
        let expected = transition.expected();

        let mut tx = self.pool.begin().await?;
        // Durations a backfill already stored are kept; only completion
        // overwrites resolution_time.
        let row: Option<TicketRow> = sqlx::query_as(
            "UPDATE tickets
             SET status = $1, assigned_to_id = $2, rejection_reason = $3, accepted_at = $4, completed_at = $5,
                 response_time = COALESCE(response_time, $6::bigint),
                 resolution_time = CASE WHEN $13 THEN $7::bigint ELSE COALESCE(resolution_time, $7::bigint) END,
                 updated_at = $8
             WHERE id = $9
               AND status = $10
               AND assigned_to_id IS NOT DISTINCT FROM $11
               AND accepted_at IS NOT DISTINCT FROM $12
             RETURNING id, title, description, requester_id, status, assigned_to_id, rejection_reason, created_at, accepted_at, completed_at, response_time, resolution_time, updated_at",
        )
        .bind(next.status.as_str())
        .bind(next.assigned_to_id.as_ref().map(ActorId::as_str))
        .bind(next.rejection_reason.as_deref())
        .bind(next.accepted_at)
        .bind(next.completed_at)
        .bind(next.response_time)
        .bind(next.resolution_time)
        .bind(next.updated_at)
        .bind(id.0)
        .bind(expected.status.as_str())
        .bind(expected.assigned_to_id.as_ref().map(ActorId::as_str))
        .bind(expected.accepted_at)
        .bind(transition.completes())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(Error::Conflict(id));
        };

        insert_entry(&mut tx, transition.entry()).await?;
        tx.commit().await?;
        row.try_into_ticket()
    }

    async fn backfill_candidates(
        &self,
        after: Option<TicketId>,
        limit: usize,
    ) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT id, title, description, requester_id, status, assigned_to_id, rejection_reason, created_at, accepted_at, completed_at, response_time, resolution_time, updated_at
             FROM tickets
             WHERE ($1::uuid IS NULL OR id > $1)
               AND ((status = 'in_progress' AND (accepted_at IS NULL OR response_time IS NULL))
                 OR (status = 'completed' AND (completed_at IS NULL OR response_time IS NULL OR resolution_time IS NULL)))
             ORDER BY id
             LIMIT $2",
        )
        .bind(after.map(|cursor| cursor.0))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TicketRow::try_into_ticket).collect()
    }

    async fn backfill(&self, patch: &BackfillPatch) -> Result<bool> {
        // COALESCE keeps whatever a live transition wrote in the meantime.
        let rows_affected = sqlx::query(
            "UPDATE tickets
             SET accepted_at = COALESCE(accepted_at, $2),
                 completed_at = COALESCE(completed_at, $3),
                 response_time = COALESCE(response_time, $4),
                 resolution_time = COALESCE(resolution_time, $5)
             WHERE id = $1
               AND ((accepted_at IS NULL AND $2::timestamptz IS NOT NULL)
                 OR (completed_at IS NULL AND $3::timestamptz IS NOT NULL)
                 OR (response_time IS NULL AND $4::bigint IS NOT NULL)
                 OR (resolution_time IS NULL AND $5::bigint IS NOT NULL))",
        )
        .bind(patch.ticket_id().0)
        .bind(patch.accepted_at())
        .bind(patch.completed_at())
        .bind(patch.response_time())
        .bind(patch.resolution_time())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }
}

async fn insert_ticket(conn: &mut PgConnection, ticket: &Ticket) -> Result<()> {
    sqlx::query(
        "INSERT INTO tickets (id, title, description, requester_id, status, assigned_to_id, rejection_reason, created_at, accepted_at, completed_at, response_time, resolution_time, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(ticket.id.0)
    .bind(&ticket.title)
    .bind(&ticket.description)
    .bind(ticket.requester_id.as_str())
    .bind(ticket.status.as_str())
    .bind(ticket.assigned_to_id.as_ref().map(ActorId::as_str))
    .bind(&ticket.rejection_reason)
    .bind(ticket.created_at)
    .bind(ticket.accepted_at)
    .bind(ticket.completed_at)
    .bind(ticket.response_time)
    .bind(ticket.resolution_time)
    .bind(ticket.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_entry(conn: &mut PgConnection, entry: &ActivityLogEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO activity_log (ticket_id, action, actor_id, note, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(entry.ticket_id.0)
    .bind(entry.action.as_str())
    .bind(entry.actor_id.as_str())
    .bind(&entry.note)
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    requester_id: String,
    status: String,
    assigned_to_id: Option<String>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    response_time: Option<i64>,
    resolution_time: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl TicketRow {
    fn try_into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: TicketId(self.id),
            title: self.title,
            description: self.description,
            requester_id: ActorId::new(self.requester_id),
            status: self.status.parse()?,
            assigned_to_id: self.assigned_to_id.map(ActorId::new),
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            accepted_at: self.accepted_at,
            completed_at: self.completed_at,
            response_time: self.response_time,
            resolution_time: self.resolution_time,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    ticket_id: Uuid,
    action: String,
    actor_id: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl ActivityRow {
    fn into_entry(self) -> ActivityLogEntry {
        ActivityLogEntry {
            ticket_id: TicketId(self.ticket_id),
            action: Action::from(self.action),
            actor_id: ActorId::new(self.actor_id),
            note: self.note,
            created_at: self.created_at,
        }
    }
}
