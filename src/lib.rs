//! # helpdesk-core
//!
//! Ticket lifecycle and SLA-timing engine for the university IT helpdesk.
//!
//! Provides the ticket state machine with single-claim guarantees
//! ([`engine`], [`lifecycle`]), SLA duration math ([`sla`]), activity-log
//! backfill ([`reconcile`]), Postgres and in-memory stores ([`db`],
//! [`store`]), and OpenTelemetry observability ([`telemetry`]).

pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod sla;
pub mod store;
pub mod telemetry;
