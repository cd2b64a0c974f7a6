//! Outbound port for lifecycle events.
//!
//! The engine decides *that* an event fires; implementations decide how it
//! reaches people. Delivery problems stay on the notifier's side and never
//! undo a committed transition.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::event::LifecycleEvent;

/// Receives one event per committed transition.
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: &LifecycleEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn notify(&self, _event: &LifecycleEvent) {}
}

/// Writes each event as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl EventNotifier for TracingNotifier {
    fn notify(&self, event: &LifecycleEvent) {
        info!(
            ticket_id = %event.ticket_id,
            event = %event.kind,
            actor = %event.actor_id,
            occurred_at = %event.occurred_at,
            "ticket event"
        );
    }
}

/// Fans events out to in-process subscribers (socket push, mailers).
///
/// Slow subscribers lag and lose the oldest events rather than block the
/// engine.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

impl EventNotifier for BroadcastNotifier {
    fn notify(&self, event: &LifecycleEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!(ticket_id = %event.ticket_id, "no event subscribers");
        }
    }
}
