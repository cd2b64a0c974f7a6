//! Claim exclusivity under concurrent Accept calls.

use std::sync::Arc;

use helpdesk_core::engine::Engine;
use helpdesk_core::error::Error;
use helpdesk_core::model::*;
use helpdesk_core::notify::{BroadcastNotifier, NoopNotifier};
use helpdesk_core::store::MemoryStore;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_racing_accepts_have_exactly_one_winner() {
    for _ in 0..200 {
        let engine =
            Engine::new(Arc::new(MemoryStore::new())).with_notifier(Arc::new(NoopNotifier));
        let id = engine
            .create(NewTicket::new("VPN drops every hour", ActorId::new("prof-3")))
            .await
            .unwrap()
            .id();

        let a = tokio::spawn({
            let engine = engine.clone();
            async move { engine.accept(id, &ActorId::new("alice")).await }
        });
        let b = tokio::spawn({
            let engine = engine.clone();
            async move { engine.accept(id, &ActorId::new("bob")).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let winners: Vec<&Ticket> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "exactly one accept must win");
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(Error::AlreadyClaimed(claimed)) if *claimed == id))
        );

        let stored = engine.get(id).await.unwrap();
        assert_eq!(stored.assigned_to_id(), winners[0].assigned_to_id());

        let accepts = engine
            .history(id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.action == Action::Accept)
            .count();
        assert_eq!(accepts, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_technicians_one_claim_one_event() {
    let notifier = Arc::new(BroadcastNotifier::new(128));
    let mut events = notifier.subscribe();
    let engine = Engine::new(Arc::new(MemoryStore::new())).with_notifier(notifier);
    let id = engine
        .create(NewTicket::new("Room 204 has no network", ActorId::new("admin-1")))
        .await
        .unwrap()
        .id();

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.accept(id, &ActorId::new(format!("tech-{n}"))).await })
        })
        .collect();

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(Error::AlreadyClaimed(_)) => lost += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((won, lost), (1, 15));

    let mut accepted_events = 0;
    while let Ok(event) = events.try_recv() {
        if event.kind == helpdesk_core::event::EventKind::Accepted {
            accepted_events += 1;
        }
    }
    assert_eq!(accepted_events, 1);
}
