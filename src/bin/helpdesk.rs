//! helpdesk CLI — operator interface to the ticket engine.

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use clap::{Parser, Subcommand};
use helpdesk_core::clock::ManualClock;
use helpdesk_core::config::{Config, Tunables};
use helpdesk_core::db::Db;
use helpdesk_core::engine::Engine;
use helpdesk_core::error::Error;
use helpdesk_core::event::LifecycleEvent;
use helpdesk_core::model::{ActivityLogEntry, ActorId, NewTicket, Status, Ticket, TicketId};
use helpdesk_core::notify::BroadcastNotifier;
use helpdesk_core::reconcile::{ReconcileSummary, Reconciler};
use helpdesk_core::store::MemoryStore;
use helpdesk_core::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "helpdesk", about = "IT helpdesk ticket engine")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Ticket operations
    Ticket {
        #[command(subcommand)]
        action: TicketAction,
    },
    /// Restore missing SLA timestamps from the activity log
    Reconcile {
        /// Tickets fetched per page
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Walk sample tickets through their lifecycle on an in-memory store
    Demo,
}

#[derive(Subcommand)]
enum TicketAction {
    /// Raise a new ticket
    Create {
        title: String,
        /// Requester ID
        #[arg(long)]
        requester: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List tickets
    List {
        /// Filter by status (not_start, in_progress, completed, rejected)
        #[arg(long)]
        status: Option<String>,
        /// Maximum tickets to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a ticket
    Show { id: String },
    /// Show a ticket's activity log
    Log { id: String },
    /// Claim a ticket
    Accept {
        id: String,
        #[arg(long)]
        actor: String,
    },
    /// Reject a ticket
    Reject {
        id: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        reason: String,
    },
    /// Complete a ticket
    Complete {
        id: String,
        #[arg(long)]
        actor: String,
    },
    /// Hand an in-progress ticket to another technician
    Reassign {
        id: String,
        #[arg(long)]
        to: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate => {
            let (_guard, _, db) = connect().await?;
            db.migrate().await?;
            db.health_check().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Command::Ticket { action } => {
            let (_guard, _, db) = connect().await?;
            cmd_ticket(Engine::new(db), action, cli.json).await
        }
        Command::Reconcile { batch_size } => {
            let (_guard, config, db) = connect().await?;
            let batch_size = batch_size.unwrap_or(config.tunables.reconcile_batch_size);
            let summary = Reconciler::new(db).batch_size(batch_size).reconcile().await?;
            emit(cli.json, &summary, print_summary)
        }
        Command::Demo => cmd_demo(cli.json).await,
    }
}

/// Load config, start telemetry and open the pool. Schema changes are left
/// to `helpdesk migrate`.
async fn connect() -> anyhow::Result<(TelemetryGuard, Config, Arc<Db>)> {
    let config = Config::from_env()?;

    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "helpdesk".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let db = Db::connect(
        config.database_url.expose_secret(),
        config.tunables.max_connections,
    )
    .await?;
    Ok((guard, config, Arc::new(db)))
}

async fn cmd_ticket(engine: Engine<Db>, action: TicketAction, json: bool) -> anyhow::Result<()> {
    match action {
        TicketAction::Create {
            title,
            requester,
            description,
        } => {
            let mut new = NewTicket::new(title, ActorId::new(requester));
            if let Some(description) = description {
                new = new.description(description);
            }
            let ticket = engine.create(new).await?;
            emit(json, &ticket, |t| {
                println!("Created: {} (status: {})", t.id(), t.status())
            })
        }
        TicketAction::List { status, limit } => {
            let status: Option<Status> = status.map(|s| s.parse()).transpose()?;
            emit(json, &engine.list(status, limit).await?, |t| cmd_list(t))
        }
        TicketAction::Show { id } => emit(json, &engine.get(id.parse()?).await?, print_ticket),
        TicketAction::Log { id } => {
            let entries = engine.history(id.parse()?).await?;
            emit(json, &entries, |e| print_log(e))
        }
        TicketAction::Accept { id, actor } => {
            let id: TicketId = id.parse()?;
            emit(json, &engine.accept(id, &ActorId::new(actor)).await?, print_ticket)
        }
        TicketAction::Reject { id, actor, reason } => {
            let id: TicketId = id.parse()?;
            let ticket = engine.reject(id, &ActorId::new(actor), &reason).await?;
            emit(json, &ticket, print_ticket)
        }
        TicketAction::Complete { id, actor } => {
            let id: TicketId = id.parse()?;
            emit(json, &engine.complete(id, &ActorId::new(actor)).await?, print_ticket)
        }
        TicketAction::Reassign { id, to } => {
            let id: TicketId = id.parse()?;
            emit(json, &engine.reassign(id, &ActorId::new(to)).await?, print_ticket)
        }
    }
}

/// Scripted walk-through on `MemoryStore`. Needs no database; events arrive
/// through a broadcast subscriber sized by `EVENT_CHANNEL_CAPACITY`.
async fn cmd_demo(json: bool) -> anyhow::Result<()> {
    let tunables = Tunables::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: None,
        service_name: "helpdesk-demo".to_string(),
        default_filter: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
    })?;

    let notifier = Arc::new(BroadcastNotifier::new(tunables.event_channel_capacity));
    let mut events = notifier.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event, json)?,
                Err(RecvError::Lagged(missed)) => eprintln!("({missed} events dropped)"),
                Err(RecvError::Closed) => break,
            }
        }
        anyhow::Ok(())
    });

    let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(0)));
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store)
        .with_clock(clock.clone())
        .with_notifier(notifier.clone());

    let alice = ActorId::new("alice");
    let bob = ActorId::new("bob");

    let projector = engine
        .create(
            NewTicket::new("Projector flickers", ActorId::new("lecturer-12"))
                .description("Lecture hall 2, since Monday"),
        )
        .await?
        .id();
    let duplicate = engine
        .create(NewTicket::new("Projector broken", ActorId::new("student-4")))
        .await?
        .id();

    clock.advance(Duration::minutes(12));
    engine.accept(projector, &alice).await?;
    match engine.accept(projector, &bob).await {
        Err(Error::AlreadyClaimed(_)) => eprintln!("bob was too late to claim {projector}"),
        other => anyhow::bail!("second claim should have been refused: {other:?}"),
    }
    engine
        .reject(duplicate, &alice, &format!("duplicate of {projector}"))
        .await?;

    clock.advance(Duration::minutes(20));
    engine.reassign(projector, &bob).await?;
    clock.advance(Duration::minutes(25));
    let done = engine.complete(projector, &bob).await?;

    drop(engine);
    drop(notifier);
    printer.await??;

    emit(json, &done, print_ticket)
}

/// Print `value` as pretty JSON or through the human-readable formatter.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_event(event: &LifecycleEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!(
            "{}  {:<10}  {}  by {}",
            event.occurred_at.format("%H:%M"),
            event.kind,
            event.ticket_id,
            event.actor_id
        );
    }
    Ok(())
}

fn print_summary(summary: &ReconcileSummary) {
    println!(
        "Scanned {}, updated {}, skipped {}.",
        summary.scanned, summary.updated, summary.skipped
    );
}

fn print_log(entries: &[ActivityLogEntry]) {
    for entry in entries {
        println!(
            "{}  {:<9}  {:<16}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action,
            entry.actor_id,
            entry.note.as_deref().unwrap_or("")
        );
    }
}

fn cmd_list(tickets: &[Ticket]) {
    if tickets.is_empty() {
        println!("No tickets found.");
        return;
    }

    println!(
        "{:<36}  {:<11}  {:<16}  {:<30}  CREATED",
        "ID", "STATUS", "ASSIGNEE", "TITLE"
    );
    println!("{}", "-".repeat(112));

    for ticket in tickets {
        let title: String = ticket.title().chars().take(30).collect();
        println!(
            "{:<36}  {:<11}  {:<16}  {:<30}  {}",
            ticket.id(),
            ticket.status(),
            ticket.assigned_to_id().map(ActorId::as_str).unwrap_or("-"),
            title,
            ticket.created_at().format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} ticket(s)", tickets.len());
}

fn print_ticket(ticket: &Ticket) {
    let minutes = |m: Option<i64>| m.map(|m| format!("{m} min")).unwrap_or("-".to_string());
    let at = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_string()).unwrap_or("-".to_string())
    };

    println!("ID:          {}", ticket.id());
    println!("Title:       {}", ticket.title());
    if let Some(description) = ticket.description() {
        println!("Description: {description}");
    }
    println!("Status:      {}", ticket.status());
    println!("Requester:   {}", ticket.requester_id());
    println!(
        "Assignee:    {}",
        ticket.assigned_to_id().map(ActorId::as_str).unwrap_or("-")
    );
    if let Some(reason) = ticket.rejection_reason() {
        println!("Rejected:    {reason}");
    }
    println!("Created:     {}", ticket.created_at());
    println!("Accepted:    {}", at(ticket.accepted_at()));
    println!("Completed:   {}", at(ticket.completed_at()));
    println!("Response:    {}", minutes(ticket.response_time()));
    println!("Resolution:  {}", minutes(ticket.resolution_time()));
}
