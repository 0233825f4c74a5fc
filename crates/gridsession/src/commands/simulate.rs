//! Simulate command - drive a session lifecycle against an in-process grid.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use gridsession_config::{GridSessionConfig, SessionConfig, StoreConfig, Topology};
use gridsession_core::{
    Authentication, BroadcastEventBus, KeyEventMessageListener, SECURITY_CONTEXT_ATTRIBUTE,
    SecurityContext, SessionEvent, SessionRepository, StoreBackend, Subscription, create_store,
};

use super::Context;

/// Arguments for the simulate command.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of sessions to create
    #[arg(long, default_value_t = 5)]
    pub sessions: usize,

    /// Principals assigned to sessions in round-robin order
    #[arg(long, value_delimiter = ',', default_value = "robWinch,jblum")]
    pub principals: Vec<String>,

    /// Session idle timeout in seconds for this run
    #[arg(long, default_value_t = 1)]
    pub idle_secs: u32,

    /// Skip waiting for idle expiry
    #[arg(long)]
    pub no_expiry: bool,
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    let config = simulation_config(&ctx.config.config, &args);
    config.validate().context("invalid configuration")?;

    let events = config.events();
    let bus = Arc::new(BroadcastEventBus::new(events.channel_capacity));
    let mut rx = bus.subscribe();

    let (server, store) = build_stores(&config)?;
    let repository = SessionRepository::builder_from_config(&config)
        .store(store.as_store())
        .event_bus(bus.clone())
        .build()?;

    if events.key_events {
        server
            .as_store()
            .subscribe(Subscription::KeyEvents(Arc::new(KeyEventMessageListener::new(
                bus.clone(),
                events.key_prefix.clone(),
            ))))?;
    }
    let _sweeper = server.start_expiry_sweeper(&config);

    info!(
        topology = %store.topology(),
        sessions = args.sessions,
        subscribers = bus.receiver_count(),
        "Starting simulation"
    );

    let principals: Vec<&str> = if args.principals.is_empty() {
        vec!["anonymous"]
    } else {
        args.principals.iter().map(String::as_str).collect()
    };

    let mut ids = Vec::with_capacity(args.sessions);
    for i in 0..args.sessions {
        let session = repository.create_session();
        let principal = principals[i % principals.len()];
        let context = SecurityContext::authenticated(
            Authentication::new(principal).with_authority("ROLE_USER"),
        );
        session.set_attribute(SECURITY_CONTEXT_ATTRIBUTE, context);
        session.set_attribute("visit", i as i64);
        repository.save(&session)?;
        ids.push(session.id().to_string());
    }
    print_events(&mut rx, ctx, Duration::from_millis(50)).await?;

    for principal in &principals {
        let found = repository.find_by_principal_name(principal)?;
        if ctx.json_output {
            println!(
                "{}",
                serde_json::json!({ "principal": principal, "sessions": found.len() })
            );
        } else {
            println!("principal {:<12} {} session(s)", principal, found.len());
        }
    }

    if let Some(first) = ids.first() {
        repository.delete(first)?;
    }
    print_events(&mut rx, ctx, Duration::from_millis(50)).await?;

    if !args.no_expiry && config.store().expiration {
        let wait = Duration::from_secs(u64::from(args.idle_secs)) + Duration::from_millis(500);
        info!(wait_ms = wait.as_millis() as u64, "Waiting for idle expiry");
        tokio::time::sleep(wait).await;
        print_events(&mut rx, ctx, config.store().cleanup_interval() * 2).await?;

        let remaining = ids
            .iter()
            .filter_map(|id| repository.get_session(id).transpose())
            .collect::<gridsession_core::Result<Vec<_>>>()?;
        if !ctx.json_output {
            println!("{} session(s) left after expiry", remaining.len());
        }
    }

    Ok(())
}

/// Apply the run's overrides to the loaded configuration.
fn simulation_config(base: &GridSessionConfig, args: &SimulateArgs) -> GridSessionConfig {
    let mut store = base.store();
    store.cleanup_interval_ms = store.cleanup_interval_ms.min(200);
    GridSessionConfig {
        session: Some(SessionConfig {
            max_inactive_interval_secs: args.idle_secs as i32,
        }),
        store: Some(store),
        ..base.clone()
    }
}

/// Build the data-holding store and the store the repository talks to.
///
/// For client topology an in-process peer stands in for the server.
fn build_stores(config: &GridSessionConfig) -> Result<(StoreBackend, StoreBackend)> {
    match config.store().topology {
        Topology::Peer => {
            let peer = create_store(config, None)?;
            Ok((peer.clone(), peer))
        }
        Topology::Client => {
            let server_config = GridSessionConfig {
                store: Some(StoreConfig {
                    topology: Topology::Peer,
                    ..config.store()
                }),
                ..config.clone()
            };
            let server = create_store(&server_config, None)?;
            let client = create_store(config, Some(server.as_store()))?;
            Ok((server, client))
        }
    }
}

/// Print events until none arrive for `quiet`.
async fn print_events(
    rx: &mut broadcast::Receiver<SessionEvent>,
    ctx: &Context,
    quiet: Duration,
) -> Result<()> {
    loop {
        match tokio::time::timeout(quiet, rx.recv()).await {
            Ok(Ok(event)) => print_event(&event, ctx)?,
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "Event receiver lagged");
            }
            Ok(Err(RecvError::Closed)) | Err(_) => return Ok(()),
        }
    }
}

fn print_event(event: &SessionEvent, ctx: &Context) -> Result<()> {
    let session = event.subject.session();
    if ctx.json_output {
        let security_context = session
            .and_then(|s| s.security_context())
            .map(serde_json::to_value)
            .transpose()?;
        println!(
            "{}",
            serde_json::json!({
                "event": event.kind.to_string(),
                "session_id": event.session_id(),
                "origin": format!("{:?}", event.origin),
                "principal": session.and_then(|s| s.principal_name()),
                "security_context": security_context,
                "timestamp": event.timestamp.to_rfc3339(),
            })
        );
    } else if ctx.verbose
        && let Some(session) = session
    {
        println!("{:<10} {}", event.kind, session);
    } else {
        println!("{:<10} {}", event.kind, event.session_id());
    }
    Ok(())
}
