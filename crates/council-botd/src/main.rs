//! Council poll store daemon.
//!
//! Loads the TOML configuration, opens the crash-safe poll store, announces
//! poll conclusions from the store's event bus, and runs the periodic
//! expiration sweep until interrupted. The `exec` subcommand runs a single
//! chat command against the store from the shell, which is handy for
//! administration and for driving the store without a chat transport.

mod commands;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use council_store::{
    Config, ConclusionReason, MemberAddress, MessageId, PollId, PollStore, StoreEvent,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("council-botd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Crash-safe poll store daemon for council governance")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to the TOML configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (repeatable)"),
        )
        .subcommand(
            Command::new("exec")
                .about("Run one chat command against the store and exit")
                .arg(
                    Arg::new("actor")
                        .long("actor")
                        .required(true)
                        .help("Acting council member address"),
                )
                .arg(
                    Arg::new("message-id")
                        .long("message-id")
                        .default_value("cli")
                        .help("Message id recorded for undo bookkeeping"),
                )
                .arg(
                    Arg::new("replaces")
                        .long("replaces")
                        .help("Treat the command as a correction of this message id"),
                )
                .arg(
                    Arg::new("text")
                        .required(true)
                        .num_args(1..)
                        .help("Command text, as it would be said in the room"),
                ),
        )
}

fn init_tracing(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "info",
        1 => "council_store=debug,council_botd=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_count("verbose"));

    let config_path = matches
        .get_one::<PathBuf>("config")
        .expect("required argument");
    let config = Config::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let store = PollStore::open(&config.state.directory, config.council.members.clone())
        .with_context(|| {
            format!("opening poll store in {}", config.state.directory.display())
        })?;

    if let Some(("exec", sub)) = matches.subcommand() {
        return exec_once(store, sub);
    }
    run_daemon(store, &config).await
}

async fn run_daemon(store: PollStore, config: &Config) -> anyhow::Result<()> {
    // One subscription for the lifetime of the daemon; every conclusion,
    // whether from a command or the sweep, arrives here.
    let mut events = store.subscribe();
    let store = Arc::new(Mutex::new(store));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = tokio::spawn(scheduler::run_expiry_sweeps(
        Arc::clone(&store),
        Duration::from_secs(config.scheduler.expire_interval_secs),
        shutdown_rx,
    ));

    let announcer_store = Arc::clone(&store);
    let announcer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::PollConcluded { poll_id, reason }) => {
                    announce_conclusion(&announcer_store, &poll_id, reason);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "conclusion announcements lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    info!("council-botd running");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    announcer.abort();
    Ok(())
}

/// Announce a concluded poll the way the council room expects it: result
/// line first, then one line per member with their final vote.
fn announce_conclusion(store: &Mutex<PollStore>, poll_id: &PollId, reason: ConclusionReason) {
    let mut store = store.lock();
    let summary = match store.get_vote_summary(poll_id) {
        Ok(summary) => summary,
        Err(err) => {
            error!(poll_id = %poll_id, error = %err, "cannot summarise concluded poll");
            return;
        }
    };

    let mut lines = vec![format!(
        "Poll {} concluded due to {}. It has {}{}.",
        summary.subject,
        reason,
        if summary.result.has_passed() {
            "passed"
        } else {
            "failed"
        },
        if summary.result.has_veto() {
            " (with veto)"
        } else {
            ""
        },
    )];
    lines.extend(commands::format_vote_summary(&store, &summary, true));
    info!(poll_id = %poll_id, "{}", lines.join("\n"));
}

fn exec_once(mut store: PollStore, sub: &ArgMatches) -> anyhow::Result<()> {
    let actor = MemberAddress::from(
        sub.get_one::<String>("actor")
            .expect("required argument")
            .as_str(),
    );
    let message_id = MessageId::from(
        sub.get_one::<String>("message-id")
            .expect("defaulted argument")
            .as_str(),
    );
    let text = sub
        .get_many::<String>("text")
        .expect("required argument")
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");

    let reply = match sub.get_one::<String>("replaces") {
        Some(replaces) => commands::handle_correction(
            &mut store,
            &actor,
            &message_id,
            &MessageId::from(replaces.as_str()),
            &text,
        )?,
        None => commands::handle_message(&mut store, &actor, &message_id, &text)?,
    };

    match reply.and_then(|reply| reply.text) {
        Some(text) => println!("{text}"),
        None => println!("(no reply)"),
    }
    Ok(())
}
