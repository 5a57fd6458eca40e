//! mixlite - command-line host for the mixlite analytics client
//!
//! Tracks events and profile updates from the shell, inspects and flushes
//! the durable queue, and can stay running to deliver the backlog whenever
//! connectivity returns.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Queue: $XDG_DATA_HOME/mixlite/queue.db (~/.local/share/mixlite/queue.db)
//! - Logs: $XDG_STATE_HOME/mixlite/mixlite.log (~/.local/state/mixlite/mixlite.log)
//! - Config: $XDG_CONFIG_HOME/mixlite/config.toml (~/.config/mixlite/config.toml)

mod watch;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mixlite_core::builder::properties_from_value;
use mixlite_core::{
    Client, ClientBuilder, Config, DrainOutcome, NativeContext, Properties, Transaction,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mixlite")]
#[command(about = "Offline-first analytics client")]
#[command(version)]
struct Args {
    /// Verbose output (writes the log file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Treat the network as unavailable; everything stays queued
    #[arg(long, global = true)]
    offline: bool,

    /// Project token (overrides client.token from config)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration and queue status
    Status,

    /// Track an event and try to deliver it
    Track {
        /// Event name
        event: String,

        /// Event properties as a JSON object
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Switch to a known identity (emits $identify)
    Identify {
        /// User id in your system
        id: String,
    },

    /// Set profile properties for the current identity
    Set {
        /// Profile properties as a JSON object
        #[arg(short, long)]
        data: String,
    },

    /// List pending transactions, oldest first
    Pending {
        /// Print the raw persisted JSON
        #[arg(long)]
        json: bool,
    },

    /// Deliver pending transactions now
    Flush,

    /// Drop every pending transaction
    Clear,

    /// Keep running and deliver the backlog whenever connectivity returns
    Watch {
        /// Connectivity poll interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },
}

/// Everything a command needs.
struct Host {
    config: Config,
    token: Option<String>,
    offline: bool,
    client: Client,
    environment: Arc<NativeContext>,
    runtime: tokio::runtime::Runtime,
}

impl Host {
    fn new(config: Config, args: &Args) -> Result<Self> {
        let environment = Arc::new(NativeContext::new().with_online(!args.offline));

        let client = ClientBuilder::from_config(&config)
            .context("failed to open queue store")?
            .environment(environment.clone())
            .build()
            .context("failed to create client")?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to create runtime")?;

        let token = args
            .token
            .clone()
            .or_else(|| config.client.token.clone())
            .filter(|t| !t.trim().is_empty());

        Ok(Self {
            config,
            token,
            offline: args.offline,
            client,
            environment,
            runtime,
        })
    }

    /// Init the client with the configured token, failing without one.
    fn init(&self) -> Result<()> {
        let Some(token) = self.token.as_deref() else {
            bail!("no project token: pass --token or set client.token in config.toml");
        };
        self.client.init(token, self.config.client.init_options());
        if self.client.is_muted() {
            println!("Client is muted (client.mute = true); nothing will be recorded.");
        }
        Ok(())
    }

    fn flush(&self) -> Option<DrainOutcome> {
        self.runtime.block_on(self.client.flush())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    // Keep the guard alive for the whole run
    let _log_guard = if args.verbose {
        Some(mixlite_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    let host = Host::new(config, &args)?;
    tracing::info!(command = command_name(&args.command), "mixlite starting");

    match args.command {
        Command::Status => cmd_status(&host),
        Command::Track { event, data } => cmd_track(&host, &event, data.as_deref()),
        Command::Identify { id } => cmd_identify(&host, &id),
        Command::Set { data } => cmd_set(&host, &data),
        Command::Pending { json } => cmd_pending(&host, json),
        Command::Flush => cmd_flush(&host),
        Command::Clear => cmd_clear(&host),
        Command::Watch { interval } => watch::run(&host, Duration::from_secs(interval.max(1))),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Status => "status",
        Command::Track { .. } => "track",
        Command::Identify { .. } => "identify",
        Command::Set { .. } => "set",
        Command::Pending { .. } => "pending",
        Command::Flush => "flush",
        Command::Clear => "clear",
        Command::Watch { .. } => "watch",
    }
}

fn cmd_status(host: &Host) -> Result<()> {
    let client_config = &host.config.client;

    println!("mixlite Configuration");
    println!("=====================");
    println!();
    println!(
        "Token:           {}",
        if host.token.is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    println!("Muted:           {}", client_config.mute);
    println!("Tracking URL:    {}", client_config.tracking_url);
    println!("Engage URL:      {}", client_config.engage_url);
    println!("Queue Capacity:  {}", client_config.queue_capacity);
    println!("Re-drain Delay:  {}ms", client_config.redrain_delay_ms);
    println!("Timeout:         {}s", client_config.request_timeout_secs);
    println!();
    println!(
        "Store:           {}",
        host.config.resolved_store_path().display()
    );
    println!("Config:          {}", Config::config_path().display());
    println!("Log:             {}", Config::log_path().display());
    println!();
    println!("Pending:         {}", host.client.pending().len());

    Ok(())
}

fn cmd_track(host: &Host, event: &str, data: Option<&str>) -> Result<()> {
    let data = data.map(parse_properties).transpose()?;
    host.init()?;

    host.client.track(event, data);
    report(host, host.flush());
    Ok(())
}

fn cmd_identify(host: &Host, id: &str) -> Result<()> {
    host.init()?;
    host.client.identify(id);
    println!("Identified as {}", id);
    report(host, host.flush());
    Ok(())
}

fn cmd_set(host: &Host, data: &str) -> Result<()> {
    let data = parse_properties(data)?;
    host.init()?;
    host.client.people().set(data);
    report(host, host.flush());
    Ok(())
}

fn cmd_pending(host: &Host, json: bool) -> Result<()> {
    let pending = host.client.pending();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&pending).context("failed to encode queue")?
        );
        return Ok(());
    }

    if pending.is_empty() {
        println!("No pending transactions.");
        return Ok(());
    }

    println!("Pending transactions: {}", pending.len());
    println!();
    for transaction in &pending {
        println!("  {}", describe(transaction));
    }
    Ok(())
}

fn cmd_flush(host: &Host) -> Result<()> {
    let pending = host.client.pending().len();
    if pending == 0 {
        println!("Nothing to flush.");
        return Ok(());
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid progress template")?,
    );
    pb.set_message(format!("Delivering {} transaction(s)...", pending));
    pb.enable_steady_tick(Duration::from_millis(100));

    let outcome = host.flush();
    pb.finish_and_clear();

    report(host, outcome);
    Ok(())
}

fn cmd_clear(host: &Host) -> Result<()> {
    let pending = host.client.pending().len();
    host.client.clear_pending();
    println!("Cleared {} pending transaction(s).", pending);
    Ok(())
}

fn parse_properties(raw: &str) -> Result<Properties> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--data is not valid JSON")?;
    properties_from_value(value).context("--data must be a JSON object")
}

fn describe(transaction: &Transaction) -> String {
    match transaction.event_name() {
        Some(event) => format!("{}  event    {}", transaction.id, event),
        None => format!(
            "{}  profile  {}",
            transaction.id,
            transaction
                .properties()
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn report(host: &Host, outcome: Option<DrainOutcome>) {
    let pending = host.client.pending().len();
    match outcome {
        None => println!("Client is muted; nothing sent."),
        Some(DrainOutcome::Offline) => {
            println!("Offline: {} transaction(s) remain queued.", pending)
        }
        Some(DrainOutcome::Deferred) => {
            println!("Delivery in progress: {} transaction(s) pending.", pending)
        }
        Some(DrainOutcome::Completed(report)) => {
            println!(
                "Delivered: {}  Failed: {}  Pending: {}",
                report.delivered, report.failed, pending
            );
            tracing::info!(
                delivered = report.delivered,
                failed = report.failed,
                pending,
                "Flush complete"
            );
        }
    }
}
