use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use uuid::Uuid;

use waf_sync::config::{ConfigLoader, ConfigOverrides};
use waf_sync::logging::{init_logging, LogConfig};
use waf_sync::{Event, LogQuery, Monitor, Stats, WafApi};

#[derive(Parser)]
#[command(name = "waf-sync", version, about = "Follow and administer a WAF from the terminal")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "WAF_SYNC_CONFIG")]
    config: Option<String>,

    /// API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Live feed base URL
    #[arg(long)]
    ws_url: Option<String>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the live event feed; type `p` + Enter to pause or resume
    Watch {
        /// Start paused
        #[arg(long)]
        paused: bool,
    },
    /// Show aggregate statistics
    Stats {
        /// Keep refreshing on the poll interval
        #[arg(long)]
        follow: bool,
    },
    /// Page through event history
    Logs {
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Detection rules
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
    /// Blocked addresses
    Blocked {
        #[command(subcommand)]
        action: BlockedCommand,
    },
    /// Check service health and readiness
    Health,
}

#[derive(Subcommand)]
enum RulesCommand {
    List,
    Toggle { id: Uuid },
}

#[derive(Subcommand)]
enum BlockedCommand {
    List,
    Unblock { ip: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load_from_file(cli.config.as_deref())
        .load_from_env()
        .with_overrides(ConfigOverrides {
            api_url: cli.api_url,
            ws_url: cli.ws_url,
            log_level: cli.log_level,
        })
        .build()?;

    let _log_guard = init_logging(&LogConfig::from_settings(&config.logging))?;

    let mut monitor = Monitor::new(config).context("Failed to create monitor session")?;
    info!(api = %monitor.client().base_url(), "waf-sync started");

    match cli.command {
        Command::Watch { paused } => watch(&mut monitor, paused).await?,
        Command::Stats { follow } => stats(&mut monitor, follow).await?,
        Command::Logs { limit, offset } => {
            let events = monitor
                .client()
                .get_logs(LogQuery::new(limit, offset))
                .await?;
            for event in &events {
                println!("{}", format_event(event));
            }
        }
        Command::Rules { action } => rules(&monitor, action).await?,
        Command::Blocked { action } => blocked(&monitor, action).await?,
        Command::Health => {
            let health = monitor.client().health().await?;
            println!("{}: {}", health.service, health.status);
            let ready = monitor.client().ready().await?;
            println!(
                "ready: {} (db {}, redis {})",
                ready.is_ready(),
                ready.db,
                ready.redis
            );
        }
    }

    monitor.shutdown().await;
    Ok(())
}

async fn watch(monitor: &mut Monitor, paused: bool) -> Result<()> {
    let stream = monitor.start_stream()?;
    stream.set_paused(paused);

    let mut events = stream.subscribe_events();
    let mut state = stream.subscribe_state();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_seen: Option<Uuid> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
                let buffer = events.borrow_and_update().clone();
                let fresh: Vec<&Event> = buffer
                    .iter()
                    .take_while(|event| Some(event.id) != last_seen)
                    .collect();
                for event in fresh.iter().rev() {
                    println!("{}", format_event(event));
                }
                if let Some(newest) = buffer.newest() {
                    last_seen = Some(newest.id);
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                eprintln!("-- live feed {current}");
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(input)) if input.trim() == "p" => {
                    let now_paused = !stream.is_paused();
                    stream.set_paused(now_paused);
                    eprintln!("-- {}", if now_paused { "paused" } else { "resumed" });
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }

    let feed = stream.stats();
    info!(
        accepted = feed.accepted,
        dropped_while_paused = feed.dropped_while_paused,
        discarded = feed.discarded,
        connect_attempts = feed.connect_attempts,
        "live feed summary"
    );
    Ok(())
}

async fn stats(monitor: &mut Monitor, follow: bool) -> Result<()> {
    if let Err(e) = monitor.start_poller().await {
        if !follow {
            return Err(e.into());
        }
        eprintln!("-- initial stats fetch failed, retrying on schedule: {e}");
    }
    let Some(poller) = monitor.poller() else {
        return Ok(());
    };
    if let Some(snapshot) = poller.snapshot() {
        print_stats(&snapshot);
    }
    if !follow {
        return Ok(());
    }

    let mut updates = poller.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(snapshot) = updates.borrow_and_update().clone() {
                    print_stats(&snapshot);
                }
            }
        }
    }
    Ok(())
}

async fn rules(monitor: &Monitor, action: RulesCommand) -> Result<()> {
    let mutations = monitor.mutations();
    match action {
        RulesCommand::List => {
            mutations.load_rules().await?;
            for rule in mutations.rules().await {
                println!(
                    "{} {:<5} {:<6} +{:<3} {:<6} {}",
                    rule.id,
                    if rule.enabled { "on" } else { "off" },
                    rule.kind,
                    rule.score,
                    rule.action,
                    rule.name
                );
            }
        }
        RulesCommand::Toggle { id } => {
            let rule = mutations.toggle_rule(id).await?;
            println!(
                "{} is now {}",
                rule.name,
                if rule.enabled { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}

async fn blocked(monitor: &Monitor, action: BlockedCommand) -> Result<()> {
    let mutations = monitor.mutations();
    match action {
        BlockedCommand::List => {
            mutations.load_blocked_ips().await?;
            for entry in mutations.blocked_ips().await {
                let expires = entry
                    .expires_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "permanent".to_string());
                println!(
                    "{:<39} {:<25} {}",
                    entry.ip_address,
                    expires,
                    entry.reason.as_deref().unwrap_or("-")
                );
            }
        }
        BlockedCommand::Unblock { ip } => {
            let confirmation = mutations.unblock(&ip).await?;
            println!("{}", confirmation.message);
        }
    }
    Ok(())
}

fn format_event(event: &Event) -> String {
    let when = event
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{when} {:<10} {:>3} {:<39} {:<6} {} [{}]",
        event.action_taken.to_string(),
        event.threat_score,
        event.ip_address,
        event.method,
        event.endpoint,
        event.threat_types.join(",")
    )
}

fn print_stats(stats: &Stats) {
    println!(
        "total {}  blocked {}  allowed {}  rate-limited {}",
        stats.total_requests,
        stats.blocked_requests,
        stats.allowed_requests,
        stats.rate_limited_requests()
    );
    for top in &stats.top_ips {
        println!("  {:<39} {}", top.ip, top.count);
    }
}
