//! Sentinel Range Keeper
//!
//! Long-running keeper: sweeps every configured pool on a fixed interval and
//! drains event-queued pools as soon as the hook reports a tick crossing or
//! a new pool.
//!
//! Architecture:
//! - One alloy provider with the keeper wallet for reads and `maintain()`
//! - Interval timer → `run_cycle` (drain + sweep), spawned per tick
//! - Work-queue notify → `run_drain`, spawned per wake-up
//! - Overlapping triggers are dropped by the coordinator's single-flight guard
//! - Optional WS log subscription feeding the work queue, best effort
//! - SIGINT/SIGTERM stop new work and wait for the in-flight cycle

use anyhow::{Context, Result};
use alloy::network::EthereumWallet;
use alloy::providers::ProviderBuilder;
use clap::Parser;
use futures::StreamExt;
use sentinel_keeper::clock::{Clock, SystemClock};
use sentinel_keeper::config::{load_env, AgentConfig};
use sentinel_keeper::listener::run_event_listener;
use sentinel_keeper::{CycleReport, ExecutionCoordinator, SentinelClient, WorkQueue};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Sentinel range keeper
#[derive(Parser)]
#[command(name = "sentinel-keeper")]
struct Args {
    /// Env file to load before reading configuration (default: .env if present)
    #[arg(long, env = "ENV_FILE")]
    env_file: Option<String>,

    /// Run one full cycle and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        fmt().with_env_filter(filter).with_target(false).json().init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    load_env(args.env_file.as_deref())?;
    init_tracing();

    let config = AgentConfig::from_env().context("Invalid configuration")?;

    let signer = config.signer.clone().context("PRIVATE_KEY not set")?;
    let wallet = EthereumWallet::from(signer.clone());
    let provider = ProviderBuilder::new()
        .wallet(wallet)
        .connect(&config.rpc_url)
        .await
        .context("Failed to connect to RPC_URL")?;
    let client = Arc::new(SentinelClient::new(
        provider,
        config.hook_address,
        config.pool_manager_address,
        config.rpc_timeout,
    ));

    info!(
        wallet = %signer.address(),
        hook = %config.hook_address,
        pool_manager = %config.pool_manager_address,
        pools = config.pools.len(),
        interval_secs = config.check_interval.as_secs(),
        dry_run = config.dry_run,
        "sentinel keeper starting"
    );

    let queue = WorkQueue::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let coordinator = Arc::new(ExecutionCoordinator::new(
        client,
        config.pools.clone(),
        queue.clone(),
        Arc::clone(&clock),
        config.coordinator_settings(),
    ));

    if args.once {
        if let CycleReport::Completed(summary) = coordinator.run_cycle().await {
            info!(
                rebalanced = summary.rebalanced(),
                failed = summary.failed(),
                "single cycle finished"
            );
        }
        return Ok(());
    }

    match (config.enable_event_listener, config.event_ws_url()) {
        (true, Some(ws_url)) => {
            tokio::spawn(run_event_listener(
                ws_url.to_string(),
                config.hook_address,
                queue.clone(),
                Arc::clone(&clock),
            ));
        }
        (true, None) => warn!("event listener enabled but no WebSocket endpoint configured; sweeps only"),
        (false, _) => info!("event listener disabled; sweeps only"),
    }

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    let signals_handle = signals.handle();

    let mut timer = tokio::time::interval(config.check_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = IntervalStream::new(timer);

    let mut cycles = JoinSet::new();
    loop {
        tokio::select! {
            Some(_) = ticks.next() => {
                let coordinator = Arc::clone(&coordinator);
                cycles.spawn(async move { coordinator.run_cycle().await });
            }
            _ = queue.notified() => {
                let coordinator = Arc::clone(&coordinator);
                cycles.spawn(async move { coordinator.run_drain().await });
            }
            Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                if let Err(e) = joined {
                    error!("cycle task failed: {}", e);
                }
            }
            sig = signals.next() => {
                info!(signal = ?sig, "shutdown requested");
                break;
            }
        }
    }

    signals_handle.close();
    while let Some(joined) = cycles.join_next().await {
        if let Err(e) = joined {
            error!("cycle task failed during shutdown: {}", e);
        }
    }
    info!("sentinel keeper stopped");
    Ok(())
}
