//! One-shot rebalance check
//!
//! Evaluates a single pool once and prints the result as JSON on stdout,
//! for automation networks that run the check serverlessly and execute the
//! returned call themselves. Logs go to stderr.
//!
//! Usage:
//!   rebalance-check --pool-id 0x... [--format executor|range] [--simulate]
//!
//! Connection settings (RPC_URL, HOOK_ADDRESS, POOL_MANAGER_ADDRESS,
//! POOLS/POOLS_FILE) come from the same environment as the keeper;
//! PRIVATE_KEY is not needed. A pool id missing from the pool list is evaluated with
//! the default tunables.

use anyhow::{Context, Result};
use alloy::providers::ProviderBuilder;
use clap::{Parser, ValueEnum};
use sentinel_keeper::config::{load_env, AgentConfig};
use sentinel_keeper::oneshot::{evaluate_once, ExecutorPayload, RangeAnswer};
use sentinel_keeper::types::{PoolEntry, PoolId, PoolIdentity};
use sentinel_keeper::SentinelClient;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// `{canExec, callData, message}`
    Executor,
    /// `{newLower, newUpper, volatilityBps}`
    Range,
}

#[derive(Parser)]
#[command(name = "rebalance-check")]
struct Args {
    /// Pool id (bytes32 hex)
    #[arg(long)]
    pool_id: String,

    /// Output shape
    #[arg(long, value_enum, default_value = "executor")]
    format: OutputFormat,

    /// Report a rebalance without marking it executable
    #[arg(long)]
    simulate: bool,

    /// Env file to load before reading configuration
    #[arg(long, env = "ENV_FILE")]
    env_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    load_env(args.env_file.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = AgentConfig::read_only_from_env().context("Invalid configuration")?;
    let pool_id: PoolId = args
        .pool_id
        .parse()
        .with_context(|| format!("invalid --pool-id: {}", args.pool_id))?;
    let entry = config
        .pools
        .iter()
        .find(|p| p.identity.id == pool_id)
        .cloned()
        .unwrap_or_else(|| PoolEntry {
            identity: PoolIdentity::discovered(pool_id),
            config: config.default_pool_config(),
        });

    // Read-only: no wallet needed
    let provider = ProviderBuilder::new()
        .connect(&config.rpc_url)
        .await
        .context("Failed to connect to RPC_URL")?;
    let client = Arc::new(SentinelClient::new(
        provider,
        config.hook_address,
        config.pool_manager_address,
        config.rpc_timeout,
    ));

    let evaluation = evaluate_once(client, &entry, &config.decision_limits()).await;
    info!(pool = %entry.identity.label, ?evaluation, "evaluated");

    let output = match args.format {
        OutputFormat::Executor => serde_json::to_string(&ExecutorPayload::from_evaluation(
            config.hook_address,
            &entry,
            &evaluation,
            args.simulate || config.dry_run,
        ))?,
        OutputFormat::Range => serde_json::to_string(&RangeAnswer::from_evaluation(&evaluation))?,
    };
    println!("{}", output);
    Ok(())
}
