//! Configuration management
//! Load keeper settings from the environment (and an optional .env file)
//!
//! Pools come from either `POOLS` (JSON array) or `POOLS_FILE` (TOML with
//! `[[pool]]` tables). Per-pool fields that are left out fall back to the
//! process-wide defaults. Anything missing or malformed is an error here,
//! before the engine starts.

use crate::pool::MAX_TICK;
use crate::rebalance::{CoordinatorSettings, DecisionLimits};
use crate::types::{PoolConfig, PoolEntry, PoolId, PoolIdentity};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CHECK_INTERVAL_SEC: u64 = 60;
pub const DEFAULT_TICK_WIDTH: i32 = 600;
pub const DEFAULT_EDGE_BPS: u32 = 2_000;
pub const DEFAULT_MAX_SLIPPAGE_BPS: u32 = 300;
pub const DEFAULT_COOLDOWN_SEC: u64 = 120;
pub const DEFAULT_MAX_REBALANCES_PER_HOUR: u32 = 6;
pub const DEFAULT_TICK_HISTORY_SIZE: usize = 48;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 15_000;

/// Everything the keeper binaries need, validated.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub rpc_url: String,
    pub ws_rpc_url: Option<String>,
    /// Always set for the keeper; optional for read-only tools.
    pub signer: Option<PrivateKeySigner>,
    pub hook_address: Address,
    pub pool_manager_address: Address,
    pub pools: Vec<PoolEntry>,

    pub dry_run: bool,
    pub check_interval: Duration,
    pub default_tick_width: i32,
    pub default_edge_bps: u32,
    pub max_slippage_bps: u32,
    pub cooldown_secs: u64,
    pub max_rebalances_per_hour: u32,
    pub tick_history_size: usize,
    pub enable_event_listener: bool,

    pub min_active_liquidity: u128,
    pub min_total_shares: U256,
    pub max_deviation_bps_override: Option<U256>,
    pub rpc_timeout: Duration,
}

/// One pool as written in `POOLS` / `POOLS_FILE`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "default_tick_width")]
    pub default_tick_width: Option<i32>,
    #[serde(default, alias = "edge_bps")]
    pub edge_bps: Option<u32>,
    #[serde(default, alias = "max_slippage_bps")]
    pub max_slippage_bps: Option<u32>,
    #[serde(default, alias = "tick_spacing")]
    pub tick_spacing: Option<i32>,
    #[serde(default, alias = "quote_feed")]
    pub quote_feed: Option<Address>,
}

/// `POOLS_FILE` layout.
#[derive(Debug, Deserialize)]
struct PoolsFile {
    #[serde(rename = "pool", default)]
    pools: Vec<PoolSpec>,
}

impl AgentConfig {
    /// Builds the keeper config from any key lookup. `from_env` passes the
    /// process environment; tests pass a map. `PRIVATE_KEY` is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(lookup, true)
    }

    /// Same as `from_lookup`, but `PRIVATE_KEY` may be absent. A key that
    /// is present must still be valid.
    pub fn read_only_from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(lookup, false)
    }

    fn build<F>(lookup: F, require_signer: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_url = get("RPC_URL").context("RPC_URL not set")?;
        let signer = match get("PRIVATE_KEY") {
            Some(key) => Some(PrivateKeySigner::from_str(&key).context("PRIVATE_KEY is not a valid key")?),
            None if require_signer => bail!("PRIVATE_KEY not set"),
            None => None,
        };
        let hook_address = parse_address(get("HOOK_ADDRESS"), "HOOK_ADDRESS")?;
        let pool_manager_address = parse_address(get("POOL_MANAGER_ADDRESS"), "POOL_MANAGER_ADDRESS")?;

        let default_tick_width = parse_or(get("DEFAULT_TICK_WIDTH"), "DEFAULT_TICK_WIDTH", DEFAULT_TICK_WIDTH)?;
        let default_edge_bps = parse_or(get("DEFAULT_EDGE_BPS"), "DEFAULT_EDGE_BPS", DEFAULT_EDGE_BPS)?;
        let max_slippage_bps = parse_or(get("MAX_SLIPPAGE_BPS"), "MAX_SLIPPAGE_BPS", DEFAULT_MAX_SLIPPAGE_BPS)?;
        if !valid_half_width(default_tick_width) {
            bail!("DEFAULT_TICK_WIDTH must be in 1..={}, got {}", MAX_TICK, default_tick_width);
        }

        let specs = match (get("POOLS"), get("POOLS_FILE")) {
            (Some(json), _) => parse_pools_json(&json)?,
            (None, Some(path)) => load_pools_file(&path)?,
            (None, None) => bail!("POOLS or POOLS_FILE must be set"),
        };
        let defaults = PoolConfig {
            half_width: default_tick_width,
            edge_bps: default_edge_bps,
            max_slippage_bps,
            tick_spacing_override: None,
            quote_feed: None,
        };
        let pools = build_pools(specs, &defaults)?;

        let check_interval_sec = parse_or(get("CHECK_INTERVAL_SEC"), "CHECK_INTERVAL_SEC", DEFAULT_CHECK_INTERVAL_SEC)?;
        if check_interval_sec == 0 {
            bail!("CHECK_INTERVAL_SEC must be positive");
        }
        let tick_history_size = parse_or(get("TICK_HISTORY_SIZE"), "TICK_HISTORY_SIZE", DEFAULT_TICK_HISTORY_SIZE)?;
        if tick_history_size == 0 {
            bail!("TICK_HISTORY_SIZE must be positive");
        }

        Ok(Self {
            rpc_url,
            ws_rpc_url: get("WS_RPC_URL"),
            signer,
            hook_address,
            pool_manager_address,
            pools,
            dry_run: parse_bool(get("DRY_RUN"), "DRY_RUN", false)?,
            check_interval: Duration::from_secs(check_interval_sec),
            default_tick_width,
            default_edge_bps,
            max_slippage_bps,
            cooldown_secs: parse_or(get("REBALANCE_COOLDOWN_SEC"), "REBALANCE_COOLDOWN_SEC", DEFAULT_COOLDOWN_SEC)?,
            max_rebalances_per_hour: parse_or(
                get("MAX_REBALANCES_PER_HOUR"),
                "MAX_REBALANCES_PER_HOUR",
                DEFAULT_MAX_REBALANCES_PER_HOUR,
            )?,
            tick_history_size,
            enable_event_listener: parse_bool(get("ENABLE_EVENT_LISTENER"), "ENABLE_EVENT_LISTENER", true)?,
            min_active_liquidity: parse_or(get("MIN_ACTIVE_LIQUIDITY"), "MIN_ACTIVE_LIQUIDITY", 0u128)?,
            min_total_shares: parse_or(get("MIN_TOTAL_SHARES"), "MIN_TOTAL_SHARES", U256::ZERO)?,
            max_deviation_bps_override: get("MAX_DEVIATION_BPS_OVERRIDE")
                .map(|v| parse_value::<U256>(&v, "MAX_DEVIATION_BPS_OVERRIDE"))
                .transpose()?,
            rpc_timeout: Duration::from_millis(parse_or(get("RPC_TIMEOUT_MS"), "RPC_TIMEOUT_MS", DEFAULT_RPC_TIMEOUT_MS)?),
        })
    }

    /// Reads the process environment as it is now.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read-only variant of `from_env`, for tools that never sign.
    pub fn read_only_from_env() -> Result<Self> {
        Self::read_only_from_lookup(|key| std::env::var(key).ok())
    }

    /// Tunables for pools that were not configured explicitly.
    pub fn default_pool_config(&self) -> PoolConfig {
        PoolConfig {
            half_width: self.default_tick_width,
            edge_bps: self.default_edge_bps,
            max_slippage_bps: self.max_slippage_bps,
            tick_spacing_override: None,
            quote_feed: None,
        }
    }

    pub fn decision_limits(&self) -> DecisionLimits {
        DecisionLimits {
            min_liquidity: self.min_active_liquidity,
            min_shares: self.min_total_shares,
            max_deviation_override: self.max_deviation_bps_override,
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            dry_run: self.dry_run,
            cooldown_secs: self.cooldown_secs,
            max_rebalances_per_hour: self.max_rebalances_per_hour,
            history_size: self.tick_history_size,
            limits: self.decision_limits(),
            default_pool_config: self.default_pool_config(),
        }
    }

    /// WebSocket endpoint for the event listener: `WS_RPC_URL`, else
    /// `RPC_URL` when it is itself a WebSocket URL.
    pub fn event_ws_url(&self) -> Option<&str> {
        self.ws_rpc_url.as_deref().or_else(|| {
            let url = self.rpc_url.as_str();
            (url.starts_with("ws://") || url.starts_with("wss://")).then_some(url)
        })
    }

    pub fn wallet_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|signer| signer.address())
    }
}

/// Loads `env_file` (or `.env` if present) into the process environment.
/// Variables already set are not overridden.
pub fn load_env(env_file: Option<&str>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenv::from_filename(path).with_context(|| format!("Failed to load env file: {}", path))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
    Ok(())
}

fn parse_value<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} is invalid ({:?}): {}", key, raw, e))
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, key: &str, default: bool) -> Result<bool> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => bail!("{} is not a boolean: {:?}", key, raw),
    }
}

fn parse_address(raw: Option<String>, key: &str) -> Result<Address> {
    let raw = raw.with_context(|| format!("{} not set", key))?;
    parse_value(&raw, key)
}

/// Parses the `POOLS` JSON array.
pub fn parse_pools_json(json: &str) -> Result<Vec<PoolSpec>> {
    serde_json::from_str(json).context("POOLS is not a valid JSON pool list")
}

/// Reads `[[pool]]` tables from a TOML file.
pub fn load_pools_file<P: AsRef<Path>>(path: P) -> Result<Vec<PoolSpec>> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read pools file: {}", path.as_ref().display()))?;
    parse_pools_toml(&content)
}

pub fn parse_pools_toml(content: &str) -> Result<Vec<PoolSpec>> {
    let file: PoolsFile = toml::from_str(content).context("Failed to parse pools TOML")?;
    Ok(file.pools)
}

fn valid_half_width(half_width: i32) -> bool {
    (1..=MAX_TICK).contains(&half_width)
}

/// Resolves specs against the defaults. Rejects an empty list, bad ids and
/// duplicates.
pub fn build_pools(specs: Vec<PoolSpec>, defaults: &PoolConfig) -> Result<Vec<PoolEntry>> {
    if specs.is_empty() {
        bail!("pool list is empty");
    }

    let mut pools: Vec<PoolEntry> = Vec::with_capacity(specs.len());
    for spec in specs {
        let id = PoolId::from_str(&spec.id).with_context(|| format!("invalid pool id: {}", spec.id))?;
        if pools.iter().any(|p| p.identity.id == id) {
            bail!("duplicate pool id: {}", id);
        }
        let half_width = spec.default_tick_width.unwrap_or(defaults.half_width);
        if !valid_half_width(half_width) {
            bail!("pool {}: defaultTickWidth must be in 1..={}, got {}", id, MAX_TICK, half_width);
        }
        let tick_spacing_override = spec.tick_spacing.filter(|s| *s != 0);
        if let Some(spacing) = tick_spacing_override {
            if !(1..=MAX_TICK).contains(&spacing) {
                bail!("pool {}: tickSpacing must be in 1..={}, got {}", id, MAX_TICK, spacing);
            }
        }
        let label = spec.name.unwrap_or_else(|| id.to_string());
        pools.push(PoolEntry {
            identity: PoolIdentity::new(id, label),
            config: PoolConfig {
                half_width,
                edge_bps: spec.edge_bps.unwrap_or(defaults.edge_bps),
                max_slippage_bps: spec.max_slippage_bps.unwrap_or(defaults.max_slippage_bps),
                tick_spacing_override,
                quote_feed: spec.quote_feed,
            },
        });
    }
    Ok(pools)
}
