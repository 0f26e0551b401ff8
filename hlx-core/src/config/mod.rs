//! Runtime configuration: one flat `Config` loaded once at process start from
//! environment variables (an optional `.env` is loaded first via `dotenv`,
//! for local/dev use), validated eagerly so a bad value fails the process
//! before any component starts rather than surfacing later as a confusing
//! runtime error.
//!
//! No compile-time-feature tier for strategy/risk parameters: this crate
//! has no hot-path strategy parameters to const-propagate, only
//! execution-path configuration an operator needs to change without a
//! rebuild.

use crate::estimators::RepPoint;
use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_var(key) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "false" | "FALSE" | "False" => Ok(false),
            other => bail!("{} must be a boolean (1/0/true/false), got {:?}", key, other),
        },
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env_var(key) {
        None => Ok(default),
        Some(v) => v.parse().with_context(|| format!("{} must be a non-negative integer, got {:?}", key, v)),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match env_var(key) {
        None => Ok(default),
        Some(v) => v.parse().with_context(|| format!("{} must be a non-negative integer, got {:?}", key, v)),
    }
}

/// Process-lifetime, immutable-after-load configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub signer_adapter_url: String,
    pub hl_mainnet: bool,
    pub signer_timeout_ms: u64,
    pub signer_max_retries: u32,
    pub signer_retry_delay_ms: u64,
    pub dry_run: bool,
    pub mode: String,
    pub test_mode: bool,
    pub live_enabled_coins: Vec<String>,
    pub agent_address: String,
    pub asset_ids: std::collections::HashMap<String, u32>,

    pub log_level: String,
    pub json_logs: bool,
    pub state_file_path: String,
    pub event_log_path: String,
    pub metrics_listen_addr: String,
    pub executor_listen_addr: String,
    pub exchange_send_timeout_ms: u64,
    pub partial_lock_ttl_ms: u64,
    pub sr_rep_point: RepPoint,
}

impl Config {
    /// Loads an optional `.env`, then reads and validates every setting.
    /// Fails fast with a descriptive error on the first invalid value.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let hl_mainnet = env_bool("HL_MAINNET", true)?;
        let dry_run = env_bool("DRY_RUN", false)?;
        let test_mode = env_bool("TEST_MODE", false)?;
        let mode = env_or("MODE", "test");

        let signer_timeout_ms = env_u64("SIGNER_TIMEOUT_MS", 2500)?;
        let signer_max_retries = env_u32("SIGNER_MAX_RETRIES", 3)?;
        let signer_retry_delay_ms = env_u64("SIGNER_RETRY_DELAY_MS", 250)?;
        let exchange_send_timeout_ms = env_u64("EXCHANGE_SEND_TIMEOUT_MS", 4000)?;
        let partial_lock_ttl_ms = env_u64("PARTIAL_LOCK_TTL_MS", 30_000)?;

        let live_enabled_coins: Vec<String> = env_var("LIVE_ENABLED_COINS")
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let agent_address = env_or("AGENT_ADDRESS", "");

        let asset_ids = match env_var("ASSET_IDS") {
            None => std::collections::HashMap::new(),
            Some(raw) => {
                let mut map = std::collections::HashMap::new();
                for entry in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
                    let (symbol, id) = entry
                        .split_once(':')
                        .with_context(|| format!("ASSET_IDS entry {:?} must be SYMBOL:id", entry))?;
                    let id: u32 = id
                        .trim()
                        .parse()
                        .with_context(|| format!("ASSET_IDS entry {:?} has a non-numeric id", entry))?;
                    map.insert(symbol.trim().to_string(), id);
                }
                map
            }
        };

        let log_level = env_or("LOG_LEVEL", "info");
        let json_logs = env_bool("JSON_LOGS", false)?;

        let sr_rep_point_raw = env_or("SR_REP_POINT", "max_thickness");
        let sr_rep_point = match sr_rep_point_raw.as_str() {
            "max_thickness" => RepPoint::MaxThickness,
            "weighted_avg" => RepPoint::WeightedAvg,
            other => bail!("SR_REP_POINT must be 'max_thickness' or 'weighted_avg', got {:?}", other),
        };

        let config = Self {
            signer_adapter_url: env_or("SIGNER_ADAPTER_URL", "http://localhost:8000"),
            hl_mainnet,
            signer_timeout_ms,
            signer_max_retries,
            signer_retry_delay_ms,
            dry_run,
            mode,
            test_mode,
            live_enabled_coins,
            agent_address,
            asset_ids,
            log_level,
            json_logs,
            state_file_path: env_or("STATE_FILE_PATH", "./hlx_state.json"),
            event_log_path: env_or("EVENT_LOG_PATH", "./hlx_events.jsonl"),
            metrics_listen_addr: env_or("METRICS_LISTEN_ADDR", "127.0.0.1:9090"),
            executor_listen_addr: env_or("EXECUTOR_LISTEN_ADDR", "127.0.0.1:9091"),
            exchange_send_timeout_ms,
            partial_lock_ttl_ms,
            sr_rep_point,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode != "live" && self.mode != "test" {
            bail!("MODE must be 'live' or 'test', got {:?}", self.mode);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            bail!("LOG_LEVEL must be one of {:?}, got {:?}", valid_log_levels, self.log_level);
        }

        if self.mode == "live" && self.live_enabled_coins.is_empty() {
            bail!("LIVE_ENABLED_COINS must be non-empty when MODE=live");
        }

        if self.mode == "live" && self.agent_address.trim().is_empty() {
            bail!("AGENT_ADDRESS must be set when MODE=live");
        }

        if self.mode == "live" {
            for coin in &self.live_enabled_coins {
                if !self.asset_ids.contains_key(coin) {
                    bail!("ASSET_IDS is missing an entry for enabled coin {:?}", coin);
                }
            }
        }

        if self.signer_timeout_ms == 0 {
            bail!("SIGNER_TIMEOUT_MS must be positive");
        }
        if self.exchange_send_timeout_ms == 0 {
            bail!("EXCHANGE_SEND_TIMEOUT_MS must be positive");
        }
        if self.signer_max_retries == 0 {
            bail!("SIGNER_MAX_RETRIES must be at least 1");
        }

        self.metrics_listen_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("METRICS_LISTEN_ADDR is not a valid socket address: {:?}", self.metrics_listen_addr))?;
        self.executor_listen_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("EXECUTOR_LISTEN_ADDR is not a valid socket address: {:?}", self.executor_listen_addr))?;

        Ok(())
    }

    pub fn signer_timeout(&self) -> Duration {
        Duration::from_millis(self.signer_timeout_ms)
    }

    pub fn exchange_send_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_send_timeout_ms)
    }

    pub fn hl_exchange_url(&self) -> &'static str {
        if self.hl_mainnet {
            "https://api.hyperliquid.xyz/exchange"
        } else {
            "https://api.hyperliquid-testnet.xyz/exchange"
        }
    }
}
