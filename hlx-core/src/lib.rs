//! hlx-core - execution core for an automated perpetual-futures trading bot
//!
//! Owns the build -> sign -> send -> confirm order pipeline against
//! Hyperliquid: a persistent nonce/idempotency/partial-lock store, a
//! process-wide Safety Supervisor that can halt live trading, two
//! streaming market estimators (trend channel, support/resistance bands),
//! and the Coordinator that wires them together behind one `handle` call.
//!
//! ## Modules
//! - `core`: the shared error taxonomy.
//! - `order`: order domain types and the HL-Action wire encoder.
//! - `store`: the persistent nonce/idempotency/partial-lock actor.
//! - `safety`: the live/halted Safety Supervisor.
//! - `logger`: the append-only JSONL domain event sink.
//! - `estimators`: the LRC trend channel and SR band aggregator.
//! - `signer`: the signer-adapter HTTP client.
//! - `sender`: the exchange HTTP client.
//! - `confirm`: response classification into a terminal `OrderResult`.
//! - `coordinator`: the top-level `handle(payload, ctx) -> OrderResult`.
//! - `config`: runtime configuration loaded from the environment.
//! - `monitoring`: Prometheus metrics, the scrape/health server, alerts.
//! - `resilience`: process-level shutdown and panic handling.
//! - `utils`: small shared helpers (tracing setup).

pub mod confirm;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod estimators;
pub mod logger;
pub mod monitoring;
pub mod order;
pub mod resilience;
pub mod safety;
pub mod sender;
pub mod signer;
pub mod store;
pub mod utils;

pub use core::{ApiError, ExecError};

pub use anyhow::{Error, Result};

/// Convenient imports for binaries wiring up the Coordinator.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::coordinator::{Coordinator, CoordinatorConfig, DecisionPayload, HandleContext, WsState};
    pub use crate::core::{ApiError, ExecError};
    pub use crate::estimators::{LrcConfig, LrcRegistry, SrConfig, SrRegistry};
    pub use crate::logger::EventLogger;
    pub use crate::monitoring::{AlertManager, MetricsRegistry};
    pub use crate::order::types::{Order, OrderResult, OrderStatus, Side};
    pub use crate::safety::SafetySupervisor;
    pub use crate::store::PersistentStore;
    pub use crate::{Error, Result};
}
