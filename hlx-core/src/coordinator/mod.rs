//! Executor Coordinator: the top-level `handle(payload, ctx) -> OrderResult`
//! entry point. Normalizes the payload, runs the guard chain, then drives
//! build -> sign -> send -> confirm, updating Safety and the partial-fill
//! lock along the way.
//!
//! A metrics-holding struct with a `Drop` impl that logs a final summary,
//! and a live-mode critical section guarded by a single-permit async mutex
//! rather than a bespoke queue actor.

use crate::confirm::{Confirmer, RoundTrip};
use crate::core::errors::ExecError;
use crate::logger::EventLogger;
use crate::monitoring::MetricsRegistry;
use crate::order::types::{
    Aggressiveness, ClientOrderId, Intent, Order, OrderResult, OrderStatus, Side, TimeInForce,
};
use crate::safety::{self, SafetySupervisor};
use crate::sender::Sender;
use crate::signer::SignerClient;
use crate::store::{PartialLock, StoreHandle};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Websocket/market-data health as observed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    Live,
    Stale,
    Lost,
}

/// A market snapshot as reported upstream; `mid` falls back through `bid`/`ask`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketSnapshot {
    pub mid: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl MarketSnapshot {
    fn resolved_mid(&self) -> Option<Decimal> {
        self.mid.or(self.bid).or(self.ask)
    }
}

/// An existing open position, used to infer intent when the caller doesn't specify one.
#[derive(Debug, Clone, Copy)]
pub struct OpenPosition {
    pub side: Side,
}

/// Raw decision payload from upstream, as it arrives at `handle`.
#[derive(Debug, Clone)]
pub struct DecisionPayload {
    pub decision_id: Option<String>,
    pub timestamp_ms: u64,
    pub side: Side,
    pub size: Decimal,
    pub coin: String,
    pub market: MarketSnapshot,
    pub price: Option<Decimal>,
    pub intent: Option<Intent>,
    pub open_position: Option<OpenPosition>,
    pub risk_allocation: Option<Decimal>,
    pub aggressiveness: Aggressiveness,
    pub tif: TimeInForce,
}

/// Per-call execution context.
#[derive(Debug, Clone)]
pub struct HandleContext {
    pub ws_state: WsState,
    pub mode: String,
}

/// Non-fatal adjustment applied to the built order's size before validation.
pub type RiskAllocationFn = Box<dyn Fn(Decimal, Option<Decimal>) -> Decimal + Send + Sync>;

/// External account-balance resync invoked after a live order confirms.
/// Failure halts live trading (`balance_sync_error`) without changing the
/// order's own outcome.
pub type SyncBalanceFn =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

pub struct CoordinatorConfig {
    pub partial_lock_ttl_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { partial_lock_ttl_ms: 30_000 }
    }
}

#[derive(Default)]
struct CoordinatorCounters {
    submitted: AtomicU64,
    confirmed: AtomicU64,
    rejected: AtomicU64,
    partial: AtomicU64,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    asset_ids: HashMap<String, u32>,
    safety: SafetySupervisor,
    store: StoreHandle,
    signer: SignerClient,
    sender: Sender,
    confirmer: Confirmer,
    logger: Option<Arc<EventLogger>>,
    metrics: Option<Arc<MetricsRegistry>>,
    risk_allocation: Option<RiskAllocationFn>,
    sync_balance: Option<SyncBalanceFn>,
    live_guard: AsyncMutex<()>,
    counters: CoordinatorCounters,
    /// Entry price/timestamp per symbol, consulted on an Exit-intent fill to
    /// compute realized PnL. Cleared once the exit fully closes the position.
    open_entries: DashMap<String, RoundTrip>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        asset_ids: HashMap<String, u32>,
        safety: SafetySupervisor,
        store: StoreHandle,
        signer: SignerClient,
        sender: Sender,
        confirmer: Confirmer,
    ) -> Self {
        Self {
            config,
            asset_ids,
            safety,
            store,
            signer,
            sender,
            confirmer,
            logger: None,
            metrics: None,
            risk_allocation: None,
            sync_balance: None,
            live_guard: AsyncMutex::new(()),
            counters: CoordinatorCounters::default(),
            open_entries: DashMap::new(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<EventLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_risk_allocation(mut self, f: RiskAllocationFn) -> Self {
        self.risk_allocation = Some(f);
        self
    }

    pub fn with_sync_balance(mut self, f: SyncBalanceFn) -> Self {
        self.sync_balance = Some(f);
        self
    }

    pub async fn handle(&self, payload: DecisionPayload, ctx: HandleContext) -> OrderResult {
        let is_live = ctx.mode == "live";
        if is_live {
            let _permit = self.live_guard.lock().await;
            self.handle_inner(payload, ctx).await
        } else {
            self.handle_inner(payload, ctx).await
        }
    }

    async fn handle_inner(&self, payload: DecisionPayload, ctx: HandleContext) -> OrderResult {
        let now = now_ms();

        // Guard 1: market data health.
        if matches!(ctx.ws_state, WsState::Stale | WsState::Lost) {
            self.safety.trigger(safety::REASON_WS_ERROR, "market data stale or lost", "coordinator");
            return self.error_result(&payload, now, "market data stale or lost");
        }

        // Guard 2: live-enabled.
        if !self.safety.is_live_enabled() {
            return self.error_result(&payload, now, "safety halted");
        }

        let mid = payload.market.resolved_mid();
        // Guard 3: payload validity.
        if payload.size <= Decimal::ZERO || payload.coin.trim().is_empty() || mid.is_none_or(|m| m <= Decimal::ZERO) {
            self.safety.trigger(safety::REASON_IO_ERROR, "invalid decision payload", "coordinator");
            return self.error_result(&payload, now, "invalid payload");
        }
        let mid = mid.unwrap();

        // Guard 4: partial-fill lock.
        if let Ok(Some(lock)) = self.store.get_partial_lock() {
            if !lock.is_expired(now, self.config.partial_lock_ttl_ms) {
                return self.error_result(&payload, now, &format!("partial_fill_pending: {}", lock.order_id));
            }
            let _ = self.store.clear_partial_lock();
        }

        // Guard 5: build + risk-adjust + validate.
        let intent = self.resolve_intent(&payload);
        let price = payload.price.unwrap_or(mid);
        let mut size = payload.size;
        if let Some(risk_fn) = &self.risk_allocation {
            size = risk_fn(size, payload.risk_allocation);
        }

        let client_order_id = payload
            .decision_id
            .clone()
            .map(ClientOrderId::from)
            .unwrap_or_else(|| ClientOrderId::composite(payload.timestamp_ms, payload.side, size, price));

        let order = Order {
            client_order_id: client_order_id.clone(),
            symbol: payload.coin.clone(),
            side: payload.side,
            size,
            price,
            tif: payload.tif,
            intent,
            aggressiveness: payload.aggressiveness,
        };

        if let Err(reason) = order.validate() {
            self.safety.trigger(safety::REASON_ORDER_BUILD_ERROR, &reason, "coordinator");
            return self.error_result(&payload, now, &reason);
        }

        // Guard 6/7: idempotency claim.
        match self.store.claim_processed_key(client_order_id.as_str()) {
            Ok(true) => {}
            Ok(false) => {
                warn!(order_id = client_order_id.as_str(), "duplicate decision, returning expired");
                return OrderResult::expired(order.side, order.price, order.size, now);
            }
            Err(reason) => {
                self.safety.trigger(safety::REASON_DEDUP_PERSIST_ERROR, &reason, "coordinator");
                return self.error_result(&payload, now, &reason);
            }
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.orders().submitted_total.with_label_values(&[&order.symbol, &order.side.to_string()]).inc();
        }

        let asset = self.asset_ids.get(&order.symbol).copied().unwrap_or(0);

        // Step 8: sign.
        let signed = match self.signer.sign(&order, asset).await {
            Ok(s) => s,
            Err(e) => {
                self.finish_with_error(&order, &e, now);
                return self.confirmer.reject(&order, &e, now);
            }
        };

        // Step 9: send.
        let outcome = match self.sender.send(&signed).await {
            Ok(o) => o,
            Err(e) => {
                self.finish_with_error(&order, &e, now);
                let _ = self.store.clear_partial_lock();
                return self.confirmer.reject(&order, &e, now);
            }
        };

        // Step 10: confirm.
        let round_trip = if order.intent == Intent::Exit {
            self.open_entries.get(&order.symbol).map(|r| *r)
        } else {
            None
        };
        let result = self.confirmer.confirm(
            &order,
            signed.nonce,
            &signed.signature,
            &signed.agent_address,
            &outcome,
            now_ms(),
            round_trip,
        );

        match order.intent {
            Intent::Entry if matches!(result.status, OrderStatus::Filled | OrderStatus::Partial) => {
                self.open_entries.insert(
                    order.symbol.clone(),
                    RoundTrip { entry_price: order.price, entry_ts_ms: now_ms() },
                );
            }
            Intent::Exit if result.status == OrderStatus::Filled => {
                self.open_entries.remove(&order.symbol);
            }
            _ => {}
        }

        // A successful send (`ok: true`) whose body still reports rejected/denied
        // is the same Safety-Halt as a fatal send-time rejection.
        if result.status == OrderStatus::Rejected {
            let detail = result.error.clone().unwrap_or_else(|| "venue rejected order".to_string());
            self.safety.trigger(safety::REASON_HL_REJECT, &detail, "coordinator");
        }

        // Step 11: partial lock bookkeeping.
        if result.status == OrderStatus::Partial {
            let remaining = result.remaining_size.unwrap_or(Decimal::ZERO);
            let order_id = result.order_id.clone().unwrap_or_else(|| client_order_id.to_string());
            let lock = PartialLock {
                order_id,
                remaining_size: remaining,
                side: order.side,
                price: Some(order.price),
                ts_ms: now_ms(),
            };
            if let Err(reason) = self.store.set_partial_lock(lock) {
                self.safety.trigger(safety::REASON_PARTIAL_LOCK_ERROR, &reason, "coordinator");
                self.safety.set_last_error(reason.clone());
                return self.error_result(&payload, now, &reason);
            }
            self.counters.partial.fetch_add(1, Ordering::Relaxed);
        } else {
            let _ = self.store.clear_partial_lock();
        }

        self.record_terminal_metrics(&order, &result);

        // Step 12: bookkeeping.
        if let Some(err) = &result.error {
            self.safety.set_last_error(err.clone());
        }

        // Step 13: live balance resync. Doesn't change this order's own
        // outcome; a failure only halts subsequent live trading.
        if ctx.mode == "live" {
            if let Some(hook) = &self.sync_balance {
                if let Err(reason) = hook().await {
                    self.safety.trigger(safety::REASON_BALANCE_SYNC_ERROR, &reason, "coordinator");
                    self.safety.set_last_error(reason);
                }
            }
        }

        result
    }

    fn resolve_intent(&self, payload: &DecisionPayload) -> Intent {
        if let Some(intent) = payload.intent {
            return intent;
        }
        match &payload.open_position {
            Some(open) if open.side != payload.side => Intent::Exit,
            Some(_) => Intent::Entry,
            None => Intent::Entry,
        }
    }

    fn finish_with_error(&self, order: &Order, error: &ExecError, now: u64) {
        if let Some(reason) = error.halt_reason() {
            self.safety.trigger(reason, &error.to_string(), "coordinator");
        }
        self.safety.set_last_error(error.to_string());
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.orders().rejected_total.with_label_values(&[error.halt_reason().unwrap_or("unknown")]).inc();
        }
        if let Some(logger) = &self.logger {
            logger.emit(
                "order.rejected",
                serde_json::json!({"symbol": order.symbol, "error": error.to_string(), "ts": now}),
            );
        }
    }

    fn record_terminal_metrics(&self, order: &Order, result: &OrderResult) {
        self.counters.confirmed.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics
                .orders()
                .confirmed_total
                .with_label_values(&[&result.status.to_string()])
                .inc();
            let _ = order;
        }
    }

    fn error_result(&self, payload: &DecisionPayload, now: u64, message: &str) -> OrderResult {
        let price = payload.price.or(payload.market.resolved_mid()).unwrap_or(Decimal::ZERO);
        OrderResult::error(payload.side, price, payload.size, now, message)
    }

    pub fn safety(&self) -> &SafetySupervisor {
        &self.safety
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        info!(
            submitted = self.counters.submitted.load(Ordering::Relaxed),
            confirmed = self.counters.confirmed.load(Ordering::Relaxed),
            rejected = self.counters.rejected.load(Ordering::Relaxed),
            partial = self.counters.partial.load(Ordering::Relaxed),
            "coordinator shutting down, final order stats"
        );
    }
}
