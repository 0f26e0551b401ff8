//! Safety Supervisor: the process-wide `{Normal, Halted}` mode plus the
//! consecutive-signer-error counter that can self-trigger a halt.
//!
//! A circuit breaker: an `Arc<AtomicU8>` for the mode and an
//! `Arc<AtomicU64>` for the error counter, with two states (not three) and
//! manual-only recovery via [`SafetySupervisor::enable`] (no timeout-based
//! auto-recovery). `lastHaltReason`
//! and `lastError` live behind a `parking_lot::Mutex` since they are not
//! hot-path reads; the supervisor is `Clone` (clones the `Arc`s) so it can
//! be handed to the Coordinator, the metrics exporter, and the alert sink
//! without an outer lock.

use crate::logger::EventLogger;
use crate::monitoring::alerts::{Alert, AlertCategory, AlertManager, AlertSeverity};
use crate::monitoring::MetricsRegistry;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

const SIGNER_ERROR_HALT_THRESHOLD: u64 = 3;

/// The two-state mode. `Halted` forbids all live order flow until a manual `enable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyMode {
    Normal = 0,
    Halted = 1,
}

impl From<u8> for SafetyMode {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            _ => Self::Halted,
        }
    }
}

/// Reasons a halt can be triggered for, matching the Coordinator's guard chain.
pub const REASON_WS_ERROR: &str = "ws_error";
pub const REASON_IO_ERROR: &str = "io_error";
pub const REASON_ORDER_BUILD_ERROR: &str = "order_build_error";
pub const REASON_DEDUP_PERSIST_ERROR: &str = "dedup_persist_error";
pub const REASON_SIGN_ERROR: &str = "sign_error";
pub const REASON_SIGNER_UNAVAILABLE: &str = "signer_unavailable";
pub const REASON_INVALID_SIGNATURE: &str = "invalid_signature";
pub const REASON_API_ERROR: &str = "api_error";
pub const REASON_HL_REJECT: &str = "hl_reject";
pub const REASON_PARTIAL_LOCK_ERROR: &str = "partial_lock_error";
pub const REASON_BALANCE_SYNC_ERROR: &str = "balance_sync_error";

fn alerts_on(reason: &str) -> bool {
    matches!(reason, REASON_HL_REJECT | REASON_INVALID_SIGNATURE)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SafetySnapshot {
    pub live_enabled: bool,
    pub consecutive_signer_errors: u64,
    pub last_halt_reason: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Bookkeeping {
    last_halt_reason: Option<String>,
    last_halt_detail: Option<String>,
    last_halt_subsystem: Option<String>,
    last_error: Option<String>,
}

/// `Clone`-able handle to shared safety state.
#[derive(Clone)]
pub struct SafetySupervisor {
    mode: Arc<AtomicU8>,
    consecutive_signer_errors: Arc<AtomicU64>,
    bookkeeping: Arc<Mutex<Bookkeeping>>,
    logger: Option<Arc<EventLogger>>,
    alerts: Option<Arc<AlertManager>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SafetySupervisor {
    pub fn new() -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(SafetyMode::Normal as u8)),
            consecutive_signer_errors: Arc::new(AtomicU64::new(0)),
            bookkeeping: Arc::new(Mutex::new(Bookkeeping::default())),
            logger: None,
            alerts: None,
            metrics: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<EventLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<AlertManager>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        if metrics.safety().live_enabled.get() == 0 {
            metrics.safety().live_enabled.set(1);
        }
        self.metrics = Some(metrics);
        self
    }

    /// Cheap, lock-free read. The Coordinator must consult this both before
    /// signing and before sending.
    #[inline]
    pub fn is_live_enabled(&self) -> bool {
        SafetyMode::from(self.mode.load(Ordering::Acquire)) == SafetyMode::Normal
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode.load(Ordering::Acquire).into()
    }

    /// Transition Normal → Halted. Idempotent: re-triggering while already
    /// halted overwrites the recorded reason/detail but does not re-alert
    /// beyond the usual best-effort send.
    pub fn trigger(&self, reason: &str, detail: &str, subsystem: &str) {
        self.mode.store(SafetyMode::Halted as u8, Ordering::Release);

        {
            let mut bk = self.bookkeeping.lock();
            bk.last_halt_reason = Some(reason.to_string());
            bk.last_halt_detail = Some(detail.to_string());
            bk.last_halt_subsystem = Some(subsystem.to_string());
        }

        warn!(reason, detail, subsystem, "safety halt triggered");

        if let Some(logger) = &self.logger {
            logger.emit(
                "executor.live.safety_halt",
                serde_json::json!({"reason": reason, "detail": detail, "subsystem": subsystem}),
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.safety().live_enabled.set(0);
            metrics.safety().halts_total.with_label_values(&[reason]).inc();
        }

        if alerts_on(reason) {
            self.notify_alert(reason, detail, subsystem);
        }
    }

    fn notify_alert(&self, reason: &str, detail: &str, subsystem: &str) {
        let Some(alerts) = &self.alerts else { return };
        let alert = Alert::new(
            AlertCategory::System,
            reason,
            AlertSeverity::Critical,
            format!("safety halt: {}", reason),
        )
        .with_detail("detail", detail)
        .with_detail("subsystem", subsystem);

        if alerts.send(alert).is_ok() {
            if let Some(metrics) = &self.metrics {
                metrics.safety().alerts_sent_total.inc();
            }
        }
    }

    /// Halted → Normal. Only path back to live trading.
    pub fn enable(&self, operator: &str) {
        self.mode.store(SafetyMode::Normal as u8, Ordering::Release);
        self.consecutive_signer_errors.store(0, Ordering::Release);

        {
            let mut bk = self.bookkeeping.lock();
            bk.last_halt_reason = None;
            bk.last_halt_detail = None;
            bk.last_halt_subsystem = None;
        }

        if let Some(logger) = &self.logger {
            logger.emit("executor.live.enabled", serde_json::json!({"operator": operator}));
        }
        if let Some(metrics) = &self.metrics {
            metrics.safety().live_enabled.set(1);
            metrics.safety().consecutive_signer_errors.set(0);
        }
    }

    pub fn record_signer_error(&self) {
        let count = self.consecutive_signer_errors.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(metrics) = &self.metrics {
            metrics.safety().consecutive_signer_errors.set(count as i64);
        }
        if count >= SIGNER_ERROR_HALT_THRESHOLD {
            self.trigger(
                REASON_SIGNER_UNAVAILABLE,
                &format!("{} consecutive signer errors", count),
                "signer_client",
            );
        }
    }

    pub fn record_signer_success(&self) {
        self.consecutive_signer_errors.store(0, Ordering::Release);
        if let Some(metrics) = &self.metrics {
            metrics.safety().consecutive_signer_errors.set(0);
        }
    }

    pub fn set_last_error(&self, error: impl Into<String>) {
        self.bookkeeping.lock().last_error = Some(error.into());
    }

    pub fn snapshot(&self) -> SafetySnapshot {
        let bk = self.bookkeeping.lock();
        SafetySnapshot {
            live_enabled: self.is_live_enabled(),
            consecutive_signer_errors: self.consecutive_signer_errors.load(Ordering::Acquire),
            last_halt_reason: bk.last_halt_reason.clone(),
            last_error: bk.last_error.clone(),
        }
    }
}

impl Default for SafetySupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_normal_and_live() {
        let s = SafetySupervisor::new();
        assert!(s.is_live_enabled());
        assert_eq!(s.mode(), SafetyMode::Normal);
    }

    #[test]
    fn trigger_halts_and_records_reason() {
        let s = SafetySupervisor::new();
        s.trigger(REASON_HL_REJECT, "unauthorized", "sender");
        assert!(!s.is_live_enabled());
        assert_eq!(s.mode(), SafetyMode::Halted);
        assert_eq!(s.snapshot().last_halt_reason, Some(REASON_HL_REJECT.to_string()));
    }

    #[test]
    fn enable_restores_live_and_clears_reason() {
        let s = SafetySupervisor::new();
        s.trigger(REASON_IO_ERROR, "bad payload", "coordinator");
        s.enable("operator-1");
        assert!(s.is_live_enabled());
        assert_eq!(s.snapshot().last_halt_reason, None);
    }

    #[test]
    fn three_consecutive_signer_errors_self_triggers() {
        let s = SafetySupervisor::new();
        s.record_signer_error();
        s.record_signer_error();
        assert!(s.is_live_enabled());
        s.record_signer_error();
        assert!(!s.is_live_enabled());
        assert_eq!(s.snapshot().last_halt_reason, Some(REASON_SIGNER_UNAVAILABLE.to_string()));
    }

    #[test]
    fn signer_success_resets_counter() {
        let s = SafetySupervisor::new();
        s.record_signer_error();
        s.record_signer_error();
        s.record_signer_success();
        assert_eq!(s.snapshot().consecutive_signer_errors, 0);
        s.record_signer_error();
        s.record_signer_error();
        assert!(s.is_live_enabled());
    }

    #[test]
    fn clone_shares_state() {
        let s1 = SafetySupervisor::new();
        let s2 = s1.clone();
        s1.trigger(REASON_API_ERROR, "500", "sender");
        assert!(!s2.is_live_enabled());
    }
}
