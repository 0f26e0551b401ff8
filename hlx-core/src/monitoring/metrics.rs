//! Prometheus metrics for the executor pipeline.
//!
//! Grouped into trading/performance/system metric families, covering the
//! fields this executor actually emits: orders, safety halts, signer
//! retries, and estimator readiness.

use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::sync::Arc;
use tracing::info;

/// Central registry for all Prometheus metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    orders: Arc<OrderMetrics>,
    safety: Arc<SafetyMetrics>,
    estimators: Arc<EstimatorMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let orders = Arc::new(OrderMetrics::new(&registry)?);
        let safety = Arc::new(SafetyMetrics::new(&registry)?);
        let estimators = Arc::new(EstimatorMetrics::new(&registry)?);

        info!("metrics registry initialized");

        Ok(Self {
            registry,
            orders,
            safety,
            estimators,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn orders(&self) -> &OrderMetrics {
        &self.orders
    }

    pub fn safety(&self) -> &SafetyMetrics {
        &self.safety
    }

    pub fn estimators(&self) -> &EstimatorMetrics {
        &self.estimators
    }
}

impl Default for MetricsRegistry {
    #[allow(clippy::panic)]
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("FATAL: failed to create metrics registry: {}", e);
            panic!("cannot create metrics registry")
        })
    }
}

/// Order-path activity: submissions, outcomes, and the two hot-path HTTP legs.
pub struct OrderMetrics {
    pub handled_total: IntCounterVec,
    pub submitted_total: IntCounterVec,
    pub confirmed_total: IntCounterVec,
    pub rejected_total: IntCounterVec,
    pub sign_latency_ms: Histogram,
    pub send_latency_ms: Histogram,
    pub signer_retries_total: IntCounter,
}

impl OrderMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let handled_total = IntCounterVec::new(
            Opts::new("handled_total", "Orders handled by the coordinator").namespace("hlx"),
            &["symbol", "side"],
        )?;
        registry.register(Box::new(handled_total.clone()))?;

        let submitted_total = IntCounterVec::new(
            Opts::new("submitted_total", "Orders sent to the exchange").namespace("hlx"),
            &["symbol", "side"],
        )?;
        registry.register(Box::new(submitted_total.clone()))?;

        let confirmed_total = IntCounterVec::new(
            Opts::new("confirmed_total", "Orders confirmed by status").namespace("hlx"),
            &["status"],
        )?;
        registry.register(Box::new(confirmed_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new("rejected_total", "Orders rejected or errored by reason").namespace("hlx"),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let sign_latency_ms = Histogram::with_opts(
            HistogramOpts::new("sign_latency_ms", "Signer round-trip latency in milliseconds")
                .namespace("hlx")
                .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0]),
        )?;
        registry.register(Box::new(sign_latency_ms.clone()))?;

        let send_latency_ms = Histogram::with_opts(
            HistogramOpts::new("send_latency_ms", "Exchange send round-trip latency in milliseconds")
                .namespace("hlx")
                .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 4000.0]),
        )?;
        registry.register(Box::new(send_latency_ms.clone()))?;

        let signer_retries_total =
            IntCounter::with_opts(Opts::new("signer_retries_total", "Signer retry attempts").namespace("hlx"))?;
        registry.register(Box::new(signer_retries_total.clone()))?;

        Ok(Self {
            handled_total,
            submitted_total,
            confirmed_total,
            rejected_total,
            sign_latency_ms,
            send_latency_ms,
            signer_retries_total,
        })
    }
}

/// Safety-Halt state and the error taxonomy that drives it.
pub struct SafetyMetrics {
    pub live_enabled: IntGauge,
    pub halts_total: IntCounterVec,
    pub consecutive_signer_errors: IntGauge,
    pub alerts_sent_total: IntCounter,
}

impl SafetyMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let live_enabled =
            IntGauge::with_opts(Opts::new("safety_live_enabled", "1 if live trading is enabled").namespace("hlx"))?;
        registry.register(Box::new(live_enabled.clone()))?;

        let halts_total = IntCounterVec::new(
            Opts::new("safety_halts_total", "Safety halts triggered by reason").namespace("hlx"),
            &["reason"],
        )?;
        registry.register(Box::new(halts_total.clone()))?;

        let consecutive_signer_errors = IntGauge::with_opts(
            Opts::new("safety_consecutive_signer_errors", "Current consecutive signer error count")
                .namespace("hlx"),
        )?;
        registry.register(Box::new(consecutive_signer_errors.clone()))?;

        let alerts_sent_total = IntCounter::with_opts(
            Opts::new("safety_alerts_sent_total", "Alerts sent to the external sink").namespace("hlx"),
        )?;
        registry.register(Box::new(alerts_sent_total.clone()))?;

        Ok(Self {
            live_enabled,
            halts_total,
            consecutive_signer_errors,
            alerts_sent_total,
        })
    }
}

/// LRC and support/resistance estimator readiness, per instrument.
pub struct EstimatorMetrics {
    pub lrc_ready: IntGaugeVec,
    pub sr_ready: IntGaugeVec,
    pub sr_structure_width: Gauge,
}

impl EstimatorMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let lrc_ready = IntGaugeVec::new(
            Opts::new("lrc_ready", "1 if the LRC channel estimator has a full window").namespace("hlx"),
            &["symbol"],
        )?;
        registry.register(Box::new(lrc_ready.clone()))?;

        let sr_ready = IntGaugeVec::new(
            Opts::new("sr_ready", "1 if the support/resistance aggregator published primaries").namespace("hlx"),
            &["symbol"],
        )?;
        registry.register(Box::new(sr_ready.clone()))?;

        let sr_structure_width =
            Gauge::with_opts(Opts::new("sr_structure_width_usd", "Most recent structure width in USD").namespace("hlx"))?;
        registry.register(Box::new(sr_structure_width.clone()))?;

        Ok(Self {
            lrc_ready,
            sr_ready,
            sr_structure_width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_creation_registers_families() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(!registry.registry().gather().is_empty());
    }

    #[test]
    fn order_metrics_record() {
        let registry = MetricsRegistry::new().unwrap();
        registry.orders().handled_total.with_label_values(&["BTC", "buy"]).inc();
        registry.orders().confirmed_total.with_label_values(&["filled"]).inc();
        registry.orders().sign_latency_ms.observe(12.5);
        assert!(!registry.registry().gather().is_empty());
    }

    #[test]
    fn safety_metrics_record() {
        let registry = MetricsRegistry::new().unwrap();
        registry.safety().live_enabled.set(1);
        registry.safety().halts_total.with_label_values(&["hl_reject"]).inc();
        registry.safety().consecutive_signer_errors.set(2);
        assert!(!registry.registry().gather().is_empty());
    }

    #[test]
    fn estimator_metrics_record() {
        let registry = MetricsRegistry::new().unwrap();
        registry.estimators().lrc_ready.with_label_values(&["BTC"]).set(1);
        registry.estimators().sr_ready.with_label_values(&["BTC"]).set(0);
        registry.estimators().sr_structure_width.set(150.0);
        assert!(!registry.registry().gather().is_empty());
    }
}
