//! Streaming least-squares (linear regression channel) estimator over the
//! last `len` mid prices. Pure streaming: no lookahead, no restart
//! semantics beyond process lifetime.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// `len`, `k`, and `flat_threshold` are configuration, not compiled-in
/// constants, per the estimator ownership design note.
#[derive(Debug, Clone, Copy)]
pub struct LrcConfig {
    /// Buffer length (`len`).
    pub len: usize,
    /// Slope normalization constant (`k` in `normalizedSlope = |slope| / (k/len)`).
    pub k: f64,
    /// Threshold on `normalizedSlope` below which the trend is `flat`.
    pub flat_threshold: f64,
    /// Multiplier applied to the deviation to compute the channel band.
    pub dev_multiplier: f64,
}

impl Default for LrcConfig {
    fn default() -> Self {
        Self {
            len: 60,
            k: 1.0,
            flat_threshold: 1.0,
            dev_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendState {
    Up,
    Down,
    Flat,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LrcSnapshot {
    pub ready: bool,
    pub slope: Option<f64>,
    pub intercept: Option<f64>,
    pub deviation: Option<f64>,
    pub normalized_slope: Option<f64>,
    pub trend_state: Option<TrendState>,
    pub channel_mid: Option<f64>,
    pub channel_top: Option<f64>,
    pub channel_bottom: Option<f64>,
}

impl LrcSnapshot {
    fn not_ready() -> Self {
        Self::default()
    }
}

/// Owns the buffer; callers only ever see value-type [`LrcSnapshot`]s, never
/// a reference into the internal `VecDeque`.
pub struct LrcEstimator {
    config: LrcConfig,
    buffer: VecDeque<f64>,
}

impl LrcEstimator {
    pub fn new(config: LrcConfig) -> Self {
        Self {
            buffer: VecDeque::with_capacity(config.len.max(1)),
            config,
        }
    }

    /// Feed one tick. `price` should already have the upstream mid/last-trade
    /// fallback resolved; `None` or non-finite values are treated as an
    /// unreadable tick and produce a not-ready snapshot without mutating state.
    pub fn update(&mut self, price: Option<f64>) -> LrcSnapshot {
        if self.config.len == 0 {
            return LrcSnapshot::not_ready();
        }

        let Some(price) = price else {
            return LrcSnapshot::not_ready();
        };
        if !price.is_finite() {
            return LrcSnapshot::not_ready();
        }

        if self.buffer.len() == self.config.len {
            self.buffer.pop_front();
        }
        self.buffer.push_back(price);

        if self.buffer.len() < self.config.len {
            return LrcSnapshot::not_ready();
        }

        self.compute()
    }

    fn compute(&self) -> LrcSnapshot {
        let n = self.buffer.len();
        let n_f = n as f64;

        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let x_mean = xs.iter().sum::<f64>() / n_f;
        let y_mean = self.buffer.iter().sum::<f64>() / n_f;

        let mut num = 0.0;
        let mut den = 0.0;
        for (x, y) in xs.iter().zip(self.buffer.iter()) {
            num += (x - x_mean) * (y - y_mean);
            den += (x - x_mean).powi(2);
        }

        if den == 0.0 {
            return LrcSnapshot::not_ready();
        }

        let slope = num / den;
        let intercept = y_mean - slope * x_mean;

        if !slope.is_finite() || !intercept.is_finite() {
            return LrcSnapshot::not_ready();
        }

        let residual_sq_sum: f64 = xs
            .iter()
            .zip(self.buffer.iter())
            .map(|(x, y)| {
                let predicted = intercept + slope * x;
                (y - predicted).powi(2)
            })
            .sum();
        let deviation = (residual_sq_sum / n_f).sqrt();

        if !deviation.is_finite() {
            return LrcSnapshot::not_ready();
        }

        let k_over_len = self.config.k / n_f;
        let normalized_slope = if k_over_len != 0.0 {
            slope.abs() / k_over_len
        } else {
            f64::INFINITY
        };

        let trend_state = if !normalized_slope.is_finite() {
            TrendState::Unknown
        } else if normalized_slope >= self.config.flat_threshold {
            if slope > 0.0 {
                TrendState::Up
            } else {
                TrendState::Down
            }
        } else {
            TrendState::Flat
        };

        let channel_mid = intercept + slope * ((n_f) - 1.0);
        let channel_top = channel_mid + deviation * self.config.dev_multiplier;
        let channel_bottom = channel_mid - deviation * self.config.dev_multiplier;

        if !channel_mid.is_finite() || !channel_top.is_finite() || !channel_bottom.is_finite() {
            return LrcSnapshot::not_ready();
        }

        LrcSnapshot {
            ready: true,
            slope: Some(slope),
            intercept: Some(intercept),
            deviation: Some(deviation),
            normalized_slope: Some(normalized_slope),
            trend_state: Some(trend_state),
            channel_mid: Some(channel_mid),
            channel_top: Some(channel_top),
            channel_bottom: Some(channel_bottom),
        }
    }
}

/// Per-instrument singleton registry, owned by the long-lived tick-ingestion
/// context the estimators are wired into.
pub struct LrcRegistry {
    config: LrcConfig,
    estimators: DashMap<String, LrcEstimator>,
}

impl LrcRegistry {
    pub fn new(config: LrcConfig) -> Self {
        Self {
            config,
            estimators: DashMap::new(),
        }
    }

    pub fn update(&self, symbol: &str, price: Option<f64>) -> LrcSnapshot {
        let mut entry = self
            .estimators
            .entry(symbol.to_string())
            .or_insert_with(|| LrcEstimator::new(self.config));
        entry.update(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn not_ready_until_buffer_full() {
        let mut est = LrcEstimator::new(LrcConfig { len: 3, ..Default::default() });
        assert!(!est.update(Some(1.0)).ready);
        assert!(!est.update(Some(2.0)).ready);
        let snap = est.update(Some(3.0));
        assert!(snap.ready);
    }

    #[test]
    fn linear_increase_classifies_up() {
        let mut est = LrcEstimator::new(LrcConfig {
            len: 10,
            k: 1.0,
            flat_threshold: 1.0,
            dev_multiplier: 2.0,
        });
        let mut snap = LrcSnapshot::not_ready();
        for i in 0..10 {
            snap = est.update(Some(i as f64));
        }
        assert!(snap.ready);
        assert_abs_diff_eq!(snap.slope.unwrap(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(snap.normalized_slope.unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(snap.trend_state, Some(TrendState::Up));
    }

    #[test]
    fn constant_series_classifies_flat() {
        let mut est = LrcEstimator::new(LrcConfig {
            len: 10,
            k: 1.0,
            flat_threshold: 1.0,
            dev_multiplier: 2.0,
        });
        let mut snap = LrcSnapshot::not_ready();
        for _ in 0..10 {
            snap = est.update(Some(100.0));
        }
        assert_abs_diff_eq!(snap.slope.unwrap(), 0.0, epsilon = 1e-9);
        assert_eq!(snap.trend_state, Some(TrendState::Flat));
    }

    #[test]
    fn zero_length_never_ready() {
        let mut est = LrcEstimator::new(LrcConfig { len: 0, ..Default::default() });
        assert!(!est.update(Some(1.0)).ready);
    }

    #[test]
    fn non_finite_input_not_ready_and_nulls() {
        let mut est = LrcEstimator::new(LrcConfig { len: 3, ..Default::default() });
        est.update(Some(1.0));
        est.update(Some(2.0));
        let snap = est.update(Some(f64::NAN));
        assert!(!snap.ready);
        assert!(snap.slope.is_none());
    }

    #[test]
    fn registry_keeps_per_symbol_state() {
        let registry = LrcRegistry::new(LrcConfig { len: 2, ..Default::default() });
        registry.update("BTC", Some(1.0));
        let btc = registry.update("BTC", Some(2.0));
        assert!(btc.ready);
        let eth = registry.update("ETH", Some(1.0));
        assert!(!eth.ready);
    }
}
