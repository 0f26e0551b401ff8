//! Time-windowed depth-snapshot aggregator that clusters price levels into
//! support/resistance bands and publishes a primary pair with a
//! `ready`/`fallback` flag.
//!
//! `repPoint`, the merge/band constants, and the 30s-scale thresholds below
//! are fields of [`SrConfig`] (configuration, not a compiled-in contract),
//! per the estimator design note.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthSide {
    Bid,
    Ask,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthSample {
    pub ts_ms: u64,
    pub price: f64,
    pub size: f64,
    pub side: DepthSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepPoint {
    MaxThickness,
    WeightedAvg,
}

#[derive(Debug, Clone, Copy)]
pub struct SrConfig {
    pub window_ms: u64,
    pub refresh_ms: u64,
    pub k_scale: f64,
    pub target_bands: f64,
    pub merge_usd: f64,
    pub merge_usd_min: f64,
    pub merge_usd_max: f64,
    pub min_band_width_usd: f64,
    pub max_bands: usize,
    pub min_structure_width_usd: f64,
    pub rep_point: RepPoint,
}

impl Default for SrConfig {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            refresh_ms: 20 * 1000,
            k_scale: 1.0,
            target_bands: 4.0,
            merge_usd: 25.0,
            merge_usd_min: 5.0,
            merge_usd_max: 200.0,
            min_band_width_usd: 10.0,
            max_bands: 6,
            min_structure_width_usd: 50.0,
            rep_point: RepPoint::MaxThickness,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BandSide {
    Support,
    Resistance,
}

#[derive(Debug, Clone, Copy)]
struct Band {
    side: BandSide,
    center: f64,
    width: f64,
    size: f64,
    count: usize,
}

impl Band {
    fn lower(&self) -> f64 {
        self.center - self.width / 2.0
    }
    fn upper(&self) -> f64 {
        self.center + self.width / 2.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SrDiagnostics {
    pub sample_count_pre_filter: usize,
    pub sample_count_post_filter: usize,
    pub drop_reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SrSnapshot {
    pub ready: bool,
    pub fallback_reason: Option<String>,
    pub support_center: Option<f64>,
    pub support_width: Option<f64>,
    pub support_lower: Option<f64>,
    pub support_upper: Option<f64>,
    pub resistance_center: Option<f64>,
    pub resistance_width: Option<f64>,
    pub resistance_lower: Option<f64>,
    pub resistance_upper: Option<f64>,
    pub structure_width_usd: Option<f64>,
    pub structural_distance_usd: Option<f64>,
    pub channel_width_usd: Option<f64>,
    pub diagnostics: SrDiagnostics,
}

impl SrSnapshot {
    fn not_ready(reason: &str, diagnostics: SrDiagnostics) -> Self {
        Self {
            ready: false,
            fallback_reason: Some(reason.to_string()),
            diagnostics,
            ..Default::default()
        }
    }
}

pub struct SrAggregator {
    config: SrConfig,
    samples: Vec<DepthSample>,
    last_refresh_ms: Option<u64>,
    cached: SrSnapshot,
}

impl SrAggregator {
    pub fn new(config: SrConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
            last_refresh_ms: None,
            cached: SrSnapshot::not_ready("data_stale", SrDiagnostics::default()),
        }
    }

    pub fn push_sample(&mut self, sample: DepthSample) {
        self.samples.push(sample);
    }

    /// Recompute at most every `refresh_ms`; otherwise return the cached snapshot.
    pub fn refresh(&mut self, mid: f64, now_ms: u64) -> SrSnapshot {
        if let Some(last) = self.last_refresh_ms {
            if now_ms.saturating_sub(last) < self.config.refresh_ms {
                return self.cached.clone();
            }
        }
        self.last_refresh_ms = Some(now_ms);

        let start = Instant::now();
        let snapshot = self.compute(mid, now_ms);
        let calc_time_ms = start.elapsed().as_millis() as u64;

        self.cached = if calc_time_ms > 1000 {
            SrSnapshot::not_ready("calc_timeout", snapshot.diagnostics)
        } else {
            snapshot
        };
        self.cached.clone()
    }

    fn compute(&mut self, mid: f64, now_ms: u64) -> SrSnapshot {
        if !mid.is_finite() {
            return SrSnapshot::not_ready("error", SrDiagnostics::default());
        }

        let pre_count = self.samples.len();
        self.samples
            .retain(|s| now_ms.saturating_sub(s.ts_ms) <= self.config.window_ms);
        let post_count = self.samples.len();

        let mut diagnostics = SrDiagnostics {
            sample_count_pre_filter: pre_count,
            sample_count_post_filter: post_count,
            drop_reasons: Vec::new(),
        };

        let latest_ts = self.samples.iter().map(|s| s.ts_ms).max();
        let age_ms = match latest_ts {
            Some(ts) => now_ms.saturating_sub(ts),
            None => {
                diagnostics.drop_reasons.push("no_samples".to_string());
                return SrSnapshot::not_ready("no_bands", diagnostics);
            }
        };

        if age_ms > self.config.window_ms {
            diagnostics.drop_reasons.push("stale".to_string());
            return SrSnapshot::not_ready("data_stale", diagnostics);
        }

        let mut support: Vec<f64> = self.samples.iter().filter(|s| s.price <= mid).map(|s| s.price).collect();
        let mut resistance: Vec<f64> = self.samples.iter().filter(|s| s.price > mid).map(|s| s.price).collect();

        let support_sizes: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.price <= mid)
            .map(|s| s.size)
            .collect();
        let resistance_sizes: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.price > mid)
            .map(|s| s.size)
            .collect();

        support.sort_by(|a, b| a.partial_cmp(b).unwrap());
        resistance.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let (support_bands, support_merge_eff) = self.merge_side(&support, &support_sizes, BandSide::Support);
        let (resistance_bands, resistance_merge_eff) =
            self.merge_side(&resistance, &resistance_sizes, BandSide::Resistance);

        let mut all_bands: Vec<Band> = support_bands.into_iter().chain(resistance_bands).collect();

        if all_bands.len() > self.config.max_bands {
            let merge_usd_eff = support_merge_eff.max(resistance_merge_eff);
            all_bands = self.truncate_balanced(all_bands, merge_usd_eff);
        }

        if all_bands.len() < 2 {
            diagnostics.drop_reasons.push("insufficient_bands".to_string());
            return SrSnapshot::not_ready("no_bands", diagnostics);
        }

        // Innermost support = highest-price support band; innermost resistance = lowest-price resistance band.
        let primary_support = all_bands
            .iter()
            .filter(|b| b.side == BandSide::Support)
            .max_by(|a, b| a.center.partial_cmp(&b.center).unwrap());
        let primary_resistance = all_bands
            .iter()
            .filter(|b| b.side == BandSide::Resistance)
            .min_by(|a, b| a.center.partial_cmp(&b.center).unwrap());

        let (Some(support_band), Some(resistance_band)) = (primary_support, primary_resistance) else {
            diagnostics.drop_reasons.push("missing_primary".to_string());
            return SrSnapshot::not_ready("no_bands", diagnostics);
        };

        let structure_width = (resistance_band.center - support_band.center).abs();
        if structure_width < self.config.min_structure_width_usd {
            diagnostics.drop_reasons.push("structure_width_too_narrow".to_string());
            return SrSnapshot::not_ready("structure_width_too_narrow", diagnostics);
        }

        let structural_distance = (resistance_band.lower() - support_band.upper()).max(0.0);
        let channel_width = all_bands
            .iter()
            .map(|b| b.upper())
            .fold(f64::MIN, f64::max)
            - all_bands.iter().map(|b| b.lower()).fold(f64::MAX, f64::min);

        SrSnapshot {
            ready: true,
            fallback_reason: None,
            support_center: Some(support_band.center),
            support_width: Some(support_band.width),
            support_lower: Some(support_band.lower()),
            support_upper: Some(support_band.upper()),
            resistance_center: Some(resistance_band.center),
            resistance_width: Some(resistance_band.width),
            resistance_lower: Some(resistance_band.lower()),
            resistance_upper: Some(resistance_band.upper()),
            structure_width_usd: Some(structure_width),
            structural_distance_usd: Some(structural_distance),
            channel_width_usd: Some(channel_width),
            diagnostics,
        }
    }

    /// Returns the side's merged bands and the dynamic `mergeUsdEff` used to
    /// build them, which the coarse re-merge pass reuses if truncation runs.
    fn merge_side(&self, prices: &[f64], sizes: &[f64], side: BandSide) -> (Vec<Band>, f64) {
        if prices.is_empty() {
            return (Vec::new(), self.config.merge_usd);
        }

        let channel_width = prices.last().unwrap() - prices.first().unwrap();
        let merge_usd_eff = if channel_width > 0.0 {
            (self.config.k_scale * channel_width / self.config.target_bands)
                .clamp(self.config.merge_usd_min, self.config.merge_usd_max)
        } else {
            self.config.merge_usd
        };

        let min_band_width_eff = (self.config.k_scale * self.config.min_band_width_usd)
            .clamp(self.config.merge_usd_min, 800.0);

        (
            greedy_merge(prices, sizes, merge_usd_eff, min_band_width_eff, self.config.rep_point, side),
            merge_usd_eff,
        )
    }

    /// Second coarse-merge pass at `min(1.75*mergeUsdEff, 700)` to pull
    /// adjacent bands together, then a balanced truncate-to-`maxBands` split
    /// evenly between support and resistance.
    fn truncate_balanced(&self, bands: Vec<Band>, merge_usd_eff: f64) -> Vec<Band> {
        let coarse_threshold = (1.75 * merge_usd_eff).min(700.0);
        let bands = coarse_remerge(bands, coarse_threshold);

        let half = self.config.max_bands / 2;
        let support_count = bands.iter().filter(|b| b.side == BandSide::Support).count();
        let resistance_count = bands.len() - support_count;
        let take_support = half.min(support_count);
        let take_resistance = (self.config.max_bands - take_support).min(resistance_count);

        let mut support: Vec<Band> = bands
            .iter()
            .filter(|b| b.side == BandSide::Support)
            .cloned()
            .collect();
        let mut resistance: Vec<Band> = bands
            .iter()
            .filter(|b| b.side == BandSide::Resistance)
            .cloned()
            .collect();

        support.sort_by(|a, b| b.center.partial_cmp(&a.center).unwrap());
        resistance.sort_by(|a, b| a.center.partial_cmp(&b.center).unwrap());

        support.truncate(take_support);
        resistance.truncate(take_resistance);

        let mut result = support;
        result.extend(resistance);
        result
    }
}

/// Merges adjacent same-side bands whose centers fall within `threshold`,
/// size-weighting the combined center the same way `greedy_merge` does.
fn coarse_remerge(mut bands: Vec<Band>, threshold: f64) -> Vec<Band> {
    bands.sort_by(|a, b| a.center.partial_cmp(&b.center).unwrap());

    let mut support = Vec::new();
    let mut resistance = Vec::new();
    for band in bands {
        let bucket = match band.side {
            BandSide::Support => &mut support,
            BandSide::Resistance => &mut resistance,
        };
        merge_into(bucket, band, threshold);
    }

    support.extend(resistance);
    support
}

fn merge_into(bucket: &mut Vec<Band>, band: Band, threshold: f64) {
    if let Some(prev) = bucket.last_mut() {
        if (band.center - prev.center).abs() <= threshold {
            let total_size = prev.size + band.size;
            let center = if total_size > 0.0 {
                (prev.center * prev.size + band.center * band.size) / total_size
            } else {
                (prev.center + band.center) / 2.0
            };
            let lower = prev.lower().min(band.lower());
            let upper = prev.upper().max(band.upper());
            *prev = Band {
                side: prev.side,
                center,
                width: (upper - lower).max(prev.width).max(band.width),
                size: total_size,
                count: prev.count + band.count,
            };
            return;
        }
    }
    bucket.push(band);
}

fn greedy_merge(
    prices: &[f64],
    sizes: &[f64],
    merge_usd_eff: f64,
    min_band_width_eff: f64,
    rep_point: RepPoint,
    side: BandSide,
) -> Vec<Band> {
    let mut bands = Vec::new();
    let mut cluster_prices: Vec<f64> = Vec::new();
    let mut cluster_sizes: Vec<f64> = Vec::new();

    let flush = |cluster_prices: &Vec<f64>, cluster_sizes: &Vec<f64>, bands: &mut Vec<Band>| {
        if cluster_prices.is_empty() {
            return;
        }
        let range = cluster_prices.last().unwrap() - cluster_prices.first().unwrap();
        let width = (range + 1.0).max(min_band_width_eff);
        let total_size: f64 = cluster_sizes.iter().sum();
        let center = match rep_point {
            RepPoint::MaxThickness => {
                let (idx, _) = cluster_sizes
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                    .unwrap();
                cluster_prices[idx]
            }
            RepPoint::WeightedAvg => {
                if total_size > 0.0 {
                    cluster_prices
                        .iter()
                        .zip(cluster_sizes.iter())
                        .map(|(p, s)| p * s)
                        .sum::<f64>()
                        / total_size
                } else {
                    cluster_prices.iter().sum::<f64>() / cluster_prices.len() as f64
                }
            }
        };
        bands.push(Band {
            side,
            center,
            width,
            size: total_size,
            count: cluster_prices.len(),
        });
    };

    for (i, &price) in prices.iter().enumerate() {
        let size = sizes.get(i).copied().unwrap_or(0.0);
        if let Some(&last) = cluster_prices.last() {
            if (price - last).abs() > merge_usd_eff {
                flush(&cluster_prices, &cluster_sizes, &mut bands);
                cluster_prices.clear();
                cluster_sizes.clear();
            }
        }
        cluster_prices.push(price);
        cluster_sizes.push(size);
    }
    flush(&cluster_prices, &cluster_sizes, &mut bands);

    bands
}

/// Per-instrument singleton registry.
pub struct SrRegistry {
    config: SrConfig,
    aggregators: DashMap<String, SrAggregator>,
}

impl SrRegistry {
    pub fn new(config: SrConfig) -> Self {
        Self {
            config,
            aggregators: DashMap::new(),
        }
    }

    pub fn push_sample(&self, symbol: &str, sample: DepthSample) {
        self.aggregators
            .entry(symbol.to_string())
            .or_insert_with(|| SrAggregator::new(self.config))
            .push_sample(sample);
    }

    pub fn refresh(&self, symbol: &str, mid: f64, now_ms: u64) -> SrSnapshot {
        self.aggregators
            .entry(symbol.to_string())
            .or_insert_with(|| SrAggregator::new(self.config))
            .refresh(mid, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts_ms: u64, price: f64, size: f64, side: DepthSide) -> DepthSample {
        DepthSample { ts_ms, price, size, side }
    }

    #[test]
    fn no_samples_not_ready() {
        let mut agg = SrAggregator::new(SrConfig::default());
        let snap = agg.refresh(50_000.0, 0);
        assert!(!snap.ready);
        assert_eq!(snap.fallback_reason.as_deref(), Some("no_bands"));
    }

    #[test]
    fn structure_width_guard_drops_primaries() {
        let mut config = SrConfig::default();
        config.min_structure_width_usd = 120.0;
        config.refresh_ms = 0;
        let mut agg = SrAggregator::new(config);

        for i in 0..5 {
            agg.push_sample(sample(1000, 50_100.0 + i as f64, 10.0, DepthSide::Bid));
        }
        for i in 0..5 {
            agg.push_sample(sample(1000, 50_190.0 + i as f64, 10.0, DepthSide::Ask));
        }

        let snap = agg.refresh(50_150.0, 1000);
        assert!(!snap.ready);
        assert_eq!(snap.fallback_reason.as_deref(), Some("structure_width_too_narrow"));
        assert!(snap.support_center.is_none());
    }

    #[test]
    fn wide_structure_is_ready() {
        let mut config = SrConfig::default();
        config.refresh_ms = 0;
        config.merge_usd = 5.0;
        config.merge_usd_max = 20.0;
        let mut agg = SrAggregator::new(config);

        for i in 0..5 {
            agg.push_sample(sample(1000, 49_900.0 + i as f64, 10.0, DepthSide::Bid));
        }
        for i in 0..5 {
            agg.push_sample(sample(1000, 50_200.0 + i as f64, 10.0, DepthSide::Ask));
        }

        let snap = agg.refresh(50_000.0, 1000);
        assert!(snap.ready);
        assert!(snap.support_center.unwrap() < 50_000.0);
        assert!(snap.resistance_center.unwrap() > 50_000.0);
    }

    #[test]
    fn stale_data_not_ready() {
        let mut config = SrConfig::default();
        config.window_ms = 1000;
        config.refresh_ms = 0;
        let mut agg = SrAggregator::new(config);
        agg.push_sample(sample(0, 49_900.0, 10.0, DepthSide::Bid));
        agg.push_sample(sample(0, 50_200.0, 10.0, DepthSide::Ask));

        let snap = agg.refresh(50_000.0, 5000);
        assert!(!snap.ready);
        assert_eq!(snap.fallback_reason.as_deref(), Some("data_stale"));
    }

    #[test]
    fn truncate_balanced_coarse_remerges_before_splitting() {
        let config = SrConfig { max_bands: 4, ..SrConfig::default() };
        let agg = SrAggregator::new(config);

        let bands = vec![
            Band { side: BandSide::Support, center: 49_000.0, width: 10.0, size: 5.0, count: 1 },
            Band { side: BandSide::Support, center: 49_010.0, width: 10.0, size: 5.0, count: 1 },
            Band { side: BandSide::Support, center: 48_500.0, width: 10.0, size: 5.0, count: 1 },
            Band { side: BandSide::Resistance, center: 51_000.0, width: 10.0, size: 5.0, count: 1 },
            Band { side: BandSide::Resistance, center: 51_010.0, width: 10.0, size: 5.0, count: 1 },
            Band { side: BandSide::Resistance, center: 51_500.0, width: 10.0, size: 5.0, count: 1 },
        ];

        // coarse_threshold = min(1.75 * 25.0, 700.0) = 43.75: merges the two
        // 10-apart bands on each side but leaves the 500-apart ones distinct.
        let result = agg.truncate_balanced(bands, 25.0);

        assert_eq!(result.len(), 4);
        assert_eq!(result.iter().filter(|b| b.side == BandSide::Support).count(), 2);
        assert_eq!(result.iter().filter(|b| b.side == BandSide::Resistance).count(), 2);
    }

    #[test]
    fn more_bands_than_max_triggers_truncation_during_compute() {
        let mut config = SrConfig::default();
        config.refresh_ms = 0;
        config.max_bands = 2;
        config.merge_usd = 1.0;
        config.merge_usd_min = 1.0;
        config.merge_usd_max = 1.0;
        config.min_structure_width_usd = 0.0;
        let mut agg = SrAggregator::new(config);

        // Scattered far enough apart (100+) that greedy_merge with a 1.0 merge
        // window keeps them as separate bands, forcing all_bands.len() > max_bands.
        for price in [49_000.0, 49_200.0, 49_400.0, 49_600.0] {
            agg.push_sample(sample(1000, price, 10.0, DepthSide::Bid));
        }
        for price in [50_400.0, 50_600.0, 50_800.0, 51_000.0] {
            agg.push_sample(sample(1000, price, 10.0, DepthSide::Ask));
        }

        let snap = agg.refresh(50_000.0, 1000);
        assert!(snap.ready);
    }

    #[test]
    fn refresh_is_rate_limited() {
        let mut config = SrConfig::default();
        config.refresh_ms = 20_000;
        let mut agg = SrAggregator::new(config);
        agg.push_sample(sample(0, 49_900.0, 10.0, DepthSide::Bid));
        let first = agg.refresh(50_000.0, 0);
        agg.push_sample(sample(1, 50_200.0, 10.0, DepthSide::Ask));
        let second = agg.refresh(50_000.0, 500);
        assert_eq!(first.diagnostics.sample_count_post_filter, second.diagnostics.sample_count_post_filter);
    }
}
