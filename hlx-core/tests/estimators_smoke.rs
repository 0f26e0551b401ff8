//! Sanity check that the two estimator registries behave independently
//! per-symbol and agree on a simple, realistic market scenario when used
//! together the way the Coordinator's caller would.

use hlx_core::estimators::{DepthSample, DepthSide, LrcConfig, LrcRegistry, SrConfig, SrRegistry};

#[test]
fn lrc_and_sr_registries_track_separate_symbols_independently() {
    let lrc = LrcRegistry::new(LrcConfig { len: 5, k: 1.0, flat_threshold: 1.0, dev_multiplier: 2.0 });
    let sr = SrRegistry::new(SrConfig { refresh_ms: 0, ..Default::default() });

    for i in 0..5 {
        lrc.update("BTC", Some(50_000.0 + i as f64 * 10.0));
        lrc.update("ETH", Some(3_000.0));
    }

    let btc_trend = lrc.update("BTC", Some(50_050.0));
    let eth_trend = lrc.update("ETH", Some(3_000.0));
    assert!(btc_trend.ready);
    assert!(eth_trend.ready);
    assert!(btc_trend.slope.unwrap() > 0.0, "BTC mid is trending up");
    assert_eq!(eth_trend.slope.unwrap(), 0.0, "ETH mid is flat");

    for i in 0..5 {
        sr.push_sample("BTC", DepthSample { ts_ms: 0, price: 49_900.0 + i as f64, size: 10.0, side: DepthSide::Bid });
        sr.push_sample("BTC", DepthSample { ts_ms: 0, price: 50_200.0 + i as f64, size: 10.0, side: DepthSide::Ask });
    }
    let btc_bands = sr.refresh("BTC", 50_000.0, 1_000);
    let eth_bands = sr.refresh("ETH", 3_000.0, 1_000);

    assert!(btc_bands.ready);
    assert!(!eth_bands.ready, "ETH never received any depth samples");
}
