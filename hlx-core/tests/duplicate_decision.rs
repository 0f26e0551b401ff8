//! End-to-end: the same decision submitted twice through the Coordinator
//! must be executed once and rejected as a duplicate the second time,
//! without a second round of side effects.

mod common;

use hlx_core::prelude::*;
use hlx_core::coordinator::{CoordinatorConfig, DecisionPayload, HandleContext, MarketSnapshot, WsState};
use hlx_core::order::types::{Aggressiveness, Intent, OrderStatus, Side, TimeInForce};
use hlx_core::sender::{Sender, SenderConfig};
use hlx_core::signer::{SignerClient, SignerConfig};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tempfile::NamedTempFile;

fn sample_payload() -> DecisionPayload {
    DecisionPayload {
        decision_id: Some("duplicate-test-1".to_string()),
        timestamp_ms: 1_000,
        side: Side::Buy,
        size: dec!(1.0),
        coin: "BTC".to_string(),
        market: MarketSnapshot { mid: Some(dec!(50_000)), bid: None, ask: None },
        price: None,
        intent: Some(Intent::Entry),
        open_position: None,
        risk_allocation: None,
        aggressiveness: Aggressiveness::Normal,
        tif: TimeInForce::Gtc,
    }
}

#[tokio::test]
async fn resubmitting_the_same_decision_id_is_rejected() {
    let file = NamedTempFile::new().unwrap();
    std::fs::remove_file(file.path()).ok();
    let store = PersistentStore::spawn(file.path()).unwrap();
    let safety = SafetySupervisor::new();

    let signer = SignerClient::new(
        "http://127.0.0.1:1",
        "0xagent",
        vec!["BTC".to_string()],
        SignerConfig { dry_run: true, ..Default::default() },
        store.clone(),
        safety.clone(),
    );
    let sender = Sender::new("http://127.0.0.1:1", SenderConfig { test_mode: true, ..Default::default() });
    let confirmer = hlx_core::confirm::Confirmer::new();

    let mut assets = HashMap::new();
    assets.insert("BTC".to_string(), 0u32);
    let coordinator = Coordinator::new(CoordinatorConfig::default(), assets, safety, store, signer, sender, confirmer);

    let ctx = HandleContext { ws_state: WsState::Live, mode: "test".to_string() };

    let first = coordinator.handle(sample_payload(), ctx.clone()).await;
    assert_eq!(first.status, OrderStatus::Filled);

    let second = coordinator.handle(sample_payload(), ctx).await;
    assert_eq!(second.status, OrderStatus::Expired);
    assert!(coordinator.safety().is_live_enabled(), "a duplicate decision must not halt live trading");
}
