//! A partial fill from the exchange must be classified `Partial`, its
//! remaining size recorded in the persistent partial-fill lock, and a
//! second decision while that lock is live must be rejected.

mod common;

use hlx_core::coordinator::{CoordinatorConfig, DecisionPayload, HandleContext, MarketSnapshot, WsState};
use hlx_core::order::types::{Aggressiveness, Intent, OrderStatus, Side, TimeInForce};
use hlx_core::safety::SafetySupervisor;
use hlx_core::sender::{Sender, SenderConfig};
use hlx_core::signer::{SignerClient, SignerConfig};
use hlx_core::store::PersistentStore;
use hlx_core::{confirm::Confirmer, coordinator::Coordinator};
use hyper::StatusCode;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tempfile::NamedTempFile;

fn payload(decision_id: &str) -> DecisionPayload {
    DecisionPayload {
        decision_id: Some(decision_id.to_string()),
        timestamp_ms: 1_000,
        side: Side::Sell,
        size: dec!(1.0),
        coin: "BTC".to_string(),
        market: MarketSnapshot { mid: Some(dec!(50_000)), bid: None, ask: None },
        price: None,
        intent: Some(Intent::Exit),
        open_position: None,
        risk_allocation: None,
        aggressiveness: Aggressiveness::Normal,
        tif: TimeInForce::Gtc,
    }
}

#[tokio::test]
async fn partial_fill_locks_the_remaining_size() {
    let addr = common::spawn_json_server(
        StatusCode::OK,
        serde_json::json!({ "ok": true, "data": { "orderId": "O-1", "filledSize": "0.4" } }),
    )
    .await;

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
    let sender = Sender::new(common::url(addr), SenderConfig { test_mode: false, ..Default::default() });
    let confirmer = Confirmer::new();

    let mut assets = HashMap::new();
    assets.insert("BTC".to_string(), 0u32);
    let coordinator = Coordinator::new(
        CoordinatorConfig::default(),
        assets,
        safety,
        store.clone(),
        signer,
        sender,
        confirmer,
    );

    let ctx = HandleContext { ws_state: WsState::Live, mode: "test".to_string() };
    let result = coordinator.handle(payload("partial-1"), ctx.clone()).await;

    assert_eq!(result.status, OrderStatus::Partial);
    assert_eq!(result.remaining_size, Some(dec!(0.6)));

    let lock = store.get_partial_lock().unwrap().expect("partial lock must be persisted");
    assert_eq!(lock.remaining_size, dec!(0.6));

    // A second, distinct decision while the lock is still within its TTL is rejected.
    let second = coordinator.handle(payload("partial-2"), ctx).await;
    assert_eq!(second.status, OrderStatus::Error);
    assert!(second.error.unwrap_or_default().starts_with("partial_fill_pending"));
}
