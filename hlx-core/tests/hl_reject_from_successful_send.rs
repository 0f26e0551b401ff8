//! A `{ok: true, data: {status: "rejected"}}` response is a successful send
//! that the venue still refused; it must classify as `Rejected` and trip the
//! same `hl_reject` Safety-Halt as a fatal send-time rejection.

mod common;

use hlx_core::confirm::Confirmer;
use hlx_core::coordinator::{Coordinator, CoordinatorConfig, DecisionPayload, HandleContext, MarketSnapshot, WsState};
use hlx_core::order::types::{Aggressiveness, Intent, OrderStatus, Side, TimeInForce};
use hlx_core::safety::{self, SafetySupervisor};
use hlx_core::sender::{Sender, SenderConfig};
use hlx_core::signer::{SignerClient, SignerConfig};
use hlx_core::store::PersistentStore;
use hyper::StatusCode;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tempfile::NamedTempFile;

fn payload() -> DecisionPayload {
    DecisionPayload {
        decision_id: Some("D1".to_string()),
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
async fn venue_rejected_status_on_a_successful_send_halts_live_trading() {
    let addr = common::spawn_json_server(
        StatusCode::OK,
        serde_json::json!({ "ok": true, "data": { "status": "rejected", "reason": "insufficient margin" } }),
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
    let coordinator =
        Coordinator::new(CoordinatorConfig::default(), assets, safety, store, signer, sender, confirmer);

    let ctx = HandleContext { ws_state: WsState::Live, mode: "test".to_string() };
    let result = coordinator.handle(payload(), ctx).await;

    assert_eq!(result.status, OrderStatus::Rejected);
    assert!(!coordinator.safety().is_live_enabled());
    assert_eq!(
        coordinator.safety().snapshot().last_halt_reason.as_deref(),
        Some(safety::REASON_HL_REJECT)
    );
}
