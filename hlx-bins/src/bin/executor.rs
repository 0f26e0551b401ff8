//! hlx-executor: the long-running daemon. Wires the Persistent Store, Safety
//! Supervisor, Signer Client, Sender, Confirmer, and Coordinator together,
//! starts the Prometheus/health server, and serves decision payloads over a
//! small HTTP endpoint (`POST /decide`) for the upstream decision process.
//!
//! The upstream decision transport is not specified upstream of this crate
//! (see DESIGN.md); HTTP was chosen to match the rest of the executor's
//! collaborators (Signer, Sender) rather than inventing a bespoke queue.

use anyhow::{Context, Result};
use hlx_bins::common::init_logging;
use hlx_core::confirm::Confirmer;
use hlx_core::config::Config;
use hlx_core::coordinator::{
    Coordinator, CoordinatorConfig, DecisionPayload, HandleContext, MarketSnapshot, OpenPosition, WsState,
};
use hlx_core::logger::EventLogger;
use hlx_core::monitoring::{Alert, AlertCategory, AlertManager, AlertManagerConfig, AlertSeverity, MetricsRegistry, MetricsServer, MetricsServerConfig};
use hlx_core::order::types::{Aggressiveness, Intent, Side, TimeInForce};
use hlx_core::resilience::{install_panic_handler, KillSwitch};
use hlx_core::safety::SafetySupervisor;
use hlx_core::sender::{Sender, SenderConfig};
use hlx_core::signer::{SignerClient, SignerConfig};
use hlx_core::store::PersistentStore;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tracing::{error, info};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wire shape for an inbound decision over `POST /decide`.
#[derive(Debug, Deserialize)]
struct DecideRequest {
    decision_id: Option<String>,
    side: String,
    size: rust_decimal::Decimal,
    coin: String,
    mid: Option<rust_decimal::Decimal>,
    bid: Option<rust_decimal::Decimal>,
    ask: Option<rust_decimal::Decimal>,
    price: Option<rust_decimal::Decimal>,
    intent: Option<String>,
    open_position_side: Option<String>,
    risk_allocation: Option<rust_decimal::Decimal>,
    #[serde(default)]
    aggressiveness: Option<String>,
    #[serde(default)]
    tif: Option<String>,
    #[serde(default)]
    ws_state: Option<String>,
    #[serde(default = "default_mode")]
    mode: String,
}

fn default_mode() -> String {
    "test".to_string()
}

fn parse_intent(raw: &str) -> Option<Intent> {
    match raw.to_ascii_lowercase().as_str() {
        "entry" => Some(Intent::Entry),
        "exit" => Some(Intent::Exit),
        _ => None,
    }
}

fn parse_aggressiveness(raw: &str) -> Aggressiveness {
    match raw.to_ascii_lowercase().as_str() {
        "low" => Aggressiveness::Low,
        "high" => Aggressiveness::High,
        _ => Aggressiveness::Normal,
    }
}

fn parse_tif(raw: &str) -> TimeInForce {
    match raw.to_ascii_lowercase().as_str() {
        "ioc" => TimeInForce::Ioc,
        "alo" => TimeInForce::Alo,
        _ => TimeInForce::Gtc,
    }
}

fn parse_ws_state(raw: Option<&str>) -> WsState {
    match raw.map(|s| s.to_ascii_lowercase()) {
        Some(s) if s == "stale" => WsState::Stale,
        Some(s) if s == "lost" => WsState::Lost,
        _ => WsState::Live,
    }
}

async fn handle_decide(
    coordinator: Arc<Coordinator>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let parsed: DecideRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from(format!("invalid decision payload: {}", e))))
                .unwrap();
        }
    };

    let Some(side) = Side::from_str_lenient(&parsed.side) else {
        return Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Full::new(Bytes::from("side must be \"buy\" or \"sell\"")))
            .unwrap();
    };

    let payload = DecisionPayload {
        decision_id: parsed.decision_id,
        timestamp_ms: now_ms(),
        side,
        size: parsed.size,
        coin: parsed.coin,
        market: MarketSnapshot { mid: parsed.mid, bid: parsed.bid, ask: parsed.ask },
        price: parsed.price,
        intent: parsed.intent.as_deref().and_then(parse_intent),
        open_position: parsed
            .open_position_side
            .as_deref()
            .and_then(Side::from_str_lenient)
            .map(|side| OpenPosition { side }),
        risk_allocation: parsed.risk_allocation,
        aggressiveness: parsed.aggressiveness.as_deref().map(parse_aggressiveness).unwrap_or_default(),
        tif: parsed.tif.as_deref().map(parse_tif).unwrap_or_default(),
    };

    let ctx = HandleContext { ws_state: parse_ws_state(parsed.ws_state.as_deref()), mode: parsed.mode };

    let result = coordinator.handle(payload, ctx).await;

    match serde_json::to_vec(&result) {
        Ok(json) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(json)))
            .unwrap(),
        Err(e) => Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::new(Bytes::from(format!("failed to encode result: {}", e))))
            .unwrap(),
    }
}

async fn route(
    coordinator: Arc<Coordinator>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.uri().path() != "/decide" || req.method() != hyper::Method::POST {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .unwrap());
    }

    let body = req.into_body().collect().await?.to_bytes();
    Ok(handle_decide(coordinator, body).await)
}

async fn serve_decisions(coordinator: Arc<Coordinator>, listen_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(listen_addr).await.context("failed to bind decision endpoint")?;
    info!("decision endpoint listening on http://{}/decide", listen_addr);

    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(c) => c,
            Err(e) => {
                error!("failed to accept decision connection: {}", e);
                continue;
            }
        };
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| route(coordinator.clone(), req));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!("decision connection error from {}: {}", remote, err);
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config.log_level, config.json_logs)?;
    install_panic_handler();
    let kill_switch = KillSwitch::install();

    let store = PersistentStore::spawn(&config.state_file_path).context("failed to start persistent store")?;
    let logger = Arc::new(EventLogger::open(&config.event_log_path).context("failed to open event log")?);
    let metrics = Arc::new(MetricsRegistry::new().context("failed to initialize metrics registry")?);
    let alerts = Arc::new(AlertManager::new(AlertManagerConfig::default()));

    let safety = SafetySupervisor::new()
        .with_logger(logger.clone())
        .with_alerts(alerts.clone())
        .with_metrics(metrics.clone());

    if !config.test_mode {
        alerts.send(Alert::new(
            AlertCategory::System,
            "startup",
            AlertSeverity::Info,
            format!("hlx-executor starting in {} mode", config.mode),
        )).ok();
    }

    let signer = SignerClient::new(
        config.signer_adapter_url.clone(),
        config.agent_address.clone(),
        config.live_enabled_coins.clone(),
        SignerConfig {
            timeout_ms: config.signer_timeout_ms,
            max_retries: config.signer_max_retries,
            retry_delay_ms: config.signer_retry_delay_ms,
            dry_run: config.dry_run,
        },
        store.clone(),
        safety.clone(),
    );

    let sender = Sender::new(
        config.hl_exchange_url(),
        SenderConfig {
            timeout_ms: config.exchange_send_timeout_ms,
            max_retries: config.signer_max_retries,
            retry_delay_ms: config.signer_retry_delay_ms,
            test_mode: config.test_mode,
        },
    );

    let confirmer = Confirmer::new().with_logger(logger.clone());

    let coordinator = Arc::new(
        Coordinator::new(
            CoordinatorConfig { partial_lock_ttl_ms: config.partial_lock_ttl_ms },
            config.asset_ids.clone(),
            safety.clone(),
            store,
            signer,
            sender,
            confirmer,
        )
        .with_logger(logger.clone())
        .with_metrics(metrics.clone()),
        // No balance-resync endpoint is wired in here (see DESIGN.md);
        // `with_sync_balance` is available for a deployment that has one.
    );

    let metrics_server = MetricsServer::new(
        MetricsServerConfig {
            listen_addr: config.metrics_listen_addr.parse().context("invalid METRICS_LISTEN_ADDR")?,
            metrics_path: "/metrics".to_string(),
        },
        metrics.clone(),
    );

    let metrics_task = tokio::spawn(async move {
        if let Err(e) = metrics_server.serve().await {
            error!("metrics server stopped: {}", e);
        }
    });

    let decisions_task = {
        let coordinator = coordinator.clone();
        let listen_addr = config.executor_listen_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_decisions(coordinator, &listen_addr).await {
                error!("decision endpoint stopped: {}", e);
            }
        })
    };

    while !kill_switch.should_stop() {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }

    info!("shutdown requested: {:?}", kill_switch.shutdown_reason());
    metrics_task.abort();
    decisions_task.abort();

    Ok(())
}
