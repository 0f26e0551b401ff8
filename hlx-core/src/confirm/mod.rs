//! Confirmer: classifies the Sender's outcome into a terminal [`OrderResult`]
//! and emits the `order.confirmed`/`order.rejected` structured events, plus
//! realized hold-time/PnL when the paired entry/exit prices are known.

use crate::core::errors::ExecError;
use crate::logger::EventLogger;
use crate::order::types::{Order, OrderResult, OrderStatus, Side};
use crate::sender::SendOutcome;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

/// Entry/exit price pair used to compute realized PnL on an exit fill.
#[derive(Debug, Clone, Copy)]
pub struct RoundTrip {
    pub entry_price: Decimal,
    pub entry_ts_ms: u64,
}

pub struct Confirmer {
    logger: Option<Arc<EventLogger>>,
}

impl Confirmer {
    pub fn new() -> Self {
        Self { logger: None }
    }

    pub fn with_logger(mut self, logger: Arc<EventLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// `order_id`, `status`, and `filled_size` come from the venue's accept
    /// payload when present; a venue-reported `rejected`/`denied` status is a
    /// successful send (`ok: true`) that the exchange still refused to work.
    pub fn confirm(
        &self,
        order: &Order,
        nonce: u64,
        signature: &str,
        agent_address: &str,
        outcome: &SendOutcome,
        now_ms: u64,
        round_trip: Option<RoundTrip>,
    ) -> OrderResult {
        let (order_id, venue_status, filled_size) = extract_fill_data(outcome.data.as_ref());

        let status = match outcome.status.as_str() {
            "dry_run" => OrderStatus::Filled,
            _ => classify(venue_status.as_deref(), filled_size, order.size),
        };

        let remaining_size = filled_size.map(|f| (order.size - f).max(Decimal::ZERO));

        let error = match status {
            OrderStatus::Rejected => Some(format!(
                "hl_reject: venue reported status {}",
                venue_status.as_deref().unwrap_or("rejected")
            )),
            _ => None,
        };

        let result = OrderResult {
            order_id: order_id.clone(),
            status,
            side: order.side,
            price: order.price,
            size: order.size,
            filled_size,
            remaining_size,
            timestamp: now_ms,
            error,
            signature: Some(signature.to_string()),
            nonce: Some(nonce),
            agent_address: Some(agent_address.to_string()),
        };

        self.emit_confirmed(order, &result, now_ms, round_trip);
        result
    }

    /// Terminal result for a rejected/failed attempt; no signer/sender round trip succeeded.
    pub fn reject(&self, order: &Order, error: &ExecError, now_ms: u64) -> OrderResult {
        let status = match error {
            ExecError::HlReject(_) => OrderStatus::Rejected,
            _ => OrderStatus::Error,
        };
        let result = OrderResult {
            order_id: None,
            status,
            side: order.side,
            price: order.price,
            size: order.size,
            filled_size: None,
            remaining_size: None,
            timestamp: now_ms,
            error: Some(error.to_string()),
            signature: None,
            nonce: None,
            agent_address: None,
        };

        if let Some(logger) = &self.logger {
            logger.emit(
                "order.rejected",
                serde_json::json!({
                    "symbol": order.symbol,
                    "side": order.side.to_string(),
                    "status": result.status.to_string(),
                    "error": result.error,
                }),
            );
        }

        result
    }

    fn emit_confirmed(&self, order: &Order, result: &OrderResult, now_ms: u64, round_trip: Option<RoundTrip>) {
        let Some(logger) = &self.logger else { return };

        let mut fields = serde_json::json!({
            "order_id": result.order_id,
            "symbol": order.symbol,
            "side": order.side.to_string(),
            "status": result.status.to_string(),
            "filled_size": result.filled_size,
            "remaining_size": result.remaining_size,
        });

        if let Some(rt) = round_trip {
            let hold_time_ms = now_ms.saturating_sub(rt.entry_ts_ms);
            if let Some(pnl) = realized_pnl(order.side, rt.entry_price, order.price, result.filled_size) {
                fields["hold_time_ms"] = Value::from(hold_time_ms);
                fields["realized_pnl"] = Value::from(pnl.to_string());
            }
        }

        logger.emit("order.confirmed", fields);
    }
}

impl Default for Confirmer {
    fn default() -> Self {
        Self::new()
    }
}

/// Status wins when the venue reports one; the size heuristic is only a
/// fallback for venues/mocks that respond with `filled`/`filledSize` alone.
fn classify(status: Option<&str>, filled_size: Option<Decimal>, requested_size: Decimal) -> OrderStatus {
    match status {
        Some("filled") => OrderStatus::Filled,
        Some("partial") => OrderStatus::Partial,
        Some("expired") | Some("canceled") => OrderStatus::Expired,
        Some("rejected") | Some("denied") => OrderStatus::Rejected,
        _ => classify_by_size(filled_size, requested_size),
    }
}

fn classify_by_size(filled_size: Option<Decimal>, requested_size: Decimal) -> OrderStatus {
    match filled_size {
        None => OrderStatus::Expired,
        Some(f) if f <= Decimal::ZERO => OrderStatus::Expired,
        Some(f) if f >= requested_size => OrderStatus::Filled,
        Some(_) => OrderStatus::Partial,
    }
}

fn extract_fill_data(data: Option<&Value>) -> (Option<String>, Option<String>, Option<Decimal>) {
    let Some(data) = data else { return (None, None, None) };
    let order_id = data
        .get("orderId")
        .or_else(|| data.get("order_id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let status = data.get("status").and_then(|v| v.as_str()).map(|s| s.to_lowercase());
    let filled_size = data
        .get("filledSize")
        .or_else(|| data.get("filled_size"))
        .or_else(|| data.get("filled"))
        .and_then(|v| v.as_str().map(|s| s.to_string()).or_else(|| v.as_f64().map(|f| f.to_string())))
        .and_then(|s| s.parse::<Decimal>().ok());
    (order_id, status, filled_size)
}

/// The exit side's realized PnL for a round trip: buy entry → sell exit is
/// `(exit - entry) * size`; sell entry → buy exit is `(entry - exit) * size`.
fn realized_pnl(exit_side: Side, entry_price: Decimal, exit_price: Decimal, size: Option<Decimal>) -> Option<Decimal> {
    let size = size?;
    let diff = match exit_side {
        Side::Sell => exit_price - entry_price,
        Side::Buy => entry_price - exit_price,
    };
    Some(diff * size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::types::{Aggressiveness, ClientOrderId, Intent, TimeInForce};
    use rust_decimal_macros::dec;

    fn order(side: Side, size: Decimal) -> Order {
        Order {
            client_order_id: ClientOrderId::new("D1"),
            symbol: "BTC".into(),
            side,
            size,
            price: dec!(51_000),
            tif: TimeInForce::Gtc,
            intent: Intent::Exit,
            aggressiveness: Aggressiveness::Normal,
        }
    }

    #[test]
    fn full_fill_classified_filled() {
        let confirmer = Confirmer::new();
        let outcome = SendOutcome {
            status: "accepted".to_string(),
            data: Some(serde_json::json!({"orderId": "O1", "filledSize": "1.0"})),
        };
        let result = confirmer.confirm(&order(Side::Sell, dec!(1.0)), 1, "0xsig", "0xagent", &outcome, 1000, None);
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.remaining_size, Some(Decimal::ZERO));
    }

    #[test]
    fn partial_fill_computes_remaining() {
        let confirmer = Confirmer::new();
        let outcome = SendOutcome {
            status: "accepted".to_string(),
            data: Some(serde_json::json!({"orderId": "O1", "filledSize": "0.4"})),
        };
        let result = confirmer.confirm(&order(Side::Sell, dec!(1.0)), 1, "0xsig", "0xagent", &outcome, 1000, None);
        assert_eq!(result.status, OrderStatus::Partial);
        assert_eq!(result.remaining_size, Some(dec!(0.6)));
    }

    #[test]
    fn no_fill_data_classified_expired() {
        let confirmer = Confirmer::new();
        let outcome = SendOutcome {
            status: "accepted".to_string(),
            data: None,
        };
        let result = confirmer.confirm(&order(Side::Buy, dec!(1.0)), 1, "0xsig", "0xagent", &outcome, 1000, None);
        assert_eq!(result.status, OrderStatus::Expired);
    }

    #[test]
    fn status_field_overrides_size_heuristic() {
        let confirmer = Confirmer::new();
        let outcome = SendOutcome {
            status: "accepted".to_string(),
            // `filledSize` alone would read as a full fill; `status: "partial"` wins.
            data: Some(serde_json::json!({"orderId": "O1", "status": "partial", "filledSize": "1.0"})),
        };
        let result = confirmer.confirm(&order(Side::Sell, dec!(1.0)), 1, "0xsig", "0xagent", &outcome, 1000, None);
        assert_eq!(result.status, OrderStatus::Partial);
    }

    #[test]
    fn venue_rejected_status_on_a_successful_send_maps_to_rejected() {
        let confirmer = Confirmer::new();
        let outcome = SendOutcome {
            status: "accepted".to_string(),
            data: Some(serde_json::json!({"status": "rejected", "reason": "insufficient margin"})),
        };
        let result = confirmer.confirm(&order(Side::Buy, dec!(1.0)), 1, "0xsig", "0xagent", &outcome, 1000, None);
        assert_eq!(result.status, OrderStatus::Rejected);
        assert!(result.error.is_some());
    }

    #[test]
    fn reject_maps_hl_reject_to_rejected_status() {
        let confirmer = Confirmer::new();
        let result = confirmer.reject(&order(Side::Buy, dec!(1.0)), &ExecError::HlReject("unauthorized".into()), 1000);
        assert_eq!(result.status, OrderStatus::Rejected);
    }

    #[test]
    fn realized_pnl_for_long_round_trip() {
        let pnl = realized_pnl(Side::Sell, dec!(50_000), dec!(51_000), Some(dec!(2.0)));
        assert_eq!(pnl, Some(dec!(2_000)));
    }

    #[test]
    fn realized_pnl_for_short_round_trip() {
        let pnl = realized_pnl(Side::Buy, dec!(51_000), dec!(50_000), Some(dec!(2.0)));
        assert_eq!(pnl, Some(dec!(2_000)));
    }
}
