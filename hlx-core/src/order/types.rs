//! Order domain types: the values the Coordinator builds, signs, and sends.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable idempotency key derived from the upstream decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Composite fallback when the decision carries no explicit `decisionId`.
    pub fn composite(ts_ms: u64, side: Side, size: Decimal, price: Decimal) -> Self {
        Self(format!("{}_{}_{}_{}", ts_ms, side, size, price))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientOrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl Side {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// Time-in-force. Exactly the three variants the venue accepts for this system;
/// deliberately not the wider set some order-management code elsewhere supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancel.
    Gtc,
    /// Immediate-or-cancel.
    Ioc,
    /// Add-liquidity-only (post-only).
    Alo,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Gtc
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "Gtc"),
            TimeInForce::Ioc => write!(f, "Ioc"),
            TimeInForce::Alo => write!(f, "Alo"),
        }
    }
}

/// Whether a decision opens or closes exposure. Drives `reduceOnly` and split count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Entry,
    Exit,
}

/// How aggressively to cross the book; drives the Order Builder's split-count choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggressiveness {
    Low,
    Normal,
    High,
}

impl Default for Aggressiveness {
    fn default() -> Self {
        Aggressiveness::Normal
    }
}

/// A single built order, frozen after the risk-allocation step runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub client_order_id: ClientOrderId,
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub tif: TimeInForce,
    pub intent: Intent,
    pub aggressiveness: Aggressiveness,
}

impl Order {
    /// Post-build validation per the Order Builder's contract.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol is empty".into());
        }
        if self.size <= Decimal::ZERO {
            return Err(format!("size must be finite and positive, got {}", self.size));
        }
        if self.price <= Decimal::ZERO {
            return Err(format!("price must be finite and positive, got {}", self.price));
        }
        Ok(())
    }

    pub fn reduce_only(&self) -> bool {
        matches!(self.intent, Intent::Exit)
    }
}

/// Outcome of a confirm step, attached to the `OrderResult` returned from `handle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Partial,
    Expired,
    Rejected,
    Error,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Filled => "filled",
            OrderStatus::Partial => "partial",
            OrderStatus::Expired => "expired",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// The value the Coordinator's `handle` returns to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: Option<String>,
    pub status: OrderStatus,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub filled_size: Option<Decimal>,
    pub remaining_size: Option<Decimal>,
    pub timestamp: u64,
    pub error: Option<String>,
    pub signature: Option<String>,
    pub nonce: Option<u64>,
    pub agent_address: Option<String>,
}

impl OrderResult {
    pub fn error(
        side: Side,
        price: Decimal,
        size: Decimal,
        timestamp: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            order_id: None,
            status: OrderStatus::Error,
            side,
            price,
            size,
            filled_size: None,
            remaining_size: None,
            timestamp,
            error: Some(error.into()),
            signature: None,
            nonce: None,
            agent_address: None,
        }
    }

    pub fn expired(side: Side, price: Decimal, size: Decimal, timestamp: u64) -> Self {
        Self {
            order_id: None,
            status: OrderStatus::Expired,
            side,
            price,
            size,
            filled_size: None,
            remaining_size: None,
            timestamp,
            error: None,
            signature: None,
            nonce: None,
            agent_address: None,
        }
    }
}

/// Execution routing mode. `Live` is the only mode that touches the signer/exchange
/// for real and is subject to the FIFO serialization guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Live,
    Test,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Live => write!(f, "LIVE"),
            ExecutionMode::Test => write!(f, "TEST"),
        }
    }
}

impl ExecutionMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "live" => Some(Self::Live),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order() -> Order {
        Order {
            client_order_id: ClientOrderId::new("D1"),
            symbol: "BTC".into(),
            side: Side::Buy,
            size: dec!(0.01),
            price: dec!(50_000),
            tif: TimeInForce::Gtc,
            intent: Intent::Entry,
            aggressiveness: Aggressiveness::Normal,
        }
    }

    #[test]
    fn valid_order_passes() {
        assert!(sample_order().validate().is_ok());
    }

    #[test]
    fn zero_size_rejected() {
        let mut order = sample_order();
        order.size = Decimal::ZERO;
        assert!(order.validate().is_err());
    }

    #[test]
    fn empty_symbol_rejected() {
        let mut order = sample_order();
        order.symbol = "".into();
        assert!(order.validate().is_err());
    }

    #[test]
    fn exit_intent_is_reduce_only() {
        let mut order = sample_order();
        order.intent = Intent::Exit;
        assert!(order.reduce_only());
        assert!(!sample_order().reduce_only());
    }

    #[test]
    fn tif_display_matches_wire_casing() {
        assert_eq!(TimeInForce::Gtc.to_string(), "Gtc");
        assert_eq!(TimeInForce::Ioc.to_string(), "Ioc");
        assert_eq!(TimeInForce::Alo.to_string(), "Alo");
    }

    #[test]
    fn execution_mode_from_str() {
        assert_eq!(ExecutionMode::from_str("live"), Some(ExecutionMode::Live));
        assert_eq!(ExecutionMode::from_str("test"), Some(ExecutionMode::Test));
        assert_eq!(ExecutionMode::from_str("invalid"), None);
    }
}
