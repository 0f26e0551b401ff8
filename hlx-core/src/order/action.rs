//! Encoding a built [`Order`] into the exact action object that is signed
//! and sent. Deterministic and pure: no clocks, no RNG, no hidden state.
//!
//! Grounded on the reference HyperliquidMM exchange client's `float_to_wire`
//! helper, generalized from `f64` to [`rust_decimal::Decimal`] so the
//! 8-decimal rounding this produces is exact rather than float-approximate.

use crate::order::types::{Aggressiveness, Intent, Order, Side, TimeInForce};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A single child order inside the action envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildOrder {
    pub asset: u32,
    #[serde(rename = "isBuy")]
    pub is_buy: bool,
    #[serde(rename = "limitPx")]
    pub limit_px: String,
    pub sz: String,
    #[serde(rename = "reduceOnly")]
    pub reduce_only: bool,
    #[serde(rename = "orderType")]
    pub order_type: OrderTypeWire,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTypeWire {
    pub limit: LimitWire,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitWire {
    pub tif: String,
}

/// The byte-exact object signed and sent. `type` is always `"order"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HLAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub orders: Vec<ChildOrder>,
    pub grouping: String,
}

/// Render a [`Decimal`] the way the venue expects: rounded to 8 places,
/// trailing zeros and a bare trailing `.` stripped, never scientific notation.
pub fn decimal_string(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero);
    let s = rounded.normalize().to_string();
    if s.contains('e') || s.contains('E') {
        // normalize() never emits exponents for Decimal, but guard anyway.
        return format!("{:.8}", rounded)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string();
    }
    s
}

/// Split count per §4.6: exits are never split; entries split by aggressiveness.
fn split_count(intent: Intent, aggressiveness: Aggressiveness) -> u32 {
    if matches!(intent, Intent::Exit) {
        return 1;
    }
    let n = match aggressiveness {
        Aggressiveness::Low => 3,
        Aggressiveness::Normal => 2,
        Aggressiveness::High => 1,
    };
    n.clamp(1, 5)
}

/// Equal-unit split with any positive remainder appended as a final slice.
fn split_sizes(total: Decimal, count: u32) -> Vec<Decimal> {
    if count <= 1 {
        return vec![total];
    }
    let count_dec = Decimal::from(count);
    let unit = (total / count_dec).round_dp_with_strategy(8, RoundingStrategy::ToZero);
    let mut sizes = vec![unit; (count - 1) as usize];
    let allocated: Decimal = sizes.iter().copied().sum();
    let remainder = (total - allocated).round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero);
    sizes.push(remainder);
    sizes.retain(|s| *s > Decimal::ZERO);
    if sizes.is_empty() {
        sizes.push(total);
    }
    sizes
}

fn tif_wire(tif: TimeInForce) -> String {
    tif.to_string()
}

/// Build the action envelope for `order` against `coin`'s asset index.
pub fn encode(order: &Order, asset: u32) -> HLAction {
    let count = split_count(order.intent, order.aggressiveness);
    let sizes = split_sizes(order.size, count);
    let is_buy = order.side.is_buy();
    let reduce_only = order.reduce_only();
    let limit_px = decimal_string(order.price);
    let tif = tif_wire(order.tif);

    let orders = sizes
        .into_iter()
        .map(|sz| ChildOrder {
            asset,
            is_buy,
            limit_px: limit_px.clone(),
            sz: decimal_string(sz),
            reduce_only,
            order_type: OrderTypeWire {
                limit: LimitWire { tif: tif.clone() },
            },
        })
        .collect();

    HLAction {
        action_type: "order".to_string(),
        orders,
        grouping: "na".to_string(),
    }
}

/// Sum of a decoded action's child sizes, for the sum-to-`order.size` property test.
pub fn total_size(action: &HLAction) -> Decimal {
    action
        .orders
        .iter()
        .filter_map(|o| o.sz.parse::<Decimal>().ok())
        .sum()
}

#[allow(dead_code)]
fn as_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::types::ClientOrderId;
    use rust_decimal_macros::dec;

    fn order(intent: Intent, aggressiveness: Aggressiveness, size: Decimal) -> Order {
        Order {
            client_order_id: ClientOrderId::new("D1"),
            symbol: "BTC".into(),
            side: Side::Buy,
            size,
            price: dec!(50_000.123456789),
            tif: TimeInForce::Gtc,
            intent,
            aggressiveness,
        }
    }

    #[test]
    fn decimal_string_rounds_and_strips_zeros() {
        assert_eq!(decimal_string(dec!(0.100000000)), "0.1");
        assert_eq!(decimal_string(dec!(50000)), "50000");
        assert_eq!(decimal_string(dec!(0.123456789)), "0.12345679");
    }

    #[test]
    fn exit_intent_never_splits() {
        let o = order(Intent::Exit, Aggressiveness::Low, dec!(1.0));
        let action = encode(&o, 0);
        assert_eq!(action.orders.len(), 1);
        assert!(action.orders[0].reduce_only);
    }

    #[test]
    fn low_aggressiveness_splits_three() {
        let o = order(Intent::Entry, Aggressiveness::Low, dec!(0.3));
        let action = encode(&o, 0);
        assert_eq!(action.orders.len(), 3);
        assert_eq!(total_size(&action), dec!(0.3));
    }

    #[test]
    fn normal_aggressiveness_splits_two() {
        let o = order(Intent::Entry, Aggressiveness::Normal, dec!(1.0));
        let action = encode(&o, 0);
        assert_eq!(action.orders.len(), 2);
        assert_eq!(total_size(&action), dec!(1.0));
    }

    #[test]
    fn high_aggressiveness_does_not_split() {
        let o = order(Intent::Entry, Aggressiveness::High, dec!(1.0));
        let action = encode(&o, 0);
        assert_eq!(action.orders.len(), 1);
    }

    #[test]
    fn action_envelope_shape() {
        let o = order(Intent::Entry, Aggressiveness::Normal, dec!(0.5));
        let action = encode(&o, 3);
        assert_eq!(action.action_type, "order");
        assert_eq!(action.grouping, "na");
        assert_eq!(action.orders[0].asset, 3);
        assert!(action.orders[0].is_buy);
        assert_eq!(action.orders[0].order_type.limit.tif, "Gtc");
    }

    #[test]
    fn encode_is_deterministic() {
        let o = order(Intent::Entry, Aggressiveness::Normal, dec!(0.333333333));
        let a = encode(&o, 1);
        let b = encode(&o, 1);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
