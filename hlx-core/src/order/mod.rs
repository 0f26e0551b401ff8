//! Order domain: the values and pure encoding logic the Coordinator drives
//! through build → sign → send → confirm.

pub mod action;
pub mod types;

pub use action::{decimal_string, encode, total_size, ChildOrder, HLAction};
pub use types::{
    Aggressiveness, ClientOrderId, ExecutionMode, Intent, Order, OrderResult, OrderStatus, Side,
    TimeInForce,
};
