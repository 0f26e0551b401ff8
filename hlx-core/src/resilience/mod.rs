//! Process-level resilience utilities shared by the executor binaries.
//!
//! Signal-driven shutdown and panic logging live here; the order-path
//! failure state machine lives in [`crate::safety`] instead, since it
//! tracks a domain-specific reason taxonomy rather than a generic
//! failure/success ratio.

pub mod kill_switch;
pub mod panic;

pub use kill_switch::{KillSwitch, KillSwitchState};
pub use panic::install_panic_handler;
