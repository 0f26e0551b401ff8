//! Small shared helpers that don't belong to any single component.

pub mod logger;

pub use logger::init_logger;
