//! Shared types for the executor: the error taxonomy and nothing else.
//!
//! Order/Fill/Side/TIF types live in [`crate::order::types`] since they are
//! owned by the build→sign→send→confirm pipeline, not ambient infrastructure.

pub mod errors;

pub use errors::{ApiError, ExecError};
