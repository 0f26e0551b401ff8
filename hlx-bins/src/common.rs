//! Common utilities shared by the executor binaries: tracing setup driven
//! by the loaded [`hlx_core::config::Config`] rather than a bare CLI flag,
//! since `LOG_LEVEL`/`JSON_LOGS` are environment configuration here.

use anyhow::Result;

/// Initialize tracing the same way the rest of `hlx-core` does, so binaries
/// and library code share one subscriber setup.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    hlx_core::utils::init_logger(level, json);
    Ok(())
}
