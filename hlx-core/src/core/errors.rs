//! The executor's error taxonomy.
//!
//! Every failure on the order path is converted into one of these variants
//! before it reaches the Coordinator's caller; none of them escape as a raw
//! `reqwest`/`io`/`serde_json` error past the component boundary.

use std::fmt;

/// A venue API error as surfaced by the Sender, prior to fatal-reject classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Sum type covering every failure mode on the build→sign→send→confirm path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Market data context reports the feed as stale or lost.
    WsError,
    /// A payload or order invariant was violated (non-finite/non-positive size or price, empty symbol).
    IoError(String),
    /// The built order failed post-build validation.
    OrderBuildError(String),
    /// Persisting the idempotency-key claim failed.
    DedupPersistError(String),
    /// The decision's clientOrderId was already processed.
    DuplicateDecision,
    /// The (agentAddress, nonce) pair was already claimed.
    DuplicateNonce,
    /// The signer was unreachable, timed out, or returned an undecodable response after retries.
    SignError(String),
    /// The signer returned a syntactically invalid signature. Never retried.
    InvalidSignature(String),
    /// Safety is not live at sign or send time.
    LiveDisabled,
    /// The symbol is not present in the live allow-list.
    CoinNotEnabled(String),
    /// A live send was attempted without a signature.
    MissingSignature,
    /// The exchange returned a non-ok response after retries.
    ApiError(ApiError),
    /// The exchange rejected the order outright (unauthorized, bad signature, or a rejected status).
    HlReject(String),
    /// Persisting the partial-fill lock failed.
    PartialLockError(String),
    /// The external balance-sync hook failed.
    BalanceSyncError(String),
    /// An active partial-fill lock is still within its TTL.
    PartialFillPending(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::WsError => write!(f, "market data stale or lost"),
            ExecError::IoError(reason) => write!(f, "invalid payload: {}", reason),
            ExecError::OrderBuildError(reason) => write!(f, "order build failed: {}", reason),
            ExecError::DedupPersistError(reason) => {
                write!(f, "idempotency key persist failed: {}", reason)
            }
            ExecError::DuplicateDecision => write!(f, "duplicate decision"),
            ExecError::DuplicateNonce => write!(f, "duplicate_nonce"),
            ExecError::SignError(reason) => write!(f, "sign failed: {}", reason),
            ExecError::InvalidSignature(reason) => write!(f, "invalid signature: {}", reason),
            ExecError::LiveDisabled => write!(f, "safety halted"),
            ExecError::CoinNotEnabled(coin) => write!(f, "coin not enabled: {}", coin),
            ExecError::MissingSignature => write!(f, "missing signature"),
            ExecError::ApiError(e) => write!(f, "api error: {}", e),
            ExecError::HlReject(reason) => write!(f, "hl_reject: {}", reason),
            ExecError::PartialLockError(reason) => {
                write!(f, "partial lock persist failed: {}", reason)
            }
            ExecError::BalanceSyncError(reason) => write!(f, "balance sync failed: {}", reason),
            ExecError::PartialFillPending(order_id) => {
                write!(f, "partial_fill_pending: {}", order_id)
            }
        }
    }
}

impl std::error::Error for ExecError {}

impl ExecError {
    /// The Safety-Halt reason this error should trigger, if any.
    ///
    /// `None` means the error is returned to the caller without a state transition
    /// (duplicate decision, live-disabled, coin not enabled, missing signature, partial fill pending).
    pub fn halt_reason(&self) -> Option<&'static str> {
        match self {
            ExecError::WsError => Some("ws_error"),
            ExecError::IoError(_) => Some("io_error"),
            ExecError::OrderBuildError(_) => Some("order_build_error"),
            ExecError::DedupPersistError(_) => Some("dedup_persist_error"),
            ExecError::SignError(_) => Some("sign_error"),
            ExecError::InvalidSignature(_) => Some("invalid_signature"),
            ExecError::ApiError(_) => Some("api_error"),
            ExecError::HlReject(_) => Some("hl_reject"),
            ExecError::PartialLockError(_) => Some("partial_lock_error"),
            ExecError::BalanceSyncError(_) => Some("balance_sync_error"),
            ExecError::DuplicateDecision
            | ExecError::DuplicateNonce
            | ExecError::LiveDisabled
            | ExecError::CoinNotEnabled(_)
            | ExecError::MissingSignature
            | ExecError::PartialFillPending(_) => None,
        }
    }

    /// Whether the two highest-severity reasons should notify the external alert sink.
    pub fn wants_alert(&self) -> bool {
        matches!(self, ExecError::HlReject(_) | ExecError::InvalidSignature(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_spec_strings() {
        assert_eq!(ExecError::LiveDisabled.to_string(), "safety halted");
        assert_eq!(
            ExecError::PartialFillPending("O7".into()).to_string(),
            "partial_fill_pending: O7"
        );
    }

    #[test]
    fn halt_reason_covers_taxonomy() {
        assert_eq!(ExecError::WsError.halt_reason(), Some("ws_error"));
        assert_eq!(ExecError::DuplicateDecision.halt_reason(), None);
        assert_eq!(ExecError::CoinNotEnabled("DOGE".into()).halt_reason(), None);
    }

    #[test]
    fn hl_reject_wants_alert() {
        assert!(ExecError::HlReject("rejected".into()).wants_alert());
        assert!(!ExecError::ApiError(ApiError {
            code: "RATE_LIMIT".into(),
            message: "slow down".into()
        })
        .wants_alert());
    }

    #[test]
    fn invalid_signature_wants_alert_and_halts() {
        let err = ExecError::InvalidSignature("malformed".into());
        assert!(err.wants_alert());
        assert_eq!(err.halt_reason(), Some("invalid_signature"));
    }
}
