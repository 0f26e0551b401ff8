//! Sender: posts a signed action to the venue and classifies the raw
//! response into `{ok, data}` / `{ok:false, error}`, with a pluggable
//! predicate deciding which API errors are fatal enough to halt live
//! trading.
//!
//! Same retrying-HTTP-client shape as [`crate::signer`], pointed at a
//! different endpoint and response contract.

use crate::core::errors::{ApiError, ExecError};
use crate::order::action::HLAction;
use crate::signer::SignedAction;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub test_mode: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 4000,
            max_retries: 3,
            retry_delay_ms: 250,
            test_mode: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    action: &'a HLAction,
    nonce: u64,
    signature: &'a str,
    #[serde(rename = "vaultAddress")]
    vault_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(default)]
    #[allow(dead_code)]
    cause: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    ok: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub status: String,
    pub data: Option<serde_json::Value>,
}

/// Decides whether an [`ApiError`] is fatal enough to trigger a Safety-Halt.
/// Default: `UNAUTHORIZED` code, or "signature" anywhere in the message.
pub type FatalRejectPredicate = Box<dyn Fn(&ApiError) -> bool + Send + Sync>;

pub fn default_fatal_reject_predicate() -> FatalRejectPredicate {
    Box::new(|err: &ApiError| err.code == "UNAUTHORIZED" || err.message.to_lowercase().contains("signature"))
}

pub struct Sender {
    http: Client,
    exchange_url: String,
    config: SenderConfig,
    fatal_reject: FatalRejectPredicate,
}

impl Sender {
    pub fn new(exchange_url: impl Into<String>, config: SenderConfig) -> Self {
        Self {
            http: Client::new(),
            exchange_url: exchange_url.into(),
            config,
            fatal_reject: default_fatal_reject_predicate(),
        }
    }

    pub fn with_fatal_reject_predicate(mut self, predicate: FatalRejectPredicate) -> Self {
        self.fatal_reject = predicate;
        self
    }

    pub fn is_fatal(&self, err: &ApiError) -> bool {
        (self.fatal_reject)(err)
    }

    pub async fn send(&self, signed: &SignedAction) -> Result<SendOutcome, ExecError> {
        if self.config.test_mode {
            return Ok(SendOutcome {
                status: "dry_run".to_string(),
                data: None,
            });
        }

        let body = SendRequest {
            action: &signed.action,
            nonce: signed.nonce,
            signature: &signed.signature,
            vault_address: None,
        };

        let mut last_err: Option<ApiError> = None;
        for attempt in 1..=self.config.max_retries.max(1) {
            let result = self
                .http
                .post(&self.exchange_url)
                .timeout(Duration::from_millis(self.config.timeout_ms))
                .json(&body)
                .send()
                .await;

            let parsed = match result {
                Ok(resp) => resp.json::<SendResponse>().await,
                Err(e) => {
                    last_err = Some(ApiError {
                        code: "TRANSPORT_ERROR".to_string(),
                        message: e.to_string(),
                    });
                    if attempt < self.config.max_retries {
                        warn!(attempt, "send attempt failed, retrying");
                        tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms * attempt as u64)).await;
                    }
                    continue;
                }
            };

            match parsed {
                Ok(SendResponse { ok: true, data, .. }) => {
                    return Ok(SendOutcome {
                        status: "accepted".to_string(),
                        data,
                    });
                }
                Ok(SendResponse { ok: false, error: Some(body), .. }) => {
                    let api_err = ApiError {
                        code: body.code,
                        message: body.message,
                    };
                    if self.is_fatal(&api_err) {
                        return Err(ExecError::HlReject(api_err.to_string()));
                    }
                    last_err = Some(api_err);
                }
                Ok(_) => {
                    last_err = Some(ApiError {
                        code: "MALFORMED_RESPONSE".to_string(),
                        message: "ok=false with no error body".to_string(),
                    });
                }
                Err(e) => {
                    last_err = Some(ApiError {
                        code: "DECODE_ERROR".to_string(),
                        message: e.to_string(),
                    });
                }
            }

            if attempt < self.config.max_retries {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms * attempt as u64)).await;
            }
        }

        Err(ExecError::ApiError(last_err.unwrap_or(ApiError {
            code: "UNKNOWN".to_string(),
            message: "send failed with no captured error".to_string(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_predicate_flags_unauthorized() {
        let predicate = default_fatal_reject_predicate();
        assert!(predicate(&ApiError {
            code: "UNAUTHORIZED".to_string(),
            message: "nope".to_string()
        }));
    }

    #[test]
    fn default_predicate_flags_signature_message() {
        let predicate = default_fatal_reject_predicate();
        assert!(predicate(&ApiError {
            code: "BAD_REQUEST".to_string(),
            message: "invalid Signature for order".to_string()
        }));
    }

    #[test]
    fn default_predicate_passes_rate_limit() {
        let predicate = default_fatal_reject_predicate();
        assert!(!predicate(&ApiError {
            code: "RATE_LIMIT".to_string(),
            message: "slow down".to_string()
        }));
    }

    #[tokio::test]
    async fn test_mode_short_circuits_without_network() {
        let sender = Sender::new("http://127.0.0.1:1", SenderConfig { test_mode: true, ..Default::default() });
        let signed = SignedAction {
            action: crate::order::action::encode(
                &crate::order::types::Order {
                    client_order_id: crate::order::types::ClientOrderId::new("D1"),
                    symbol: "BTC".to_string(),
                    side: crate::order::types::Side::Buy,
                    size: rust_decimal_macros::dec!(1),
                    price: rust_decimal_macros::dec!(50_000),
                    tif: crate::order::types::TimeInForce::Gtc,
                    intent: crate::order::types::Intent::Entry,
                    aggressiveness: crate::order::types::Aggressiveness::Normal,
                },
                0,
            ),
            nonce: 1,
            signature: "0xdeadbeef".to_string(),
            agent_address: "0xagent".to_string(),
        };
        let outcome = sender.send(&signed).await.unwrap();
        assert_eq!(outcome.status, "dry_run");
    }
}
