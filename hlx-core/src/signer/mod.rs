//! Signer Client: turns a built [`Order`] into a signed `{action, nonce,
//! signature}` triple by delegating the signature itself to an external
//! adapter process over HTTP.
//!
//! Same timeout + linear-backoff retry-loop shape used for venue REST
//! calls, generalized to the signer adapter's narrower contract. Nonce
//! allocation and per-nonce
//! idempotency both go through the [`crate::store`] actor so a crash
//! mid-retry can never produce two distinct signatures for one nonce.

use crate::core::errors::ExecError;
use crate::order::action::{encode, HLAction};
use crate::order::types::Order;
use crate::safety::{self, SafetySupervisor};
use crate::store::StoreHandle;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct SignerConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub dry_run: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2500,
            max_retries: 3,
            retry_delay_ms: 250,
            dry_run: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    action: &'a HLAction,
    nonce: u64,
    #[serde(rename = "vaultAddress")]
    vault_address: Option<String>,
    #[serde(rename = "expiresAfter")]
    expires_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

/// A signed, nonce-stamped action ready for the Sender.
#[derive(Debug, Clone)]
pub struct SignedAction {
    pub action: HLAction,
    pub nonce: u64,
    pub signature: String,
    pub agent_address: String,
}

pub struct SignerClient {
    http: Client,
    adapter_url: String,
    agent_address: String,
    live_coins: Vec<String>,
    config: SignerConfig,
    store: StoreHandle,
    safety: SafetySupervisor,
}

impl SignerClient {
    pub fn new(
        adapter_url: impl Into<String>,
        agent_address: impl Into<String>,
        live_coins: Vec<String>,
        config: SignerConfig,
        store: StoreHandle,
        safety: SafetySupervisor,
    ) -> Self {
        Self {
            http: Client::new(),
            adapter_url: adapter_url.into(),
            agent_address: agent_address.into(),
            live_coins,
            config,
            store,
            safety,
        }
    }

    fn coin_enabled(&self, symbol: &str) -> bool {
        self.live_coins.iter().any(|c| c == symbol)
    }

    /// Build, allocate a nonce, claim idempotency, and sign. Short-circuits
    /// with a deterministic mock signature in dry-run/test mode without any
    /// network call.
    pub async fn sign(&self, order: &Order, asset: u32) -> Result<SignedAction, ExecError> {
        if !self.safety.is_live_enabled() {
            return Err(ExecError::LiveDisabled);
        }
        if !self.coin_enabled(&order.symbol) {
            return Err(ExecError::CoinNotEnabled(order.symbol.clone()));
        }

        let action = encode(order, asset);

        let nonce = self
            .store
            .allocate_nonce()
            .map_err(ExecError::DedupPersistError)?;

        let idempotency_key = format!("nonce:{}_{}", self.agent_address, nonce);
        let newly_claimed = self
            .store
            .claim_processed_key(idempotency_key)
            .map_err(ExecError::DedupPersistError)?;
        if !newly_claimed {
            return Err(ExecError::DuplicateNonce);
        }

        if self.config.dry_run {
            self.safety.record_signer_success();
            return Ok(SignedAction {
                action,
                nonce,
                signature: mock_signature(nonce),
                agent_address: self.agent_address.clone(),
            });
        }

        match self.sign_with_retries(&action, nonce).await {
            Ok(signature) => {
                self.safety.record_signer_success();
                Ok(SignedAction {
                    action,
                    nonce,
                    signature,
                    agent_address: self.agent_address.clone(),
                })
            }
            Err(SignAttemptError::Invalid(reason)) => {
                // A malformed signature is never a transient condition; halt on the
                // first occurrence rather than counting it toward the signer-error threshold.
                self.safety.trigger(safety::REASON_INVALID_SIGNATURE, &reason, "signer_client");
                Err(ExecError::InvalidSignature(reason))
            }
            Err(SignAttemptError::Transport(reason)) => {
                self.safety.record_signer_error();
                Err(ExecError::SignError(reason))
            }
        }
    }

    async fn sign_with_retries(&self, action: &HLAction, nonce: u64) -> Result<String, SignAttemptError> {
        let body = SignRequest {
            action,
            nonce,
            vault_address: None,
            expires_after: None,
        };

        let mut last_err = String::new();
        for attempt in 1..=self.config.max_retries.max(1) {
            let result = self
                .http
                .post(&self.adapter_url)
                .timeout(Duration::from_millis(self.config.timeout_ms))
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => match resp.json::<SignResponse>().await {
                    Ok(parsed) => {
                        if is_valid_signature(&parsed.signature) {
                            return Ok(parsed.signature);
                        }
                        return Err(SignAttemptError::Invalid(format!(
                            "signer returned malformed signature: {}",
                            parsed.signature
                        )));
                    }
                    Err(e) => last_err = format!("failed to decode signer response: {}", e),
                },
                Ok(resp) => last_err = format!("signer adapter returned status {}", resp.status()),
                Err(e) => last_err = format!("signer adapter request failed: {}", e),
            }

            if attempt < self.config.max_retries {
                warn!(attempt, error = %last_err, "signer attempt failed, retrying");
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms * attempt as u64)).await;
            }
        }
        Err(SignAttemptError::Transport(last_err))
    }
}

/// A malformed signature fails the sign step immediately; a transport/decode
/// failure is retried up to `max_retries` before giving up.
enum SignAttemptError {
    Invalid(String),
    Transport(String),
}

fn mock_signature(nonce: u64) -> String {
    format!("0x{:0>130}1b", format!("{:x}", nonce))
}

/// `0x` + 130 hex chars (65 bytes: r, s, v) with `v` as `1b`/`1c`.
fn is_valid_signature(sig: &str) -> bool {
    let Some(body) = sig.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 130 {
        return false;
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    matches!(&body[128..130], "1b" | "1c")
}
