//! Persistent State Store: the durable record of the next nonce, the set
//! of processed idempotency keys, and the optional partial-fill lock.
//!
//! Implemented as an actor on its own `std::thread` with a single-writer
//! journal discipline: one thread holds the only mutable handle to the
//! state file, callers send typed messages over an `mpsc::Sender` and
//! block on a per-call reply channel, never on each other's requests.

use crate::order::types::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{error, warn};

/// A persisted record of an outstanding partial fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialLock {
    pub order_id: String,
    pub remaining_size: Decimal,
    pub side: Side,
    pub price: Option<Decimal>,
    pub ts_ms: u64,
}

impl PartialLock {
    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.ts_ms) >= ttl_ms
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    current_nonce: u64,
    processed_keys: HashSet<String>,
    partial_lock: Option<PartialLock>,
}

impl StoreState {
    /// Drop malformed persisted records rather than fail to start.
    fn sanitize(mut self) -> Self {
        if let Some(lock) = &self.partial_lock {
            if lock.order_id.trim().is_empty() || lock.remaining_size < Decimal::ZERO {
                warn!("dropping malformed partial lock record at startup");
                self.partial_lock = None;
            }
        }
        self
    }
}

enum StoreMessage {
    AllocateNonce(mpsc::Sender<Result<u64, String>>),
    ResetNonce(mpsc::Sender<Result<(), String>>),
    ClaimProcessedKey(String, mpsc::Sender<Result<bool, String>>),
    HasProcessedKey(String, mpsc::Sender<bool>),
    SetPartialLock(PartialLock, mpsc::Sender<Result<(), String>>),
    ClearPartialLock(mpsc::Sender<Result<(), String>>),
    GetPartialLock(mpsc::Sender<Option<PartialLock>>),
}

/// A cheaply-cloneable client handle to the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreMessage>,
}

impl StoreHandle {
    pub fn allocate_nonce(&self) -> Result<u64, String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StoreMessage::AllocateNonce(reply_tx))?;
        reply_rx.recv().map_err(|e| e.to_string())?
    }

    pub fn reset_nonce(&self) -> Result<(), String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StoreMessage::ResetNonce(reply_tx))?;
        reply_rx.recv().map_err(|e| e.to_string())?
    }

    pub fn claim_processed_key(&self, key: impl Into<String>) -> Result<bool, String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StoreMessage::ClaimProcessedKey(key.into(), reply_tx))?;
        reply_rx.recv().map_err(|e| e.to_string())?
    }

    pub fn has_processed_key(&self, key: impl Into<String>) -> Result<bool, String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StoreMessage::HasProcessedKey(key.into(), reply_tx))?;
        reply_rx.recv().map_err(|e| e.to_string())
    }

    pub fn set_partial_lock(&self, lock: PartialLock) -> Result<(), String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StoreMessage::SetPartialLock(lock, reply_tx))?;
        reply_rx.recv().map_err(|e| e.to_string())?
    }

    pub fn clear_partial_lock(&self) -> Result<(), String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StoreMessage::ClearPartialLock(reply_tx))?;
        reply_rx.recv().map_err(|e| e.to_string())?
    }

    pub fn get_partial_lock(&self) -> Result<Option<PartialLock>, String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StoreMessage::GetPartialLock(reply_tx))?;
        reply_rx.recv().map_err(|e| e.to_string())
    }

    fn send(&self, msg: StoreMessage) -> Result<(), String> {
        self.tx.send(msg).map_err(|_| "store actor has shut down".to_string())
    }
}

/// Spawns the store actor thread and returns a handle to it.
pub struct PersistentStore;

impl PersistentStore {
    /// Reads the state file if present (sanitizing malformed records),
    /// spawns the writer thread, and returns a cloneable handle.
    pub fn spawn(path: impl AsRef<Path>) -> std::io::Result<StoreHandle> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let initial = load_state(&path)?;

        let (tx, rx) = mpsc::channel::<StoreMessage>();

        std::thread::Builder::new()
            .name("hlx-store".into())
            .spawn(move || run_actor(path, initial, rx))
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        Ok(StoreHandle { tx })
    }
}

fn load_state(path: &Path) -> std::io::Result<StoreState> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let state: StoreState = serde_json::from_str(&contents).unwrap_or_default();
            Ok(state.sanitize())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreState::default()),
        Err(e) => Err(e),
    }
}

fn persist(path: &Path, state: &StoreState) -> Result<(), String> {
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(state).map_err(|e| e.to_string())?;
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| e.to_string())?;
        file.write_all(json.as_bytes()).map_err(|e| e.to_string())?;
        file.sync_all().map_err(|e| e.to_string())?;
    }
    fs::rename(&tmp_path, path).map_err(|e| e.to_string())
}

fn run_actor(path: PathBuf, mut state: StoreState, rx: mpsc::Receiver<StoreMessage>) {
    for msg in rx {
        match msg {
            StoreMessage::AllocateNonce(reply) => {
                let nonce = state.current_nonce;
                state.current_nonce = state.current_nonce.saturating_add(1);
                let result = persist(&path, &state).map(|_| nonce);
                if let Err(e) = &result {
                    error!("nonce persist failed: {}", e);
                }
                let _ = reply.send(result);
            }
            StoreMessage::ResetNonce(reply) => {
                state.current_nonce = 0;
                let result = persist(&path, &state);
                let _ = reply.send(result);
            }
            StoreMessage::ClaimProcessedKey(key, reply) => {
                let newly_claimed = state.processed_keys.insert(key);
                let result = if newly_claimed {
                    persist(&path, &state).map(|_| true)
                } else {
                    Ok(false)
                };
                if let Err(e) = &result {
                    error!("idempotency key persist failed: {}", e);
                }
                let _ = reply.send(result);
            }
            StoreMessage::HasProcessedKey(key, reply) => {
                let _ = reply.send(state.processed_keys.contains(&key));
            }
            StoreMessage::SetPartialLock(lock, reply) => {
                state.partial_lock = Some(lock);
                let result = persist(&path, &state);
                let _ = reply.send(result);
            }
            StoreMessage::ClearPartialLock(reply) => {
                state.partial_lock = None;
                let result = persist(&path, &state);
                let _ = reply.send(result);
            }
            StoreMessage::GetPartialLock(reply) => {
                let _ = reply.send(state.partial_lock.clone());
            }
        }
    }
}
