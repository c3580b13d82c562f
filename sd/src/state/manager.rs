//! StateManager - mailbox front-end for the statestore worker thread
//!
//! All commands go through one unbounded FIFO consumed by one native thread.
//! A `get` queued after a `set` always observes it, whichever caller issued
//! them.

use std::path::Path;
use std::thread;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use statestore::KvStore;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::messages::{StateCommand, StateError, StateResponse};

/// Handle to send commands to the state store worker
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::UnboundedSender<StateCommand>,
}

impl StateManager {
    /// Open the store at `store_path` and start its worker thread
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "StateManager::spawn: called");
        let store = KvStore::open(store_path.as_ref())?;

        let (tx, rx) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name("state-store".to_string())
            .spawn(move || worker_loop(store, rx))?;

        info!("StateManager spawned");
        Ok(Self { tx })
    }

    /// Read the value stored under `key`
    pub async fn get(&self, key: &str) -> StateResponse<Option<Value>> {
        debug!(%key, "StateManager::get: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Get {
                key: key.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| StateError::Unavailable)?;
        reply_rx.await.map_err(|_| StateError::Unavailable)?
    }

    /// Queue a write of `value` under `key` and return immediately
    ///
    /// Write failures on the worker are logged, not reported.
    pub fn set(&self, key: &str, value: Value) {
        debug!(%key, "StateManager::set: called");
        if self
            .tx
            .send(StateCommand::Set {
                key: key.to_string(),
                value,
            })
            .is_err()
        {
            warn!(%key, "State store worker is gone, dropping write");
        }
    }

    /// Read and deserialize the value stored under `key`
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> StateResponse<Option<T>> {
        debug!(%key, "StateManager::get_as: called");
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StateError::DeserializationError(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Serialize `value` and queue a write under `key`
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> StateResponse<()> {
        debug!(%key, "StateManager::set_as: called");
        let value = serde_json::to_value(value).map_err(|e| StateError::SerializationError(e.to_string()))?;
        self.set(key, value);
        Ok(())
    }

    /// Drain the mailbox, close the store and stop the worker
    ///
    /// No operation is valid afterwards: writes are dropped and reads fail
    /// with [`StateError::Unavailable`].
    pub async fn quit(&self) -> StateResponse<()> {
        debug!("StateManager::quit: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::Quit { reply: reply_tx })
            .map_err(|_| StateError::Unavailable)?;
        reply_rx.await.map_err(|_| StateError::Unavailable)?
    }
}

/// Worker thread body; blocking I/O happens only here
fn worker_loop(mut store: KvStore, mut rx: mpsc::UnboundedReceiver<StateCommand>) {
    debug!("worker_loop: called");

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            StateCommand::Get { key, reply } => {
                debug!(%key, "worker_loop: Get command");
                let result = store.get(&key).map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
            }

            StateCommand::Set { key, value } => {
                debug!(%key, "worker_loop: Set command");
                if let Err(e) = store.set(&key, &value) {
                    error!(%key, error = %e, "Failed to persist state value");
                }
            }

            StateCommand::Quit { reply } => {
                debug!("worker_loop: Quit command");
                let result = store.close().map_err(|e| StateError::StoreError(e.to_string()));
                let _ = reply.send(result);
                info!("State store worker stopped");
                return;
            }
        }
    }

    // Every handle was dropped without an explicit quit
    debug!("worker_loop: mailbox closed, closing store");
    if let Err(e) = store.close() {
        error!(error = %e, "Failed to close state store");
    }
}
