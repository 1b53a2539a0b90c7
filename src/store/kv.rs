use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A document changed. Delivered to every subscriber of that key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Async key-value persistence for whole JSON documents.
///
/// Writes are plain overwrites: the last writer wins.
pub trait KvStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>>;

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Changes to `key` only. Writes to other documents never fill this
    /// receiver.
    fn subscribe(&self, key: &str) -> broadcast::Receiver<KeyChange>;
}

/// Per-key fan-out of [`KeyChange`] notifications shared by the store
/// implementations.
#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<KeyChange>>>>,
}

impl ChangeNotifier {
    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<KeyChange> {
        self.channels
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANGE_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn notify(&self, key: &str, old_value: Option<Value>, new_value: Option<Value>) {
        let channels = self.channels.lock();
        let Some(sender) = channels.get(key) else {
            return;
        };
        // no live subscribers is fine
        let _ = sender.send(KeyChange {
            key: key.to_string(),
            old_value,
            new_value,
        });
    }
}
