use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use super::kv::{ChangeNotifier, KeyChange, KvStore, StoreError};

/// In-process store. `latency` delays every read and write to mimic an
/// async backend, and `set_offline` makes every call fail.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    documents: Mutex<HashMap<String, Value>>,
    notifier: ChangeNotifier,
    latency: Option<Duration>,
    offline: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

impl KvStore for MemoryKvStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>> {
        Box::pin(async move {
            self.round_trip().await?;
            Ok(self.documents.lock().get(key).cloned())
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.round_trip().await?;
            let old_value = self.documents.lock().insert(key.to_string(), value.clone());
            self.notifier.notify(key, old_value, Some(value));
            Ok(())
        })
    }

    fn subscribe(&self, key: &str) -> broadcast::Receiver<KeyChange> {
        self.notifier.subscribe(key)
    }
}
