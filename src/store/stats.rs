use std::sync::Arc;

use super::kv::{KvStore, StoreError};
use crate::domain::Stats;

pub const STATS_KEY: &str = "rf_stats";

#[derive(Clone)]
pub struct StatsStore {
    kv: Arc<dyn KvStore>,
}

impl StatsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn read(&self) -> Result<Stats, StoreError> {
        let stored = self.kv.get(STATS_KEY).await?;
        Ok(stored
            .as_ref()
            .map(Stats::from_document)
            .unwrap_or_default())
    }

    pub async fn write(&self, stats: &Stats) -> Result<(), StoreError> {
        self.kv.set(STATS_KEY, serde_json::to_value(stats)?).await
    }

    pub async fn reset(&self) -> Result<Stats, StoreError> {
        let fresh = Stats::default();
        self.write(&fresh).await?;
        Ok(fresh)
    }
}
