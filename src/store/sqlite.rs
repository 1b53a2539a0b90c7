use std::{path::Path, str::FromStr, time::Duration};

use futures::future::BoxFuture;
use serde_json::Value;
use sqlx::{
    query, query_as,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use tokio::sync::broadcast;

use super::kv::{ChangeNotifier, KeyChange, KvStore, StoreError};

pub async fn init_pool(db_path: &Path) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Documents stored as JSON text, one row per key.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            notifier: ChangeNotifier::default(),
        }
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(init_pool(db_path).await?))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> = query_as(r#"SELECT value FROM documents WHERE key = ?1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let old_value = match self.read(key).await {
            Ok(old) => old,
            Err(StoreError::Serialization(err)) => {
                tracing::warn!(target: "store", key, error = %err, "overwriting unreadable document");
                None
            }
            Err(err) => return Err(err),
        };
        let raw = serde_json::to_string(&value)?;
        query(
            r#"INSERT INTO documents (key, value, updated_at)
                VALUES (?1, ?2, CURRENT_TIMESTAMP)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        self.notifier.notify(key, old_value, Some(value));
        Ok(())
    }
}

impl KvStore for SqliteKvStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>> {
        Box::pin(self.read(key))
    }

    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.write(key, value))
    }

    fn subscribe(&self, key: &str) -> broadcast::Receiver<KeyChange> {
        self.notifier.subscribe(key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.db");

        let store = SqliteKvStore::open(&path).await.unwrap();
        let mut changes = store.subscribe("rf_rules");
        assert_eq!(store.get("rf_rules").await.unwrap(), None);
        store.set("rf_rules", json!({ "enabled": false })).await.unwrap();
        store.set("rf_rules", json!({ "enabled": true })).await.unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.key, "rf_rules");
        assert_eq!(change.old_value, None);
        let change = changes.recv().await.unwrap();
        assert_eq!(change.old_value, Some(json!({ "enabled": false })));
        store.close().await;

        let reopened = SqliteKvStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("rf_rules").await.unwrap(),
            Some(json!({ "enabled": true }))
        );
        reopened.close().await;
    }
}
