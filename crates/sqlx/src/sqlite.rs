use async_trait::async_trait;
use chrono::Utc;
use portal_core::{Error, KeyValueStore, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::debug;

/// Persistent store for session credentials and cached responses
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and apply migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::StoreError(format!("Invalid database URL: {e}")))?
            .create_if_missing(true);

        let pool = sqlx::SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::StoreError(format!("Failed to connect to database: {e}")))?;

        Self::migrate(&pool).await?;
        debug!(database_url, "opened sqlite store");
        Ok(Self { pool })
    }

    /// A private in-memory database, gone when the store is dropped
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::StoreError(format!("Invalid database URL: {e}")))?;

        // Every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::StoreError(format!("Failed to connect to database: {e}")))?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Use an existing pool. Migrations are not applied.
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| Error::StoreError(format!("Failed to run migrations: {e}")))
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::StoreError(format!("Failed to read {key}: {e}")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::StoreError(format!("Failed to write {key}: {e}")))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::StoreError(format!("Failed to delete {key}: {e}")))?;

        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        // substr instead of LIKE so `%` and `_` in the prefix match literally
        sqlx::query_scalar::<_, String>(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::StoreError(format!("Failed to list keys under {prefix}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::tests::store::KeyValueStoreTestSuite;

    #[tokio::test]
    async fn in_memory_store_passes_suite() {
        let store = SqliteStore::in_memory().await.unwrap();
        KeyValueStoreTestSuite::new(store).run_all_tests().await.unwrap();
    }

    #[tokio::test]
    async fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("portal.db").display());

        let store = SqliteStore::new(&url).await.unwrap();
        store.set("portal:token", "abc").await.unwrap();
        store.pool().close().await;

        let reopened = SqliteStore::new(&url).await.unwrap();
        assert_eq!(
            reopened.get("portal:token").await.unwrap().as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn set_updates_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set("k", "v1").await.unwrap();
        let first: String = sqlx::query_scalar("SELECT updated_at FROM kv_store WHERE key = 'k'")
            .fetch_one(store.pool())
            .await
            .unwrap();

        store.set("k", "v2").await.unwrap();
        let second: String = sqlx::query_scalar("SELECT updated_at FROM kv_store WHERE key = 'k'")
            .fetch_one(store.pool())
            .await
            .unwrap();

        assert!(second >= first);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }
}
