use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool, migrate::Migrator};

use crate::store::{StatusStore, StoreKey, StoreValue};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("key {0} holds neither text nor an integer")]
    EmptyValue(String),
}

/// SQLite-backed status store.
///
/// Both surfaces may open the same file; every key is a single row so
/// writes from either process are independently atomic.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteStore {
    /// Opens or creates the database at `path`.
    pub async fn new(path: impl AsRef<Path>, namespace: &str) -> Result<Self, SqliteStoreError> {
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite:{}",
            path.as_ref().to_string_lossy()
        ))?
        .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self {
            pool,
            namespace: namespace.to_owned(),
        })
    }

    pub async fn new_in_memory(namespace: &str) -> Result<Self, SqliteStoreError> {
        // every pooled connection would get its own in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self {
            pool,
            namespace: namespace.to_owned(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StatusStore for SqliteStore {
    type Error = SqliteStoreError;

    async fn get(&self, key: StoreKey) -> Result<Option<StoreValue>, Self::Error> {
        let key = key.qualified(&self.namespace);
        let row = sqlx::query(
            r#"
            SELECT text_value, int_value FROM preferences WHERE key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<StoreValue, SqliteStoreError> {
            if let Some(i) = r.try_get::<Option<i64>, _>("int_value")? {
                return Ok(StoreValue::Int(i));
            }
            match r.try_get::<Option<String>, _>("text_value")? {
                Some(s) => Ok(StoreValue::Text(s)),
                None => Err(SqliteStoreError::EmptyValue(key.clone())),
            }
        })
        .transpose()
    }

    async fn set(&self, key: StoreKey, value: StoreValue) -> Result<(), Self::Error> {
        let (text, int) = match value {
            StoreValue::Text(s) => (Some(s), None),
            StoreValue::Int(i) => (None, Some(i)),
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO preferences (key, text_value, int_value, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(key.qualified(&self.namespace))
        .bind(text)
        .bind(int)
        .bind(jiff::Timestamp::now().as_second())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
