use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use std::path::Path;
use std::sync::Arc;

// Key-value table, one row per storage key, value is a JSON document
const MIGRATIONS_SQL: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

/// Durable string key-value medium the stores persist into.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error>;
    async fn remove(&self, key: &str) -> Result<(), anyhow::Error>;
    /// All stored keys, sorted.
    async fn keys(&self) -> Result<Vec<String>, anyhow::Error>;
}

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database file at `db_path` and runs migrations.
    pub async fn open(db_path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }
        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        Self::connect(&db_url).await
    }

    /// Connects to an SQLite database URL, creating the file if it doesn't exist.
    pub async fn connect(db_url: &str) -> Result<Self, anyhow::Error> {
        if db_url.contains(":memory:") {
            return Self::in_memory().await;
        }
        log::info!("Connecting to database: {}", db_url);

        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// A private database that lives as long as this value.
    pub async fn in_memory() -> Result<Self, anyhow::Error> {
        // Every connection to :memory: is a separate database, so pin a single one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::debug!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KvBackend for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read key '{}'", key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        log::debug!("Writing key '{}' ({} bytes)", key, value.len());
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write key '{}'", key))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to remove key '{}'", key))?;

        if result.rows_affected() == 0 {
            log::debug!("Attempted to remove missing key '{}'", key);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, anyhow::Error> {
        sqlx::query_scalar::<_, String>("SELECT key FROM settings ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list keys")
    }
}

/// Non-durable backend for tests and throwaway sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, anyhow::Error> {
        let mut keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

/// Backend over the web view's store file (`tauri-plugin-store`).
#[cfg(feature = "desktop")]
pub struct TauriStoreStorage<R: tauri::Runtime> {
    store: Arc<tauri_plugin_store::Store<R>>,
}

#[cfg(feature = "desktop")]
impl<R: tauri::Runtime> TauriStoreStorage<R> {
    pub fn new(store: Arc<tauri_plugin_store::Store<R>>) -> Self {
        Self { store }
    }
}

#[cfg(feature = "desktop")]
#[async_trait]
impl<R: tauri::Runtime> KvBackend for TauriStoreStorage<R> {
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self
            .store
            .get(key)
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        self.store
            .set(key, serde_json::Value::String(value.to_string()));
        self.store
            .save()
            .with_context(|| format!("Failed to save store after writing '{}'", key))
    }

    async fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        if self.store.delete(key) {
            self.store
                .save()
                .with_context(|| format!("Failed to save store after removing '{}'", key))?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, anyhow::Error> {
        let mut keys = self.store.keys();
        keys.sort();
        Ok(keys)
    }
}

/// A typed value bound to one storage key: read once at load, written back on every mutation.
pub struct Persisted<T> {
    backend: Arc<dyn KvBackend>,
    key: &'static str,
    value: T,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Loads `key`, falling back to `default` when the key is missing or undecodable.
    pub async fn load(
        backend: Arc<dyn KvBackend>,
        key: &'static str,
        default: T,
    ) -> Result<Self, anyhow::Error> {
        let value = match backend.get(key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Discarding undecodable value under '{}': {}", key, e);
                    default
                }
            },
            None => default,
        };
        Ok(Self {
            backend,
            key,
            value,
        })
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub async fn set(&mut self, value: T) -> Result<(), anyhow::Error> {
        self.value = value;
        self.flush().await
    }

    /// Mutates the value in place, then writes it through.
    pub async fn update<R>(&mut self, mutate: impl FnOnce(&mut T) -> R) -> Result<R, anyhow::Error> {
        let result = mutate(&mut self.value);
        self.flush().await?;
        Ok(result)
    }

    async fn flush(&self) -> Result<(), anyhow::Error> {
        let raw = serde_json::to_string(&self.value)
            .with_context(|| format!("Failed to encode value for '{}'", self.key))?;
        self.backend.set(self.key, &raw).await
    }
}
