use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::models::ResultBundle;

pub const RESULTS_KEY: &str = "calculatorResults";
pub const THEME_KEY: &str = "theme";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not access storage file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file {path} does not hold a JSON object of strings")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored value is not a valid result record")]
    Json(#[from] serde_json::Error),
    #[error("database request failed")]
    Database(#[from] sqlx::Error),
    #[error("database migration failed")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("storage file {path} is locked by another writer")]
    Locked { path: PathBuf },
    #[error("storage is unavailable")]
    Unavailable,
}

/// String-keyed, string-valued storage in the shape of browser local storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Unavailable)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(20);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);

/// Keeps every key in one JSON object on disk. Writes go through a sibling
/// temp file and a rename so a crash never leaves a half-written object.
///
/// Each read-modify-write holds an advisory `<file>.lock` created
/// exclusively, so concurrent writers (other processes included) cannot
/// drop each other's keys. A lock older than ten seconds is treated as left
/// behind by a crashed writer and removed. Reads take no lock.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

/// Removes the lock file when the write finishes or fails.
struct WriteLock {
    path: PathBuf,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    async fn lock(&self) -> Result<WriteLock, StoreError> {
        let lock_path = self.lock_path();
        let deadline = Instant::now() + LOCK_WAIT;

        loop {
            let attempt = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await;
            match attempt {
                Ok(_) => return Ok(WriteLock { path: lock_path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&lock_path).await {
                        tracing::warn!(path = %lock_path.display(), "removing stale storage lock");
                        let _ = tokio::fs::remove_file(&lock_path).await;
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::Locked {
                            path: self.path.clone(),
                        });
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(source) => return Err(self.io_error(source)),
            }
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }

        let _lock = self.lock().await?;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        let body = serde_json::to_string_pretty(&entries)?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        Ok(())
    }
}

async fn lock_is_stale(lock_path: &std::path::Path) -> bool {
    match tokio::fs::metadata(lock_path).await.and_then(|meta| meta.modified()) {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .map(|age| age > LOCK_STALE_AFTER)
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_db(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM belonging_calculator.kv_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO belonging_calculator.kv_entries (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Overwrites the single remembered result.
pub async fn save_result(store: &dyn KeyValueStore, bundle: &ResultBundle) -> Result<(), StoreError> {
    let json = serde_json::to_string(bundle)?;
    store.set(RESULTS_KEY, &json).await
}

/// Reads back the remembered result for callers outside the calculator flow.
pub async fn load_last_result(store: &dyn KeyValueStore) -> Result<Option<ResultBundle>, StoreError> {
    match store.get(RESULTS_KEY).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator;
    use crate::models::{Horizon, MetricSet};
    use chrono::{TimeZone, Utc};

    fn sample_bundle() -> ResultBundle {
        let computed_at = Utc.with_ymd_and_hms(2026, 2, 2, 9, 30, 0).unwrap();
        estimator::estimate(&MetricSet::new(45, 38, 52, 61), "Avery Middle", "", computed_at)
    }

    #[tokio::test]
    async fn memory_store_overwrites_values() {
        let store = MemoryStore::new();
        assert_eq!(store.get("theme").await.unwrap(), None);
        store.set("theme", "dark").await.unwrap();
        store.set("theme", "light").await.unwrap();
        assert_eq!(store.get("theme").await.unwrap().as_deref(), Some("light"));
    }

    #[tokio::test]
    async fn file_store_creates_parent_and_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");
        let store = FileStore::new(&path);

        store.set(THEME_KEY, "light").await.unwrap();
        store.set(RESULTS_KEY, "{}").await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(THEME_KEY).await.unwrap().as_deref(), Some("light"));
        assert_eq!(reopened.get(RESULTS_KEY).await.unwrap().as_deref(), Some("{}"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_file_writes_keep_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = FileStore::new(&path);

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.set(&format!("key-{i}"), "v").await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        for i in 0..16 {
            assert_eq!(
                store.get(&format!("key-{i}")).await.unwrap().as_deref(),
                Some("v")
            );
        }
        assert!(!path.with_extension("json.lock").exists());
    }

    #[tokio::test]
    async fn stale_lock_is_cleared_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let lock = std::fs::File::create(path.with_extension("json.lock")).unwrap();
        lock.set_modified(SystemTime::now() - Duration::from_secs(60)).unwrap();
        drop(lock);

        let store = FileStore::new(&path);
        store.set(THEME_KEY, "dark").await.unwrap();
        assert_eq!(store.get(THEME_KEY).await.unwrap().as_deref(), Some("dark"));
        assert!(!path.with_extension("json.lock").exists());
    }

    #[tokio::test]
    async fn file_store_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get(RESULTS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_reports_corrupt_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(
            store.get(RESULTS_KEY).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn saved_result_uses_stable_json_layout() {
        let store = MemoryStore::new();
        save_result(&store, &sample_bundle()).await.unwrap();

        let raw = store.get(RESULTS_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schoolName"], "Avery Middle");
        assert_eq!(value["studentCount"], "500+");
        assert_eq!(value["current"]["voice"], 38);
        assert_eq!(value["predicted"]["6"]["belonging"], 60);
        assert_eq!(value["improvements"]["18"]["engagement"], 37);
        assert_eq!(value["timestamp"], "2026-02-02T09:30:00Z");
    }

    #[tokio::test]
    async fn last_result_reads_back_saved_bundle() {
        let store = MemoryStore::new();
        assert_eq!(load_last_result(&store).await.unwrap(), None);

        let bundle = sample_bundle();
        save_result(&store, &bundle).await.unwrap();
        let loaded = load_last_result(&store).await.unwrap().unwrap();
        assert_eq!(loaded, bundle);
        assert_eq!(
            loaded.predicted_at(Horizon::TwelveMonths),
            MetricSet::new(73, 70, 77, 87)
        );
    }
}
