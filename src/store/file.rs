// src/store/file.rs - JSON-file-backed user record store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::store::{MemoryUserStore, UserRecordStore};
use crate::types::{BotError, BotResult, StoreStats, UserRecord};

/// Durable adapter: the in-memory table is the working copy, every mutation
/// writes the full table back to a JSON document on disk. Good for one
/// moderated chat; swap the backing adapter if the table outgrows a file.
pub struct FileUserStore {
    inner: MemoryUserStore,
    path: PathBuf,
    // Serializes mutations end to end: each one mutates the table and writes
    // the file under this lock, so a failed write can roll the record back
    // before any other mutation observes the un-persisted state
    save_lock: Mutex<()>,
}

impl FileUserStore {
    /// Open the store, loading any existing table from disk
    pub async fn open(path: impl Into<PathBuf>) -> BotResult<Self> {
        let path = path.into();
        let inner = MemoryUserStore::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<UserRecord> = serde_json::from_slice(&bytes)
                    .map_err(|e| BotError::Storage(format!("corrupt store file {path:?}: {e}")))?;
                info!("Loaded {} user records from {:?}", records.len(), path);
                inner.load(records).await;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store file at {:?}, starting empty", path);
            }
            Err(e) => return Err(BotError::Storage(format!("cannot read {path:?}: {e}"))),
        }

        Ok(Self {
            inner,
            path,
            save_lock: Mutex::new(()),
        })
    }

    async fn persist(&self) -> BotResult<()> {
        let records = self.inner.dump().await;
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| BotError::Storage(format!("serialize failed: {e}")))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| BotError::Storage(format!("cannot write {:?}: {e}", self.path)))?;
        debug!("Persisted {} user records to {:?}", records.len(), self.path);
        Ok(())
    }

    /// Write the table to disk; on failure, undo the in-memory mutation so a
    /// `Storage` error never leaves the record changed. Caller holds
    /// `save_lock` for the whole mutate-then-persist sequence.
    async fn persist_or_rollback<T>(
        &self,
        user_id: i64,
        previous: Option<UserRecord>,
        value: T,
    ) -> BotResult<T> {
        match self.persist().await {
            Ok(()) => Ok(value),
            Err(e) => {
                self.inner.restore(user_id, previous).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl UserRecordStore for FileUserStore {
    async fn find_by_username(&self, name: &str) -> BotResult<Option<UserRecord>> {
        self.inner.find_by_username(name).await
    }

    async fn get_or_create(&self, user_id: i64) -> BotResult<UserRecord> {
        let _guard = self.save_lock.lock().await;
        let previous = self.inner.snapshot(user_id).await;
        let record = self.inner.get_or_create(user_id).await?;
        self.persist_or_rollback(user_id, previous, record).await
    }

    async fn increment_message_count(
        &self,
        user_id: i64,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> BotResult<UserRecord> {
        let _guard = self.save_lock.lock().await;
        let previous = self.inner.snapshot(user_id).await;
        let record = self
            .inner
            .increment_message_count(user_id, username, now)
            .await?;
        self.persist_or_rollback(user_id, previous, record).await
    }

    async fn increment_warning(&self, user_id: i64) -> BotResult<UserRecord> {
        let _guard = self.save_lock.lock().await;
        let previous = self.inner.snapshot(user_id).await;
        let record = self.inner.increment_warning(user_id).await?;
        self.persist_or_rollback(user_id, previous, record).await
    }

    async fn reset_warnings(&self, user_id: i64) -> BotResult<()> {
        let _guard = self.save_lock.lock().await;
        let previous = self.inner.snapshot(user_id).await;
        self.inner.reset_warnings(user_id).await?;
        self.persist_or_rollback(user_id, previous, ()).await
    }

    async fn set_mute(&self, user_id: i64, until: Option<DateTime<Utc>>) -> BotResult<()> {
        let _guard = self.save_lock.lock().await;
        let previous = self.inner.snapshot(user_id).await;
        self.inner.set_mute(user_id, until).await?;
        self.persist_or_rollback(user_id, previous, ()).await
    }

    async fn stats(&self, now: DateTime<Utc>) -> BotResult<StoreStats> {
        self.inner.stats(now).await
    }

    async fn top_by_message_count(&self, limit: usize) -> BotResult<Vec<UserRecord>> {
        self.inner.top_by_message_count(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let now = Utc::now();

        {
            let store = FileUserStore::open(&path).await.unwrap();
            store
                .increment_message_count(1, Some("bob"), now)
                .await
                .unwrap();
            store.increment_warning(1).await.unwrap();
            store
                .set_mute(1, Some(now + chrono::Duration::days(1)))
                .await
                .unwrap();
        }

        let store = FileUserStore::open(&path).await.unwrap();
        let record = store.find_by_username("BOB").await.unwrap().unwrap();
        assert_eq!(record.message_count, 1);
        assert_eq!(record.warning_count, 1);
        assert!(record.is_muted_at(now));
    }

    #[tokio::test]
    async fn reopen_preserves_first_seen_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let now = Utc::now();

        {
            let store = FileUserStore::open(&path).await.unwrap();
            for user_id in [10i64, 20, 30] {
                store
                    .increment_message_count(user_id, None, now)
                    .await
                    .unwrap();
            }
        }

        let store = FileUserStore::open(&path).await.unwrap();
        let top = store.top_by_message_count(10).await.unwrap();
        let ids: Vec<i64> = top.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test_log::test(tokio::test)]
    async fn failed_write_leaves_records_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        tokio::fs::create_dir(&data).await.unwrap();
        let store = FileUserStore::open(data.join("users.json")).await.unwrap();
        let now = Utc::now();
        store
            .increment_message_count(1, Some("bob"), now)
            .await
            .unwrap();

        // Writes fail from here on
        tokio::fs::remove_dir_all(&data).await.unwrap();

        let err = store.increment_warning(1).await.err().unwrap();
        assert!(matches!(err, BotError::Storage(_)));
        let stats = store.stats(now).await.unwrap();
        assert_eq!(stats.total_warnings, 0);
        assert_eq!(stats.total_messages, 1);

        // A record the failed call created is removed again
        let err = store
            .increment_message_count(2, Some("eve"), now)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BotError::Storage(_)));
        assert_eq!(store.stats(now).await.unwrap().total_users, 1);
        assert!(store.find_by_username("eve").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileUserStore::open(dir.path().join("none.json")).await.unwrap();
        assert_eq!(store.stats(Utc::now()).await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = FileUserStore::open(&path).await.err().unwrap();
        assert!(matches!(err, BotError::Storage(_)));
    }
}
