// src/store/mod.rs - Per-user record storage behind a narrow async interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{BotResult, StoreStats, UserRecord};

pub mod file;
pub mod memory;

pub use file::FileUserStore;
pub use memory::MemoryUserStore;

/// Durable per-user counters keyed by the stable platform user id.
///
/// Every operation touching a single `user_id` must be atomic with respect
/// to concurrent calls for the same id; operations on different ids are
/// independent. Failures surface as `BotError::Storage` and callers never
/// retry here.
#[async_trait]
pub trait UserRecordStore: Send + Sync {
    /// Case-insensitive exact match on the last-seen username
    async fn find_by_username(&self, name: &str) -> BotResult<Option<UserRecord>>;

    /// Existing record, or a zero-initialized one
    async fn get_or_create(&self, user_id: i64) -> BotResult<UserRecord>;

    /// Atomic upsert: create with count=1 and join_seen_at=now, or bump the
    /// counter and refresh last_message_at/username
    async fn increment_message_count(
        &self,
        user_id: i64,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> BotResult<UserRecord>;

    /// Atomic increment-then-read of the warning counter
    async fn increment_warning(&self, user_id: i64) -> BotResult<UserRecord>;

    async fn reset_warnings(&self, user_id: i64) -> BotResult<()>;

    /// Persist a mute window; `None` clears it
    async fn set_mute(&self, user_id: i64, until: Option<DateTime<Utc>>) -> BotResult<()>;

    /// Aggregate snapshot; muted_users counts windows strictly in the future
    async fn stats(&self, now: DateTime<Utc>) -> BotResult<StoreStats>;

    /// Descending by message_count, ties broken by first-seen order
    async fn top_by_message_count(&self, limit: usize) -> BotResult<Vec<UserRecord>>;
}
