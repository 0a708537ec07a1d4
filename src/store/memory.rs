// src/store/memory.rs - In-memory user record store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::store::UserRecordStore;
use crate::types::{BotResult, StoreStats, UserRecord};

/// A record plus the sequence number it was first inserted with, so that
/// ranking ties resolve deterministically by first-seen order.
#[derive(Debug, Clone)]
struct Slot {
    record: UserRecord,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<i64, Slot>,
    next_seq: u64,
}

impl Inner {
    fn slot_mut(&mut self, user_id: i64) -> &mut Slot {
        let seq = self.next_seq;
        let slot = self.slots.entry(user_id).or_insert_with(|| Slot {
            record: UserRecord::new(user_id),
            seq,
        });
        if slot.seq == seq {
            self.next_seq += 1;
        }
        slot
    }
}

/// Default store: the whole table lives behind one RwLock, which makes every
/// per-user operation trivially atomic. Also the test double for the
/// file-backed adapter, satisfying the same contract.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in first-seen order
    pub(crate) async fn dump(&self) -> Vec<UserRecord> {
        let inner = self.inner.read().await;
        let mut slots: Vec<&Slot> = inner.slots.values().collect();
        slots.sort_by_key(|s| s.seq);
        slots.iter().map(|s| s.record.clone()).collect()
    }

    /// Current state of one record, if present
    pub(crate) async fn snapshot(&self, user_id: i64) -> Option<UserRecord> {
        let inner = self.inner.read().await;
        inner.slots.get(&user_id).map(|slot| slot.record.clone())
    }

    /// Put one record back to an earlier state. `None` removes the record
    /// entirely (the slot did not exist before the mutation being undone).
    pub(crate) async fn restore(&self, user_id: i64, previous: Option<UserRecord>) {
        let mut inner = self.inner.write().await;
        match previous {
            Some(record) => {
                if let Some(slot) = inner.slots.get_mut(&user_id) {
                    slot.record = record;
                }
            }
            None => {
                inner.slots.remove(&user_id);
            }
        }
    }

    /// Replace the table contents, assigning sequence numbers by position
    pub(crate) async fn load(&self, records: Vec<UserRecord>) {
        let mut inner = self.inner.write().await;
        inner.slots.clear();
        inner.next_seq = 0;
        for record in records {
            let seq = inner.next_seq;
            inner.slots.insert(record.user_id, Slot { record, seq });
            inner.next_seq += 1;
        }
    }
}

#[async_trait]
impl UserRecordStore for MemoryUserStore {
    async fn find_by_username(&self, name: &str) -> BotResult<Option<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .slots
            .values()
            .find(|slot| {
                slot.record
                    .username
                    .as_deref()
                    .is_some_and(|u| u.eq_ignore_ascii_case(name))
            })
            .map(|slot| slot.record.clone()))
    }

    async fn get_or_create(&self, user_id: i64) -> BotResult<UserRecord> {
        let mut inner = self.inner.write().await;
        Ok(inner.slot_mut(user_id).record.clone())
    }

    async fn increment_message_count(
        &self,
        user_id: i64,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> BotResult<UserRecord> {
        let mut inner = self.inner.write().await;
        let slot = inner.slot_mut(user_id);
        let record = &mut slot.record;
        record.message_count += 1;
        record.last_message_at = Some(now);
        if record.join_seen_at.is_none() {
            record.join_seen_at = Some(now);
        }
        if let Some(name) = username {
            record.username = Some(name.to_string());
        }
        Ok(record.clone())
    }

    async fn increment_warning(&self, user_id: i64) -> BotResult<UserRecord> {
        let mut inner = self.inner.write().await;
        let slot = inner.slot_mut(user_id);
        slot.record.warning_count += 1;
        Ok(slot.record.clone())
    }

    async fn reset_warnings(&self, user_id: i64) -> BotResult<()> {
        let mut inner = self.inner.write().await;
        inner.slot_mut(user_id).record.warning_count = 0;
        Ok(())
    }

    async fn set_mute(&self, user_id: i64, until: Option<DateTime<Utc>>) -> BotResult<()> {
        let mut inner = self.inner.write().await;
        inner.slot_mut(user_id).record.mute_until = until;
        Ok(())
    }

    async fn stats(&self, now: DateTime<Utc>) -> BotResult<StoreStats> {
        let inner = self.inner.read().await;
        let mut stats = StoreStats {
            total_users: inner.slots.len() as u64,
            ..Default::default()
        };
        for slot in inner.slots.values() {
            stats.total_messages += slot.record.message_count;
            stats.total_warnings += slot.record.warning_count as u64;
            if slot.record.is_muted_at(now) {
                stats.muted_users += 1;
            }
        }
        Ok(stats)
    }

    async fn top_by_message_count(&self, limit: usize) -> BotResult<Vec<UserRecord>> {
        let inner = self.inner.read().await;
        let mut slots: Vec<&Slot> = inner.slots.values().collect();
        slots.sort_by(|a, b| {
            b.record
                .message_count
                .cmp(&a.record.message_count)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(slots
            .into_iter()
            .take(limit)
            .map(|s| s.record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn username_lookup_is_case_insensitive() {
        let store = MemoryUserStore::new();
        store
            .increment_message_count(1, Some("Bob"), Utc::now())
            .await
            .unwrap();

        let a = store.find_by_username("Bob").await.unwrap().unwrap();
        let b = store.find_by_username("bob").await.unwrap().unwrap();
        assert_eq!(a.user_id, b.user_id);
        assert!(store.find_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_message_creates_record() {
        let store = MemoryUserStore::new();
        let now = Utc::now();
        let record = store
            .increment_message_count(5, Some("carol"), now)
            .await
            .unwrap();

        assert_eq!(record.message_count, 1);
        assert_eq!(record.join_seen_at, Some(now));
        assert_eq!(record.last_message_at, Some(now));
        assert_eq!(record.username.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn join_seen_at_is_never_overwritten() {
        let store = MemoryUserStore::new();
        let first = Utc::now();
        let later = first + chrono::Duration::hours(1);

        store.increment_message_count(5, None, first).await.unwrap();
        let record = store.increment_message_count(5, None, later).await.unwrap();

        assert_eq!(record.join_seen_at, Some(first));
        assert_eq!(record.last_message_at, Some(later));
        assert_eq!(record.message_count, 2);
    }

    #[tokio::test]
    async fn concurrent_increments_lose_nothing() {
        let store = MemoryUserStore::new();
        let mut handles = Vec::new();
        for _ in 0..100 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .increment_message_count(42, Some("dave"), Utc::now())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get_or_create(42).await.unwrap();
        assert_eq!(record.message_count, 100);
    }

    #[tokio::test]
    async fn warning_increment_returns_post_increment_record() {
        let store = MemoryUserStore::new();
        assert_eq!(store.increment_warning(9).await.unwrap().warning_count, 1);
        assert_eq!(store.increment_warning(9).await.unwrap().warning_count, 2);

        store.reset_warnings(9).await.unwrap();
        assert_eq!(store.get_or_create(9).await.unwrap().warning_count, 0);
    }

    #[tokio::test]
    async fn top_ranking_breaks_ties_by_first_seen() {
        let store = MemoryUserStore::new();
        let now = Utc::now();
        // counts: 1 -> 5, 2 -> 5, 3 -> 2, 4 -> 1
        for (user_id, count) in [(1i64, 5u64), (2, 5), (3, 2), (4, 1)] {
            for _ in 0..count {
                store
                    .increment_message_count(user_id, None, now)
                    .await
                    .unwrap();
            }
        }

        let top = store.top_by_message_count(3).await.unwrap();
        let ids: Vec<i64> = top.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // Deterministic across repeated calls
        let again = store.top_by_message_count(3).await.unwrap();
        assert_eq!(ids, again.iter().map(|r| r.user_id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stats_count_only_active_mutes() {
        let store = MemoryUserStore::new();
        let now = Utc::now();
        store.increment_message_count(1, None, now).await.unwrap();
        store.increment_message_count(2, None, now).await.unwrap();
        store.increment_warning(2).await.unwrap();

        store
            .set_mute(1, Some(now + chrono::Duration::minutes(10)))
            .await
            .unwrap();
        store
            .set_mute(2, Some(now - chrono::Duration::minutes(10)))
            .await
            .unwrap();

        let stats = store.stats(now).await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.total_warnings, 1);
        assert_eq!(stats.muted_users, 1);
    }
}
