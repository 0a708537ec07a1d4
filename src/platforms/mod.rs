// src/platforms/mod.rs - Platform seam: chat transport and member restrictions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::types::{BotResult, ChatMessage, RestrictionSet};

pub mod telegram;

/// Trait defining the interface all platform connections must implement
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Connect to the platform and start receiving messages
    async fn connect(&mut self) -> BotResult<()>;

    /// Send a text message to the chat
    async fn send_message(&self, chat_id: i64, text: &str) -> BotResult<()>;

    /// Delete a message from the chat (used for muted senders)
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> BotResult<()>;

    /// Get the platform identifier (e.g., "telegram")
    fn platform_name(&self) -> &str;

    /// Get a receiver for incoming messages
    fn message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>>;
}

/// Applies and lifts platform-level member restrictions.
///
/// Calls fail with `BotError::Permission` when the platform refuses (target
/// outranks the bot); such failures are surfaced to the caller, never retried.
#[async_trait]
pub trait RestrictionApplier: Send + Sync {
    /// Revoke the given permissions for a member until the given instant
    async fn apply_restriction(
        &self,
        chat_id: i64,
        user_id: i64,
        restrictions: &RestrictionSet,
        until: DateTime<Utc>,
    ) -> BotResult<()>;

    /// Restore a member's default permissions immediately
    async fn lift_restriction(&self, chat_id: i64, user_id: i64) -> BotResult<()>;

    async fn ban(&self, chat_id: i64, user_id: i64) -> BotResult<()>;

    async fn unban(&self, chat_id: i64, user_id: i64) -> BotResult<()>;
}
