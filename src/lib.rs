//! # Guardbot
//!
//! A group-chat moderation and points-leaderboard bot: per-user message
//! tracking, warnings with tiered auto-mute escalation, timed mutes and bans,
//! plus an admin-managed points leaderboard kept in a remote versioned
//! document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guardbot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(BotConfig::load("guardbot.toml").await?);
//!     let store: Arc<dyn UserRecordStore> =
//!         Arc::new(FileUserStore::open(&config.store_path).await?);
//!
//!     let connection = TelegramConnection::new(TelegramConfig::from_env()?);
//!     let applier = Arc::new(connection.api());
//!     let board = Arc::new(Leaderboard::new(Arc::new(MemoryDocumentStore::new()), None));
//!
//!     let mut bot = GuardBot::new(
//!         config, store, applier, board, Box::new(connection), SystemClock,
//!     );
//!     bot.start().await
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod store;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::clock::{Clock, SystemClock};
    pub use crate::bot::engine::{EscalationPolicy, ModerationEngine};
    pub use crate::bot::leaderboard::{
        DocumentStore, GitHubDocumentStore, Leaderboard, MemoryDocumentStore,
    };
    pub use crate::bot::GuardBot;
    pub use crate::config::BotConfig;
    pub use crate::platforms::telegram::{TelegramConfig, TelegramConnection};
    pub use crate::platforms::{PlatformConnection, RestrictionApplier};
    pub use crate::store::{FileUserStore, MemoryUserStore, UserRecordStore};
    pub use crate::types::{
        BotError, BotResult, ChatMessage, MuteDuration, RestrictionSet, UserRecord, WarnOutcome,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
