// src/bot/mod.rs - Bot core: wires the platform stream to the moderation
// engine, the command dispatcher and the leaderboard

use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::config::BotConfig;
use crate::platforms::{PlatformConnection, RestrictionApplier};
use crate::store::UserRecordStore;
use crate::types::ChatMessage;

pub mod clock;
pub mod commands;
pub mod engine;
pub mod leaderboard;

use clock::Clock;
use commands::CommandDispatcher;
use engine::ModerationEngine;
use leaderboard::Leaderboard;

/// Core bot engine that owns the platform connection and all subsystems
pub struct GuardBot<C: Clock + Clone> {
    connection: Box<dyn PlatformConnection>,
    dispatcher: CommandDispatcher<C>,
    engine: Arc<ModerationEngine<C>>,
    store: Arc<dyn UserRecordStore>,
    config: Arc<BotConfig>,
}

impl<C: Clock + Clone + 'static> GuardBot<C> {
    pub fn new(
        config: Arc<BotConfig>,
        store: Arc<dyn UserRecordStore>,
        applier: Arc<dyn RestrictionApplier>,
        board: Arc<Leaderboard>,
        connection: Box<dyn PlatformConnection>,
        clock: C,
    ) -> Self {
        let engine = Arc::new(ModerationEngine::new(
            store.clone(),
            applier,
            clock.clone(),
            (&config.escalation).into(),
            config.chat_id,
        ));
        let dispatcher = CommandDispatcher::new(
            engine.clone(),
            store.clone(),
            board,
            config.clone(),
            clock,
        );
        Self {
            connection,
            dispatcher,
            engine,
            store,
            config,
        }
    }

    /// Connect and run the message loop until the process stops
    pub async fn start(&mut self) -> Result<()> {
        self.connection.connect().await?;
        let mut receiver = self
            .connection
            .message_receiver()
            .ok_or_else(|| anyhow::anyhow!("platform connection exposes no message stream"))?;

        info!(
            "Bot running on {} for chat {}",
            self.connection.platform_name(),
            self.config.chat_id
        );

        loop {
            let message = match receiver.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Message stream lagged, {} messages skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => {
                    warn!("Message stream closed, stopping");
                    return Ok(());
                }
            };

            if let Err(e) = self.process(message).await {
                error!("Failed to process message: {e}");
            }
        }
    }

    /// One message through the pipeline. Commands go to the dispatcher;
    /// everything else is tracked first, then checked against the mute state
    /// (count first so muted users' history stays accurate, then delete).
    async fn process(&self, message: ChatMessage) -> Result<()> {
        // chat_id 0 means moderate whatever chat the bot is in
        if self.config.chat_id != 0 && message.chat_id != self.config.chat_id {
            return Ok(());
        }

        if message.is_command() {
            if let Some(reply) = self.dispatcher.handle(&message).await {
                self.connection.send_message(message.chat_id, &reply).await?;
            }
            return Ok(());
        }

        self.store
            .increment_message_count(
                message.user_id,
                message.username.as_deref(),
                message.timestamp,
            )
            .await?;

        if self.engine.is_muted(message.user_id).await? {
            info!(
                "Deleting message {} from muted user {}",
                message.message_id, message.user_id
            );
            self.connection
                .delete_message(message.chat_id, message.message_id)
                .await?;
            return Ok(());
        }

        // Plain text can still be a yes/no answer to a pending confirmation
        if let Some(reply) = self.dispatcher.handle(&message).await {
            self.connection.send_message(message.chat_id, &reply).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::clock::SystemClock;
    use crate::bot::leaderboard::MemoryDocumentStore;
    use crate::store::MemoryUserStore;
    use crate::types::{BotResult, RestrictionSet};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    #[derive(Default)]
    struct FakeOutbox {
        sent: Mutex<Vec<(i64, String)>>,
        deleted: Mutex<Vec<(i64, i64)>>,
    }

    struct FakeConnection {
        sender: broadcast::Sender<ChatMessage>,
        outbox: Arc<FakeOutbox>,
    }

    #[async_trait]
    impl PlatformConnection for FakeConnection {
        async fn connect(&mut self) -> BotResult<()> {
            Ok(())
        }

        async fn send_message(&self, chat_id: i64, text: &str) -> BotResult<()> {
            self.outbox.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        async fn delete_message(&self, chat_id: i64, message_id: i64) -> BotResult<()> {
            self.outbox.deleted.lock().unwrap().push((chat_id, message_id));
            Ok(())
        }

        fn platform_name(&self) -> &str {
            "fake"
        }

        fn message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>> {
            Some(self.sender.subscribe())
        }
    }

    struct NoopApplier;

    #[async_trait]
    impl RestrictionApplier for NoopApplier {
        async fn apply_restriction(
            &self,
            _chat_id: i64,
            _user_id: i64,
            _restrictions: &RestrictionSet,
            _until: DateTime<Utc>,
        ) -> BotResult<()> {
            Ok(())
        }

        async fn lift_restriction(&self, _chat_id: i64, _user_id: i64) -> BotResult<()> {
            Ok(())
        }

        async fn ban(&self, _chat_id: i64, _user_id: i64) -> BotResult<()> {
            Ok(())
        }

        async fn unban(&self, _chat_id: i64, _user_id: i64) -> BotResult<()> {
            Ok(())
        }
    }

    fn message(user_id: i64, username: &str, message_id: i64, content: &str) -> ChatMessage {
        ChatMessage {
            chat_id: -100,
            message_id,
            user_id,
            username: Some(username.to_string()),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn bot_fixture() -> (GuardBot<SystemClock>, Arc<MemoryUserStore>, Arc<FakeOutbox>) {
        let store = Arc::new(MemoryUserStore::new());
        let outbox = Arc::new(FakeOutbox::default());
        let (sender, _) = broadcast::channel(16);
        let connection = FakeConnection {
            sender,
            outbox: outbox.clone(),
        };
        let config = Arc::new(BotConfig {
            chat_id: -100,
            owner_id: 1,
            ..Default::default()
        });
        let board = Arc::new(Leaderboard::new(Arc::new(MemoryDocumentStore::new()), None));
        let bot = GuardBot::new(
            config,
            store.clone() as Arc<dyn UserRecordStore>,
            Arc::new(NoopApplier),
            board,
            Box::new(connection),
            SystemClock,
        );
        (bot, store, outbox)
    }

    #[tokio::test]
    async fn plain_messages_are_counted_not_answered() {
        let (bot, store, outbox) = bot_fixture();

        bot.process(message(7, "bob", 1, "hello")).await.unwrap();
        bot.process(message(7, "bob", 2, "again")).await.unwrap();

        assert_eq!(store.get_or_create(7).await.unwrap().message_count, 2);
        assert!(outbox.sent.lock().unwrap().is_empty());
        assert!(outbox.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn muted_user_messages_are_counted_then_deleted() {
        let (bot, store, outbox) = bot_fixture();

        bot.process(message(7, "bob", 1, "hi")).await.unwrap();
        bot.process(message(1, "admin", 2, "/mute bob 10m")).await.unwrap();
        bot.process(message(7, "bob", 3, "still here")).await.unwrap();

        // The deleted message still counted
        assert_eq!(store.get_or_create(7).await.unwrap().message_count, 2);
        assert_eq!(*outbox.deleted.lock().unwrap(), vec![(-100, 3)]);
    }

    #[tokio::test]
    async fn commands_get_replies_and_are_not_counted() {
        let (bot, store, outbox) = bot_fixture();

        bot.process(message(1, "admin", 1, "/stats")).await.unwrap();

        assert_eq!(store.stats(Utc::now()).await.unwrap().total_users, 0);
        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("📊"));
    }

    #[tokio::test]
    async fn other_chats_are_ignored() {
        let (bot, store, outbox) = bot_fixture();

        let mut foreign = message(7, "bob", 1, "hello");
        foreign.chat_id = -200;
        bot.process(foreign).await.unwrap();

        assert_eq!(store.stats(Utc::now()).await.unwrap().total_users, 0);
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_three_warnings_mute_the_user() {
        let (bot, store, outbox) = bot_fixture();

        bot.process(message(7, "bob", 1, "spam")).await.unwrap();
        for i in 0..3 {
            bot.process(message(1, "admin", 10 + i, "/warn bob spam"))
                .await
                .unwrap();
        }

        let record = store.get_or_create(7).await.unwrap();
        assert_eq!(record.warning_count, 3);
        assert!(record.mute_until.is_some());

        // The muted user's next message is deleted
        bot.process(message(7, "bob", 20, "more spam")).await.unwrap();
        assert_eq!(*outbox.deleted.lock().unwrap(), vec![(-100, 20)]);

        let sent = outbox.sent.lock().unwrap();
        assert!(sent.last().unwrap().1.contains("Auto-muted"));
    }
}
