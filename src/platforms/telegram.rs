// src/platforms/telegram.rs - Telegram Bot API connection and restrictions

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};

use crate::platforms::{PlatformConnection, RestrictionApplier};
use crate::types::{BotError, BotResult, ChatMessage, Restriction, RestrictionSet};

const LONG_POLL_SECONDS: u64 = 30;

/// Configuration for the Telegram connection
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
}

impl TelegramConfig {
    /// Load Telegram configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let token = env::var("TELEGRAM_TOKEN")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_TOKEN environment variable not set"))?;
        Ok(Self { token })
    }
}

/// Telegram API error as reported by the wire
#[derive(Debug)]
struct ApiError {
    code: Option<u16>,
    description: String,
}

impl ApiError {
    fn platform(self) -> BotError {
        BotError::Platform(self.description)
    }

    /// Restriction calls refused with 400/403 mean the bot is outranked
    fn restriction(self) -> BotError {
        match self.code {
            Some(400) | Some(403) => BotError::Permission(self.description),
            _ => BotError::Platform(self.description),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    message_id: i64,
    date: i64,
    chat: Chat,
    from: Option<Sender>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Sender {
    id: i64,
    username: Option<String>,
    #[serde(default)]
    is_bot: bool,
}

/// Member permission set in Telegram's shape; revoked means false
#[derive(Debug, Serialize)]
struct ChatPermissions {
    can_send_messages: bool,
    can_send_media_messages: bool,
    can_send_other_messages: bool,
    can_add_web_page_previews: bool,
}

impl ChatPermissions {
    fn from_restrictions(restrictions: &RestrictionSet) -> Self {
        let send = !restrictions.revoked.contains(&Restriction::SendMessages);
        let media = !restrictions.revoked.contains(&Restriction::SendMedia);
        Self {
            can_send_messages: send,
            can_send_media_messages: media,
            can_send_other_messages: media,
            can_add_web_page_previews: media,
        }
    }

    fn unrestricted() -> Self {
        Self {
            can_send_messages: true,
            can_send_media_messages: true,
            can_send_other_messages: true,
            can_add_web_page_previews: true,
        }
    }
}

/// Thin client over the Bot API; cloneable so the poll task, the sender and
/// the restriction applier can share it
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    token: String,
}

impl TelegramApi {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.token.clone(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &impl Serialize,
    ) -> Result<T, ApiError> {
        let url = format!("https://api.telegram.org/bot{}/{}", self.token, method);
        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| ApiError {
                code: None,
                description: format!("{method} request failed: {e}"),
            })?;

        let body: ApiResponse<T> = response.json().await.map_err(|e| ApiError {
            code: None,
            description: format!("{method} returned malformed body: {e}"),
        })?;

        if !body.ok {
            return Err(ApiError {
                code: body.error_code,
                description: body
                    .description
                    .unwrap_or_else(|| format!("{method} refused without description")),
            });
        }
        body.result.ok_or_else(|| ApiError {
            code: None,
            description: format!("{method} returned no result"),
        })
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ApiError> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": LONG_POLL_SECONDS,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }
}

/// Convert one update into the normalized message shape; bots and non-text
/// payloads are dropped
fn normalize(update: Update) -> Option<ChatMessage> {
    let message = update.message?;
    let from = message.from?;
    if from.is_bot {
        return None;
    }
    let text = message.text?;
    let timestamp = Utc
        .timestamp_opt(message.date, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Some(ChatMessage {
        chat_id: message.chat.id,
        message_id: message.message_id,
        user_id: from.id,
        username: from.username,
        content: text,
        timestamp,
    })
}

/// Telegram long-polling connection implementation
pub struct TelegramConnection {
    api: TelegramApi,
    message_sender: broadcast::Sender<ChatMessage>,
}

impl TelegramConnection {
    pub fn new(config: TelegramConfig) -> Self {
        let (message_sender, _) = broadcast::channel(256);
        Self {
            api: TelegramApi::new(&config),
            message_sender,
        }
    }

    /// Shared API handle, used to build the restriction applier
    pub fn api(&self) -> TelegramApi {
        self.api.clone()
    }
}

#[async_trait]
impl PlatformConnection for TelegramConnection {
    async fn connect(&mut self) -> BotResult<()> {
        let api = self.api.clone();
        let sender = self.message_sender.clone();

        tokio::spawn(async move {
            info!("Telegram long-poll loop started");
            let mut offset = 0i64;
            loop {
                match api.get_updates(offset).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(message) = normalize(update) {
                                debug!(
                                    "Message {} from user {} in chat {}",
                                    message.message_id, message.user_id, message.chat_id
                                );
                                // Only fails when nobody is listening
                                let _ = sender.send(message);
                            }
                        }
                    }
                    Err(e) => {
                        error!("getUpdates failed: {}", e.description);
                        sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Ok(())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> BotResult<()> {
        self.api
            .call::<IncomingMessage>(
                "sendMessage",
                &serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await
            .map(|_| ())
            .map_err(ApiError::platform)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> BotResult<()> {
        self.api
            .call::<bool>(
                "deleteMessage",
                &serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await
            .map(|_| ())
            .map_err(ApiError::platform)
    }

    fn platform_name(&self) -> &str {
        "telegram"
    }

    fn message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>> {
        Some(self.message_sender.subscribe())
    }
}

#[async_trait]
impl RestrictionApplier for TelegramApi {
    async fn apply_restriction(
        &self,
        chat_id: i64,
        user_id: i64,
        restrictions: &RestrictionSet,
        until: DateTime<Utc>,
    ) -> BotResult<()> {
        self.call::<bool>(
            "restrictChatMember",
            &serde_json::json!({
                "chat_id": chat_id,
                "user_id": user_id,
                "permissions": ChatPermissions::from_restrictions(restrictions),
                "until_date": until.timestamp(),
            }),
        )
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!("restrictChatMember refused for user {user_id}: {}", e.description);
            e.restriction()
        })
    }

    async fn lift_restriction(&self, chat_id: i64, user_id: i64) -> BotResult<()> {
        self.call::<bool>(
            "restrictChatMember",
            &serde_json::json!({
                "chat_id": chat_id,
                "user_id": user_id,
                "permissions": ChatPermissions::unrestricted(),
            }),
        )
        .await
        .map(|_| ())
        .map_err(ApiError::restriction)
    }

    async fn ban(&self, chat_id: i64, user_id: i64) -> BotResult<()> {
        self.call::<bool>(
            "banChatMember",
            &serde_json::json!({ "chat_id": chat_id, "user_id": user_id }),
        )
        .await
        .map(|_| ())
        .map_err(ApiError::restriction)
    }

    async fn unban(&self, chat_id: i64, user_id: i64) -> BotResult<()> {
        self.call::<bool>(
            "unbanChatMember",
            &serde_json::json!({
                "chat_id": chat_id,
                "user_id": user_id,
                "only_if_banned": true,
            }),
        )
        .await
        .map(|_| ())
        .map_err(ApiError::restriction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_plain_user_text() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 12,
            "message": {
                "message_id": 34,
                "date": 1700000000,
                "chat": { "id": -100 },
                "from": { "id": 7, "username": "bob", "is_bot": false },
                "text": "hello"
            }
        }))
        .unwrap();

        let message = normalize(update).unwrap();
        assert_eq!(message.chat_id, -100);
        assert_eq!(message.user_id, 7);
        assert_eq!(message.username.as_deref(), Some("bob"));
        assert_eq!(message.content, "hello");
        assert_eq!(message.timestamp.timestamp(), 1700000000);
    }

    #[test]
    fn normalize_drops_bots_and_non_text() {
        let bot_update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 2,
                "date": 1700000000,
                "chat": { "id": -100 },
                "from": { "id": 8, "is_bot": true },
                "text": "beep"
            }
        }))
        .unwrap();
        assert!(normalize(bot_update).is_none());

        let sticker_update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 2,
            "message": {
                "message_id": 3,
                "date": 1700000000,
                "chat": { "id": -100 },
                "from": { "id": 9, "is_bot": false }
            }
        }))
        .unwrap();
        assert!(normalize(sticker_update).is_none());

        let bare_update: Update =
            serde_json::from_value(serde_json::json!({ "update_id": 3 })).unwrap();
        assert!(normalize(bare_update).is_none());
    }

    #[test]
    fn no_send_restriction_revokes_everything() {
        let perms = ChatPermissions::from_restrictions(&RestrictionSet::no_send());
        assert!(!perms.can_send_messages);
        assert!(!perms.can_send_media_messages);

        let text_only = RestrictionSet {
            revoked: vec![Restriction::SendMessages],
        };
        let perms = ChatPermissions::from_restrictions(&text_only);
        assert!(!perms.can_send_messages);
        assert!(perms.can_send_media_messages);
    }

    #[test]
    fn api_errors_map_by_code() {
        let refused = ApiError {
            code: Some(400),
            description: "user is an administrator of the chat".into(),
        };
        assert!(matches!(refused.restriction(), BotError::Permission(_)));

        let flooded = ApiError {
            code: Some(429),
            description: "too many requests".into(),
        };
        assert!(matches!(flooded.restriction(), BotError::Platform(_)));
    }
}
