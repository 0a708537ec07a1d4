// src/config/mod.rs - Bot configuration: TOML file plus environment secrets

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::bot::engine::EscalationPolicy;

/// Escalation policy knobs as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub warnings_per_tier: u32,
    /// Alternative policy: clear the warning counter after each auto-mute,
    /// counting "warnings since last mute" instead of lifetime warnings
    pub reset_on_escalation: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            warnings_per_tier: 3,
            reset_on_escalation: false,
        }
    }
}

impl From<&EscalationConfig> for EscalationPolicy {
    fn from(config: &EscalationConfig) -> Self {
        Self {
            warnings_per_tier: config.warnings_per_tier.max(1),
            reset_on_escalation: config.reset_on_escalation,
        }
    }
}

/// Remote leaderboard document coordinates (GitHub repository file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    pub repo_owner: String,
    pub repo_name: String,
    #[serde(default = "default_board_path")]
    pub file_path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub website_url: Option<String>,
}

fn default_board_path() -> String {
    "data.json".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

/// Top-level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// The one moderated group chat
    pub chat_id: i64,
    pub owner_id: i64,
    pub admin_ids: Vec<i64>,
    /// Default mute length when the command omits a duration
    pub default_mute_minutes: u32,
    pub top_chatters_limit: usize,
    pub store_path: String,
    pub escalation: EscalationConfig,
    pub leaderboard: Option<LeaderboardConfig>,

    /// Bot API token; never stored in the file, always from the environment
    #[serde(skip)]
    pub telegram_token: String,
    /// Remote document store token, from the environment
    #[serde(skip)]
    pub github_token: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            chat_id: 0,
            owner_id: 0,
            admin_ids: Vec::new(),
            default_mute_minutes: 60,
            top_chatters_limit: 10,
            store_path: "guardbot-users.json".to_string(),
            escalation: EscalationConfig::default(),
            leaderboard: None,
            telegram_token: String::new(),
            github_token: None,
        }
    }
}

impl BotConfig {
    /// Load the TOML file (if present) and merge in environment secrets
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let config: BotConfig = toml::from_str(&text)
                    .with_context(|| format!("invalid config file {path:?}"))?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No config file at {:?}, using defaults", path);
                BotConfig::default()
            }
            Err(e) => return Err(e).with_context(|| format!("cannot read {path:?}")),
        };

        config.telegram_token =
            env::var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN environment variable not set")?;
        config.github_token = env::var("GITHUB_TOKEN").ok();

        if let Ok(owner) = env::var("OWNER_ID") {
            config.owner_id = owner.parse().context("OWNER_ID must be an integer")?;
        }
        if let Ok(chat) = env::var("CHAT_ID") {
            config.chat_id = chat.parse().context("CHAT_ID must be an integer")?;
        }

        if config.leaderboard.is_some() && config.github_token.is_none() {
            warn!("Leaderboard repo configured but GITHUB_TOKEN is not set; leaderboard will be local-only");
        }

        Ok(config)
    }

    /// Owner plus the configured admin list
    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.owner_id || self.admin_ids.contains(&user_id)
    }
}
