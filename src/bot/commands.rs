// src/bot/commands.rs - Command table and dispatch to engine operations

use log::{debug, info};
use regex::Regex;
use std::sync::Arc;

use crate::bot::clock::Clock;
use crate::bot::engine::ModerationEngine;
use crate::bot::leaderboard::{ConfirmOutcome, Leaderboard, PointsOutcome};
use crate::config::BotConfig;
use crate::store::UserRecordStore;
use crate::types::{BotError, BotResult, ChatMessage, MuteDuration, UserRecord};

/// Everything a command handler may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Info,
    Warn,
    Mute,
    Unmute,
    Ban,
    Unban,
    Stats,
    TopChatters,
    AddPoints,
    Rename,
    RemoveUser,
    Top,
    List,
    Help,
}

struct CommandSpec {
    name: &'static str,
    admin_only: bool,
    kind: CommandKind,
}

/// The full command surface; routing and admin gating read this table so no
/// handler re-derives either
const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "info", admin_only: false, kind: CommandKind::Info },
    CommandSpec { name: "warn", admin_only: true, kind: CommandKind::Warn },
    CommandSpec { name: "mute", admin_only: true, kind: CommandKind::Mute },
    CommandSpec { name: "unmute", admin_only: true, kind: CommandKind::Unmute },
    CommandSpec { name: "ban", admin_only: true, kind: CommandKind::Ban },
    CommandSpec { name: "unban", admin_only: true, kind: CommandKind::Unban },
    CommandSpec { name: "stats", admin_only: true, kind: CommandKind::Stats },
    CommandSpec { name: "topchatters", admin_only: true, kind: CommandKind::TopChatters },
    CommandSpec { name: "addpoints", admin_only: true, kind: CommandKind::AddPoints },
    CommandSpec { name: "rename", admin_only: true, kind: CommandKind::Rename },
    CommandSpec { name: "removeuser", admin_only: true, kind: CommandKind::RemoveUser },
    CommandSpec { name: "top", admin_only: false, kind: CommandKind::Top },
    CommandSpec { name: "list", admin_only: false, kind: CommandKind::List },
    CommandSpec { name: "help", admin_only: false, kind: CommandKind::Help },
];

/// Routes command text to engine/leaderboard operations and renders replies
pub struct CommandDispatcher<C: Clock> {
    engine: Arc<ModerationEngine<C>>,
    store: Arc<dyn UserRecordStore>,
    board: Arc<Leaderboard>,
    config: Arc<BotConfig>,
    clock: C,
}

impl<C: Clock> CommandDispatcher<C> {
    pub fn new(
        engine: Arc<ModerationEngine<C>>,
        store: Arc<dyn UserRecordStore>,
        board: Arc<Leaderboard>,
        config: Arc<BotConfig>,
        clock: C,
    ) -> Self {
        Self {
            engine,
            store,
            board,
            config,
            clock,
        }
    }

    /// Handle one inbound message. Returns the reply text, or None when the
    /// message is neither a command nor a pending confirmation answer.
    pub async fn handle(&self, message: &ChatMessage) -> Option<String> {
        if message.is_command() {
            return Some(self.dispatch(message).await);
        }
        self.handle_confirmation(message).await
    }

    async fn dispatch(&self, message: &ChatMessage) -> String {
        let without_slash = &message.content[1..];
        let mut parts = without_slash.splitn(2, char::is_whitespace);
        let word = parts.next().unwrap_or_default();
        // Group chats address commands as /cmd@botname
        let name = word.split('@').next().unwrap_or(word).to_lowercase();
        let args = parts.next().unwrap_or("").trim();

        let Some(spec) = COMMANDS.iter().find(|spec| spec.name == name) else {
            debug!("Unknown command '{}' from user {}", name, message.user_id);
            return format!("⚠️ Unknown command /{name}. See /help.");
        };

        if spec.admin_only && !self.config.is_admin(message.user_id) {
            return "❌ You don't have permission to use this command.".to_string();
        }

        info!("Command /{} from user {}", spec.name, message.user_id);
        match self.run(spec.kind, message, args).await {
            Ok(reply) => reply,
            Err(e) => render_error(&e),
        }
    }

    async fn run(&self, kind: CommandKind, message: &ChatMessage, args: &str) -> BotResult<String> {
        match kind {
            CommandKind::Info => self.cmd_info(message, args).await,
            CommandKind::Warn => self.cmd_warn(message, args).await,
            CommandKind::Mute => self.cmd_mute(args).await,
            CommandKind::Unmute => self.cmd_unmute(args).await,
            CommandKind::Ban => self.cmd_ban(args).await,
            CommandKind::Unban => self.cmd_unban(args).await,
            CommandKind::Stats => self.cmd_stats().await,
            CommandKind::TopChatters => self.cmd_top_chatters(args).await,
            CommandKind::AddPoints => self.cmd_add_points(message, args).await,
            CommandKind::Rename => self.cmd_rename(args).await,
            CommandKind::RemoveUser => self.cmd_remove_user(args).await,
            CommandKind::Top => self.cmd_top(args).await,
            CommandKind::List => self.cmd_list().await,
            CommandKind::Help => Ok(help_text()),
        }
    }

    /// Non-command text only matters as a yes/no answer to a pending
    /// leaderboard entry creation from the same admin
    async fn handle_confirmation(&self, message: &ChatMessage) -> Option<String> {
        if !self.board.has_pending(message.user_id).await {
            return None;
        }
        let accept = match message.content.trim().to_lowercase().as_str() {
            "yes" => true,
            "no" => false,
            _ => return Some("⚠️ Please reply with \"yes\" or \"no\".".to_string()),
        };
        match self.board.confirm_pending(message.user_id, accept).await {
            Ok(ConfirmOutcome::Created { name, points }) => {
                Some(format!("✅ New entry created: {name} with {points} points."))
            }
            Ok(ConfirmOutcome::Cancelled) => Some("❌ Update canceled.".to_string()),
            Ok(ConfirmOutcome::NothingPending) => None,
            Err(e) => Some(render_error(&e)),
        }
    }

    async fn resolve_user(&self, raw: &str) -> BotResult<UserRecord> {
        let name = raw.trim().trim_start_matches('@');
        if name.is_empty() {
            return Err(BotError::Validation("please specify a username".to_string()));
        }
        self.store
            .find_by_username(name)
            .await?
            .ok_or_else(|| BotError::NotFound(name.to_string()))
    }

    async fn cmd_info(&self, message: &ChatMessage, args: &str) -> BotResult<String> {
        let target = if args.is_empty() {
            message.username.clone().ok_or_else(|| {
                BotError::Validation("you have no username; specify one explicitly".to_string())
            })?
        } else {
            args.to_string()
        };

        let record = self.resolve_user(&target).await?;
        let muted = self.engine.is_muted(record.user_id).await?;
        Ok(format!(
            "👤 {} - Messages: {}, Warnings: {}, Muted: {}",
            record.username.as_deref().unwrap_or("<unknown>"),
            record.message_count,
            record.warning_count,
            muted
        ))
    }

    async fn cmd_warn(&self, message: &ChatMessage, args: &str) -> BotResult<String> {
        let mut parts = args.splitn(2, char::is_whitespace);
        let target = parts.next().unwrap_or_default();
        let reason = parts.next().map(str::trim).filter(|r| !r.is_empty());

        let record = self.resolve_user(target).await?;
        let outcome = self
            .engine
            .warn_user(record.user_id, reason, message.user_id)
            .await?;

        Ok(if outcome.escalated {
            let until = outcome.mute_until.expect("escalation carries a mute window");
            format!(
                "⚠️ {target} warned (total: {}). Auto-muted until {}.",
                outcome.warning_count,
                until.format("%Y-%m-%d %H:%M UTC")
            )
        } else {
            format!("⚠️ {target} warned (total: {}).", outcome.warning_count)
        })
    }

    async fn cmd_mute(&self, args: &str) -> BotResult<String> {
        let mut parts = args.split_whitespace();
        let target = parts.next().unwrap_or_default();
        let duration = match parts.next() {
            Some(token) => MuteDuration::parse(token)?,
            None => MuteDuration::minutes(self.config.default_mute_minutes),
        };

        let record = self.resolve_user(target).await?;
        let until = self.engine.mute_user(record.user_id, duration).await?;
        Ok(format!(
            "🔇 {target} muted until {}.",
            until.format("%Y-%m-%d %H:%M UTC")
        ))
    }

    async fn cmd_unmute(&self, args: &str) -> BotResult<String> {
        let record = self.resolve_user(args).await?;
        self.engine.unmute_user(record.user_id).await?;
        Ok(format!("🔊 {} has been unmuted.", args.trim()))
    }

    async fn cmd_ban(&self, args: &str) -> BotResult<String> {
        let record = self.resolve_user(args).await?;
        self.engine.ban_user(record.user_id).await?;
        Ok(format!("🔨 {} has been banned.", args.trim()))
    }

    async fn cmd_unban(&self, args: &str) -> BotResult<String> {
        let record = self.resolve_user(args).await?;
        self.engine.unban_user(record.user_id).await?;
        Ok(format!("✅ {} has been unbanned.", args.trim()))
    }

    async fn cmd_stats(&self) -> BotResult<String> {
        let stats = self.store.stats(self.clock.now()).await?;
        Ok(format!(
            "📊 Users: {} | Messages: {} | Warnings: {} | Currently muted: {}",
            stats.total_users, stats.total_messages, stats.total_warnings, stats.muted_users
        ))
    }

    async fn cmd_top_chatters(&self, args: &str) -> BotResult<String> {
        let limit = parse_limit(args, self.config.top_chatters_limit)?;
        let records = self.store.top_by_message_count(limit).await?;
        if records.is_empty() {
            return Ok("No messages tracked yet.".to_string());
        }
        let mut text = format!("💬 Top {limit} chatters:\n\n");
        for (index, record) in records.iter().enumerate() {
            text.push_str(&format!(
                "{}. {}: {}\n",
                index + 1,
                record.username.as_deref().unwrap_or("<unknown>"),
                record.message_count
            ));
        }
        Ok(text)
    }

    async fn cmd_add_points(&self, message: &ChatMessage, args: &str) -> BotResult<String> {
        let (name, delta) = parse_points_args(args)?;
        match self.board.add_points(message.user_id, &name, delta).await? {
            PointsOutcome::Updated { name, total } => Ok(format!(
                "✅ {name} updated by {}{delta} points (now {total}).",
                if delta > 0.0 { "+" } else { "" }
            )),
            PointsOutcome::NeedsConfirmation { name, delta } => Ok(format!(
                "⚠️ {name} does not exist. Create new entry with {delta} points? Reply with \"yes\" or \"no\"."
            )),
        }
    }

    async fn cmd_rename(&self, args: &str) -> BotResult<String> {
        let (old_name, new_name) = args
            .split_once(',')
            .map(|(a, b)| (a.trim(), b.trim()))
            .filter(|(a, b)| !a.is_empty() && !b.is_empty())
            .ok_or_else(|| {
                BotError::Validation("use: /rename old_name, new_name".to_string())
            })?;
        self.board.rename(old_name, new_name).await?;
        Ok(format!("✅ Renamed \"{old_name}\" to \"{new_name}\"."))
    }

    async fn cmd_remove_user(&self, args: &str) -> BotResult<String> {
        let name = args.trim();
        if name.is_empty() {
            return Err(BotError::Validation("use: /removeuser name".to_string()));
        }
        self.board.remove(name).await?;
        Ok(format!("✅ Deleted entry \"{name}\"."))
    }

    async fn cmd_top(&self, args: &str) -> BotResult<String> {
        let limit = parse_limit(args, 10)?;
        let entries = self.board.top(limit).await?;
        let total = self.board.list().await?.len();
        Ok(self
            .board
            .render(&entries, &format!("Top {limit}"), entries.len() < total))
    }

    async fn cmd_list(&self) -> BotResult<String> {
        let entries = self.board.list().await?;
        Ok(self.board.render(&entries, "Full points list", false))
    }
}

fn parse_limit(args: &str, default: usize) -> BotResult<usize> {
    if args.is_empty() {
        return Ok(default);
    }
    let limit: usize = args
        .parse()
        .map_err(|_| BotError::Validation(format!("'{args}' is not a number")))?;
    if limit == 0 {
        return Err(BotError::Validation("limit must be positive".to_string()));
    }
    Ok(limit)
}

/// Split `/addpoints <name> <±delta>` args; the name may contain spaces
fn parse_points_args(args: &str) -> BotResult<(String, f64)> {
    let re = Regex::new(r"^(.+?)\s+([-+]?[0-9]+(?:\.[0-9]+)?)$").expect("points grammar is valid");
    let caps = re
        .captures(args.trim())
        .ok_or_else(|| BotError::Validation("use: /addpoints name +/-points".to_string()))?;
    let delta: f64 = caps[2]
        .parse()
        .map_err(|_| BotError::Validation("points delta is out of range".to_string()))?;
    Ok((caps[1].trim().to_string(), delta))
}

fn render_error(error: &BotError) -> String {
    match error {
        BotError::NotFound(name) => format!("❌ User \"{name}\" not found."),
        BotError::Validation(msg) => format!("⚠️ {msg}"),
        BotError::Permission(msg) => format!("❌ {msg}"),
        BotError::Storage(_) | BotError::Conflict | BotError::Platform(_) => {
            "❌ Something went wrong. Check the bot logs.".to_string()
        }
    }
}

fn help_text() -> String {
    let mut text = String::from("🟢 Available commands:\n\n");
    text.push_str("/top [n] — top points entries (default 10)\n");
    text.push_str("/list — the full points list\n");
    text.push_str("/info [username] — message and warning counters\n");
    text.push_str("/help — this message\n");
    text.push_str("\n🔒 Admin commands:\n\n");
    text.push_str("/addpoints name +/-points — adjust an entry\n");
    text.push_str("/rename old_name, new_name — rename an entry\n");
    text.push_str("/removeuser name — delete an entry\n");
    text.push_str("/warn username [reason] — warn a user\n");
    text.push_str("/mute username [10m|2h|1d] — mute (default 60 minutes)\n");
    text.push_str("/unmute username — lift a mute\n");
    text.push_str("/ban username | /unban username\n");
    text.push_str("/stats — chat statistics\n");
    text.push_str("/topchatters [n] — most active users\n");
    text
}
