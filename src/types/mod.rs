// src/types/mod.rs - Shared data types for moderation and leaderboard systems

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One inbound chat message, normalized from the platform wire format
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Commands start with the platform-conventional slash prefix
    pub fn is_command(&self) -> bool {
        self.content.starts_with('/')
    }
}

/// Durable per-user moderation counters, one record per chat participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: Option<String>,
    pub message_count: u64,
    pub warning_count: u32,
    pub join_seen_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub mute_until: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            username: None,
            message_count: 0,
            warning_count: 0,
            join_seen_at: None,
            last_message_at: None,
            mute_until: None,
        }
    }

    /// Lazy expiry: a stored mute in the past counts as no mute at all
    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.mute_until, Some(until) if until > now)
    }
}

/// Aggregate snapshot over all user records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_users: u64,
    pub total_messages: u64,
    pub total_warnings: u64,
    pub muted_users: u64,
}

/// Result of a warn action, including whether an escalation tier was crossed
#[derive(Debug, Clone)]
pub struct WarnOutcome {
    pub warning_count: u32,
    pub escalated: bool,
    pub mute_until: Option<DateTime<Utc>>,
}

/// Units accepted by the mute duration grammar `^\d+[mhd]?$`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Minute,
    Hour,
    Day,
}

impl DurationUnit {
    pub fn as_duration(&self, count: u32) -> chrono::Duration {
        match self {
            DurationUnit::Minute => chrono::Duration::minutes(count as i64),
            DurationUnit::Hour => chrono::Duration::hours(count as i64),
            DurationUnit::Day => chrono::Duration::days(count as i64),
        }
    }
}

/// A parsed mute duration token such as "10", "10m", "2h", "1d"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteDuration {
    pub count: u32,
    pub unit: DurationUnit,
}

impl MuteDuration {
    pub fn minutes(count: u32) -> Self {
        Self {
            count,
            unit: DurationUnit::Minute,
        }
    }

    /// Parse a duration token. Suffix defaults to minutes when omitted.
    pub fn parse(token: &str) -> Result<Self, BotError> {
        // Compiled per call; duration tokens arrive at human command rates
        let re = Regex::new(r"^(\d+)([mhd]?)$").expect("duration grammar is valid");
        let caps = re.captures(token).ok_or_else(|| {
            BotError::Validation(format!("invalid duration '{token}', use like 10m, 2h, 1d"))
        })?;

        let count: u32 = caps[1]
            .parse()
            .map_err(|_| BotError::Validation(format!("duration '{token}' is out of range")))?;
        if count == 0 {
            return Err(BotError::Validation("duration must be positive".to_string()));
        }

        let unit = match &caps[2] {
            "h" => DurationUnit::Hour,
            "d" => DurationUnit::Day,
            _ => DurationUnit::Minute,
        };

        Ok(Self { count, unit })
    }

    pub fn as_duration(&self) -> chrono::Duration {
        self.unit.as_duration(self.count)
    }
}

/// Platform permissions revoked by a restriction window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    SendMessages,
    SendMedia,
}

/// The set of permissions a restriction call revokes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionSet {
    pub revoked: Vec<Restriction>,
}

impl RestrictionSet {
    /// The standard mute: no text, no media
    pub fn no_send() -> Self {
        Self {
            revoked: vec![Restriction::SendMessages, Restriction::SendMedia],
        }
    }
}

/// One named points entry in the remote leaderboard document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEntry {
    pub name: String,
    pub points: f64,
}

/// Typed domain errors; the command layer maps each variant to one reply
#[derive(Debug, Error)]
pub enum BotError {
    #[error("user '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("concurrent update conflict")]
    Conflict,

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("platform call failed: {0}")]
    Platform(String),
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_defaults_to_minutes() {
        let d = MuteDuration::parse("10").unwrap();
        assert_eq!(d, MuteDuration::minutes(10));
        assert_eq!(d.as_duration(), chrono::Duration::minutes(10));
    }

    #[test]
    fn duration_accepts_all_units() {
        assert_eq!(
            MuteDuration::parse("10m").unwrap().as_duration(),
            chrono::Duration::minutes(10)
        );
        assert_eq!(
            MuteDuration::parse("2h").unwrap().as_duration(),
            chrono::Duration::hours(2)
        );
        assert_eq!(
            MuteDuration::parse("1d").unwrap().as_duration(),
            chrono::Duration::days(1)
        );
    }

    #[test]
    fn duration_rejects_garbage() {
        for bad in ["abc", "10x", "-5m", "", "m", "5 m"] {
            assert!(
                matches!(MuteDuration::parse(bad), Err(BotError::Validation(_))),
                "expected rejection of {bad:?}"
            );
        }
    }

    #[test]
    fn duration_rejects_zero() {
        assert!(matches!(MuteDuration::parse("0"), Err(BotError::Validation(_))));
    }

    #[test]
    fn mute_expiry_is_lazy() {
        let now = Utc::now();
        let mut record = UserRecord::new(7);
        assert!(!record.is_muted_at(now));

        record.mute_until = Some(now + chrono::Duration::minutes(5));
        assert!(record.is_muted_at(now));
        assert!(!record.is_muted_at(now + chrono::Duration::minutes(6)));

        // Exactly at the boundary the window is over
        record.mute_until = Some(now);
        assert!(!record.is_muted_at(now));
    }
}
