// src/bot/engine.rs - Warning-escalation state machine and mute tracking

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;

use crate::bot::clock::Clock;
use crate::platforms::RestrictionApplier;
use crate::store::UserRecordStore;
use crate::types::{BotError, BotResult, MuteDuration, RestrictionSet, WarnOutcome};

/// Warning-escalation policy.
///
/// Canonical behavior: warnings accumulate for the lifetime of the record and
/// every `warnings_per_tier`-th warning crosses a tier; crossing tier `t`
/// auto-mutes for `t` days. The alternative `reset_on_escalation` flag resets
/// the counter after each escalation, turning "lifetime warnings" into
/// "warnings since last mute" (every escalation is then tier 1).
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    pub warnings_per_tier: u32,
    pub reset_on_escalation: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            warnings_per_tier: 3,
            reset_on_escalation: false,
        }
    }
}

/// The moderation core: per-user state is only `warning_count` and
/// `mute_until` in the store; time comes from the injected clock; platform
/// effects go through the restriction applier.
pub struct ModerationEngine<C: Clock> {
    store: Arc<dyn UserRecordStore>,
    applier: Arc<dyn RestrictionApplier>,
    clock: C,
    policy: EscalationPolicy,
    chat_id: i64,
}

impl<C: Clock> ModerationEngine<C> {
    pub fn new(
        store: Arc<dyn UserRecordStore>,
        applier: Arc<dyn RestrictionApplier>,
        clock: C,
        policy: EscalationPolicy,
        chat_id: i64,
    ) -> Self {
        Self {
            store,
            applier,
            clock,
            policy,
            chat_id,
        }
    }

    /// True iff the stored mute window extends past the current instant.
    /// Pure read; an expired window is simply ignored (lazy expiry).
    pub async fn is_muted(&self, user_id: i64) -> BotResult<bool> {
        let record = self.store.get_or_create(user_id).await?;
        Ok(record.is_muted_at(self.clock.now()))
    }

    /// Record a warning and escalate if a tier boundary was just crossed
    pub async fn warn_user(
        &self,
        user_id: i64,
        reason: Option<&str>,
        issuer_id: i64,
    ) -> BotResult<WarnOutcome> {
        let record = self.store.increment_warning(user_id).await?;
        let n = record.warning_count;

        let per_tier = self.policy.warnings_per_tier;
        let tier = n / per_tier;
        let prev_tier = (n - 1) / per_tier;

        info!(
            "Warning {} for user {} issued by {} (reason: {})",
            n,
            user_id,
            issuer_id,
            reason.unwrap_or("none")
        );

        if tier <= prev_tier {
            return Ok(WarnOutcome {
                warning_count: n,
                escalated: false,
                mute_until: None,
            });
        }

        // Tier boundary crossed: mute for `tier` days
        let until = self.clock.now() + chrono::Duration::days(tier as i64);
        self.store.set_mute(user_id, Some(until)).await?;
        if self.policy.reset_on_escalation {
            self.store.reset_warnings(user_id).await?;
        }
        info!(
            "User {} crossed escalation tier {}, auto-muted until {}",
            user_id, tier, until
        );
        self.apply_no_send(user_id, until).await?;

        Ok(WarnOutcome {
            warning_count: n,
            escalated: true,
            mute_until: Some(until),
        })
    }

    /// Explicit admin mute; replaces any prior window (last-writer-wins)
    pub async fn mute_user(
        &self,
        user_id: i64,
        duration: MuteDuration,
    ) -> BotResult<DateTime<Utc>> {
        let until = self.clock.now() + duration.as_duration();
        self.store.set_mute(user_id, Some(until)).await?;
        info!("User {} muted until {}", user_id, until);
        self.apply_no_send(user_id, until).await?;
        Ok(until)
    }

    /// Clear any mute window. Idempotent: unmuting a clear user succeeds.
    pub async fn unmute_user(&self, user_id: i64) -> BotResult<()> {
        self.store.set_mute(user_id, None).await?;
        self.applier.lift_restriction(self.chat_id, user_id).await?;
        info!("User {} unmuted", user_id);
        Ok(())
    }

    pub async fn ban_user(&self, user_id: i64) -> BotResult<()> {
        self.applier.ban(self.chat_id, user_id).await?;
        info!("User {} banned", user_id);
        Ok(())
    }

    pub async fn unban_user(&self, user_id: i64) -> BotResult<()> {
        self.applier.unban(self.chat_id, user_id).await?;
        info!("User {} unbanned", user_id);
        Ok(())
    }

    /// Apply the no-send restriction after local state is already persisted.
    /// On a permission refusal the local record stays the source of truth:
    /// is_muted keeps reporting muted even though the platform never
    /// restricted the member, and the discrepancy is logged before the error
    /// propagates.
    async fn apply_no_send(&self, user_id: i64, until: DateTime<Utc>) -> BotResult<()> {
        match self
            .applier
            .apply_restriction(self.chat_id, user_id, &RestrictionSet::no_send(), until)
            .await
        {
            Ok(()) => Ok(()),
            Err(BotError::Permission(msg)) => {
                warn!(
                    "Mute for user {} recorded locally but platform refused the restriction: {}",
                    user_id, msg
                );
                Err(BotError::Permission(msg))
            }
            Err(e) => Err(e),
        }
    }
}
