// src/bot/clock.rs - Injectable time source

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Time source threaded through the moderation engine so mute expiry and
/// escalation timing are deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, the production source
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Clock for Arc<dyn Clock> {
    fn now(&self) -> DateTime<Utc> {
        self.as_ref().now()
    }
}
