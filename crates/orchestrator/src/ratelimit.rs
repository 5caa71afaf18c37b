//! Daily rate gating.
//!
//! Counters live in the database keyed by UTC date; the limit comes from
//! the brain. Denied turns get a fixed-format notice and never reach the
//! agent.

use brain_core::BrainConfig;
use chrono::Utc;
use troupe_database::{rate_limit, Database};

use crate::error::OrchestratorError;

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    /// Whether the turn may proceed.
    pub allowed: bool,
    /// Messages already counted today.
    pub current: i64,
    /// The brain's daily limit.
    pub limit: u32,
}

/// Daily per-user rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    db: Database,
}

impl RateLimiter {
    /// Create a limiter over the shared database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Check whether a pair may send another message today.
    pub async fn check_limit(
        &self,
        bot_id: &str,
        user_id: &str,
        brain: &BrainConfig,
    ) -> Result<RateDecision, OrchestratorError> {
        let today = Utc::now().date_naive();
        let current = rate_limit::count_for_day(self.db.pool(), bot_id, user_id, today).await?;
        Ok(RateDecision {
            allowed: current < i64::from(brain.daily_message_limit),
            current,
            limit: brain.daily_message_limit,
        })
    }

    /// Count one handled message for today.
    pub async fn increment(&self, bot_id: &str, user_id: &str) -> Result<(), OrchestratorError> {
        let today = Utc::now().date_naive();
        rate_limit::increment(self.db.pool(), bot_id, user_id, today).await?;
        Ok(())
    }
}

/// The fixed-format notice sent when the daily limit is reached.
pub fn limit_notice(decision: &RateDecision) -> String {
    format!(
        "Daily limit reached ({}/{}). Your messages reset at midnight UTC.",
        decision.current, decision.limit
    )
}
