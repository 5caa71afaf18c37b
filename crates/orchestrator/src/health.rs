//! Channel liveness polling and bounded recovery.
//!
//! Per-bot state machine: healthy ⇄ unhealthy → (recovery attempt) →
//! healthy | failed. Recovery recreates the channel from the original
//! credentials; a failed recreation is terminal and needs external
//! intervention.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::channel::ChannelFactory;
use crate::error::OrchestratorError;
use crate::registry::{BotRegistry, BotStatus};

/// Consecutive probe errors that force a recovery attempt.
pub const ERROR_THRESHOLD: u32 = 3;

/// Pause between stopping a dead channel and recreating it.
pub const RECOVERY_DELAY: Duration = Duration::from_secs(2);

/// Default liveness polling interval.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic health checker over all registered bots.
pub struct HealthMonitor {
    registry: Arc<BotRegistry>,
    factory: Arc<dyn ChannelFactory>,
    interval: Duration,
    recovery_delay: Duration,
}

impl HealthMonitor {
    /// Wire up a monitor over the registry, recreating channels through
    /// the given factory.
    pub fn new(
        registry: Arc<BotRegistry>,
        factory: Arc<dyn ChannelFactory>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            interval,
            recovery_delay: RECOVERY_DELAY,
        }
    }

    /// Shrink the recovery pause (tests).
    #[cfg(test)]
    pub fn with_recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    /// Run the monitor until the task is aborted.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// One pass over all bots.
    pub async fn run_cycle(&self) {
        for bot_id in self.registry.bot_ids().await {
            self.check_bot(&bot_id).await;
        }
    }

    /// Probe one bot and drive its state machine.
    pub async fn check_bot(&self, bot_id: &str) {
        let Ok(status) = self.registry.status(bot_id).await else {
            return;
        };
        // Terminal: no probing, no recovery.
        if status == BotStatus::Failed {
            return;
        }
        let Ok(channel) = self.registry.channel(bot_id).await else {
            return;
        };

        match channel.is_connected().await {
            Ok(true) => {
                self.registry.mark_health_check(bot_id, Utc::now()).await;
                if status != BotStatus::Healthy {
                    info!(bot = %bot_id, "channel back to healthy");
                    self.registry.set_status(bot_id, BotStatus::Healthy).await;
                }
                self.registry.reset_errors(bot_id).await;
            }
            Ok(false) => {
                self.registry.mark_health_check(bot_id, Utc::now()).await;
                if status != BotStatus::Unhealthy {
                    warn!(bot = %bot_id, "channel lost liveness");
                    self.registry.set_status(bot_id, BotStatus::Unhealthy).await;
                    if let Err(err) = self.recover_bot(bot_id).await {
                        error!(bot = %bot_id, "recovery failed: {err}");
                    }
                }
            }
            Err(err) => {
                let errors = self.registry.record_error(bot_id).await;
                warn!(bot = %bot_id, errors, "health check errored: {err}");
                if errors >= ERROR_THRESHOLD {
                    self.registry.set_status(bot_id, BotStatus::Unhealthy).await;
                    if let Err(err) = self.recover_bot(bot_id).await {
                        error!(bot = %bot_id, "recovery failed: {err}");
                    }
                }
            }
        }
    }

    /// Stop the dead channel, wait, and recreate it from the original
    /// credentials. Failure is terminal for the bot.
    pub async fn recover_bot(&self, bot_id: &str) -> Result<(), OrchestratorError> {
        info!(bot = %bot_id, "recovering channel");

        let old = self.registry.channel(bot_id).await?;
        old.stop().await;
        tokio::time::sleep(self.recovery_delay).await;

        let credentials = self.registry.credentials(bot_id).await?;
        match self.factory.create(&credentials).await {
            Ok(channel) => {
                self.registry.replace_channel(bot_id, channel).await;
                self.registry.set_status(bot_id, BotStatus::Healthy).await;
                self.registry.reset_errors(bot_id).await;
                info!(bot = %bot_id, "channel recovered");
                Ok(())
            }
            Err(err) => {
                self.registry.set_status(bot_id, BotStatus::Failed).await;
                Err(OrchestratorError::Recovery(format!(
                    "bot '{bot_id}': channel recreation failed: {err}"
                )))
            }
        }
    }
}
