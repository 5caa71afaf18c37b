//! Owned registry of bot instances.
//!
//! All mutation of bot state goes through accessor methods here; nothing
//! else holds the maps. The registry also retains handles of delayed
//! call-to-action tasks so shutdown can cancel them instead of letting
//! them fire against a torn-down channel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::channel::{ChannelCredentials, MessagingChannel};
use crate::error::OrchestratorError;

/// Health status of one bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStatus {
    /// Channel is live.
    Healthy,
    /// Liveness lost; recovery pending or underway.
    Unhealthy,
    /// Recovery failed. Terminal; requires external intervention.
    Failed,
}

struct BotEntry {
    brain_id: String,
    credentials: ChannelCredentials,
    channel: Arc<dyn MessagingChannel>,
    status: BotStatus,
    last_health_check: Option<DateTime<Utc>>,
    message_count: u64,
    error_count: u32,
}

/// Read-only view of one bot's state.
#[derive(Debug, Clone)]
pub struct BotSnapshot {
    /// Bot id.
    pub bot_id: String,
    /// Brain backing this bot.
    pub brain_id: String,
    /// Current health status.
    pub status: BotStatus,
    /// Time of the last liveness probe.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Messages handled since registration.
    pub message_count: u64,
    /// Consecutive channel errors since the last healthy transition.
    pub error_count: u32,
}

/// Registry of all bots on the platform.
#[derive(Default)]
pub struct BotRegistry {
    bots: RwLock<HashMap<String, BotEntry>>,
    cta_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BotRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bot. Rejects empty identity/credential/brain fields;
    /// callers skip the bot on error rather than aborting the platform.
    pub async fn register(
        &self,
        bot_id: impl Into<String>,
        brain_id: impl Into<String>,
        credentials: ChannelCredentials,
        channel: Arc<dyn MessagingChannel>,
    ) -> Result<(), OrchestratorError> {
        let bot_id = bot_id.into();
        let brain_id = brain_id.into();
        if bot_id.trim().is_empty() {
            return Err(OrchestratorError::Configuration(
                "bot id must not be empty".to_string(),
            ));
        }
        if brain_id.trim().is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "bot '{bot_id}': brain id must not be empty"
            )));
        }
        if credentials.token.trim().is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "bot '{bot_id}': channel token must not be empty"
            )));
        }

        info!(bot = %bot_id, brain = %brain_id, "registered bot");
        self.bots.write().await.insert(
            bot_id,
            BotEntry {
                brain_id,
                credentials,
                channel,
                status: BotStatus::Healthy,
                last_health_check: None,
                message_count: 0,
                error_count: 0,
            },
        );
        Ok(())
    }

    /// All registered bot ids.
    pub async fn bot_ids(&self) -> Vec<String> {
        self.bots.read().await.keys().cloned().collect()
    }

    /// The channel currently bound to a bot.
    pub async fn channel(
        &self,
        bot_id: &str,
    ) -> Result<Arc<dyn MessagingChannel>, OrchestratorError> {
        self.bots
            .read()
            .await
            .get(bot_id)
            .map(|entry| entry.channel.clone())
            .ok_or_else(|| OrchestratorError::UnknownBot(bot_id.to_string()))
    }

    /// The brain id backing a bot.
    pub async fn brain_id(&self, bot_id: &str) -> Result<String, OrchestratorError> {
        self.bots
            .read()
            .await
            .get(bot_id)
            .map(|entry| entry.brain_id.clone())
            .ok_or_else(|| OrchestratorError::UnknownBot(bot_id.to_string()))
    }

    /// Credentials the bot's channel was created from.
    pub async fn credentials(&self, bot_id: &str) -> Result<ChannelCredentials, OrchestratorError> {
        self.bots
            .read()
            .await
            .get(bot_id)
            .map(|entry| entry.credentials.clone())
            .ok_or_else(|| OrchestratorError::UnknownBot(bot_id.to_string()))
    }

    /// A bot's current status.
    pub async fn status(&self, bot_id: &str) -> Result<BotStatus, OrchestratorError> {
        self.bots
            .read()
            .await
            .get(bot_id)
            .map(|entry| entry.status)
            .ok_or_else(|| OrchestratorError::UnknownBot(bot_id.to_string()))
    }

    /// Transition a bot's status.
    pub async fn set_status(&self, bot_id: &str, status: BotStatus) {
        if let Some(entry) = self.bots.write().await.get_mut(bot_id) {
            entry.status = status;
        }
    }

    /// Record a liveness probe time.
    pub async fn mark_health_check(&self, bot_id: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.bots.write().await.get_mut(bot_id) {
            entry.last_health_check = Some(at);
        }
    }

    /// Count one handled message.
    pub async fn record_message(&self, bot_id: &str) {
        if let Some(entry) = self.bots.write().await.get_mut(bot_id) {
            entry.message_count += 1;
        }
    }

    /// Count one channel error; returns the new error count.
    pub async fn record_error(&self, bot_id: &str) -> u32 {
        match self.bots.write().await.get_mut(bot_id) {
            Some(entry) => {
                entry.error_count += 1;
                entry.error_count
            }
            None => 0,
        }
    }

    /// Reset a bot's error count.
    pub async fn reset_errors(&self, bot_id: &str) {
        if let Some(entry) = self.bots.write().await.get_mut(bot_id) {
            entry.error_count = 0;
        }
    }

    /// Swap in a freshly created channel (recovery).
    pub async fn replace_channel(&self, bot_id: &str, channel: Arc<dyn MessagingChannel>) {
        if let Some(entry) = self.bots.write().await.get_mut(bot_id) {
            entry.channel = channel;
        }
    }

    /// Read-only snapshot of one bot.
    pub async fn snapshot(&self, bot_id: &str) -> Result<BotSnapshot, OrchestratorError> {
        self.bots
            .read()
            .await
            .get(bot_id)
            .map(|entry| BotSnapshot {
                bot_id: bot_id.to_string(),
                brain_id: entry.brain_id.clone(),
                status: entry.status,
                last_health_check: entry.last_health_check,
                message_count: entry.message_count,
                error_count: entry.error_count,
            })
            .ok_or_else(|| OrchestratorError::UnknownBot(bot_id.to_string()))
    }

    /// Retain a delayed call-to-action task so shutdown can cancel it.
    pub async fn retain_cta_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.cta_tasks.lock().await;
        // Opportunistically drop handles of tasks that already ran.
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Number of pending (not yet fired) call-to-action tasks.
    pub async fn pending_cta_tasks(&self) -> usize {
        self.cta_tasks
            .lock()
            .await
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Stop all channels and cancel pending scheduled tasks.
    pub async fn shutdown(&self) {
        for handle in self.cta_tasks.lock().await.drain(..) {
            handle.abort();
        }
        for entry in self.bots.read().await.values() {
            entry.channel.stop().await;
        }
    }
}
