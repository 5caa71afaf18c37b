//! Per-bot ingestion loop.
//!
//! Pulls updates off a bot's channel and routes them: `/`-prefixed
//! messages to the command dispatcher, everything else to the turn
//! orchestrator, channel errors into the registry's error bookkeeping.
//! The channel is re-fetched from the registry on every iteration so a
//! recovery swap takes effect without restarting the loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::channel::ChannelUpdate;
use crate::commands::CommandDispatcher;
use crate::registry::{BotRegistry, BotStatus};
use crate::turn::TurnOrchestrator;

/// Pause before re-polling after the channel reports exhaustion while
/// the bot is still live (e.g. mid-recovery).
const REPOLL_DELAY: Duration = Duration::from_millis(500);

/// Routes one bot's inbound updates to commands and turns.
pub struct IngestProcessor {
    registry: Arc<BotRegistry>,
    orchestrator: Arc<TurnOrchestrator>,
    commands: Arc<CommandDispatcher>,
}

impl IngestProcessor {
    /// Wire up an ingest processor over the shared platform state.
    pub fn new(
        registry: Arc<BotRegistry>,
        orchestrator: Arc<TurnOrchestrator>,
        commands: Arc<CommandDispatcher>,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            commands,
        }
    }

    /// Run the ingestion loop for one bot until it is deregistered or
    /// terminally failed.
    pub async fn run(&self, bot_id: &str) {
        info!(bot = %bot_id, "ingestion started");
        loop {
            let channel = match self.registry.channel(bot_id).await {
                Ok(channel) => channel,
                Err(_) => {
                    info!(bot = %bot_id, "bot deregistered, ingestion stopping");
                    return;
                }
            };

            match channel.next_update().await {
                Some(update) => self.handle_update(bot_id, update).await,
                None => {
                    // Channel exhausted: stop for failed bots, otherwise
                    // wait out a possible recovery swap and re-fetch.
                    match self.registry.status(bot_id).await {
                        Ok(BotStatus::Failed) | Err(_) => {
                            info!(bot = %bot_id, "channel closed, ingestion stopping");
                            return;
                        }
                        Ok(_) => tokio::time::sleep(REPOLL_DELAY).await,
                    }
                }
            }
        }
    }

    /// Route a single update.
    pub async fn handle_update(&self, bot_id: &str, update: ChannelUpdate) {
        match update {
            ChannelUpdate::Message(message) => {
                debug!(bot = %bot_id, user = %message.user_id, "inbound message");
                if message.text.starts_with('/') {
                    if let Err(err) = self.commands.handle(bot_id, &message).await {
                        error!(bot = %bot_id, user = %message.user_id, "command failed: {err}");
                    }
                } else {
                    self.orchestrator.handle_turn(bot_id, &message).await;
                }
            }
            ChannelUpdate::Error(detail) => {
                let errors = self.registry.record_error(bot_id).await;
                warn!(bot = %bot_id, errors, "channel reported error: {detail}");
            }
        }
    }
}
