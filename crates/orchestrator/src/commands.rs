//! Slash-command handling.
//!
//! A flat table of commands over shared session state. Commands never
//! reach the agent; everything here is answered locally.

use std::sync::Arc;

use brain_core::{BrainConfig, BrainStore};
use tracing::info;
use troupe_database::{session, Database};

use crate::channel::InboundMessage;
use crate::error::OrchestratorError;
use crate::registry::BotRegistry;

/// Reply for commands outside the table.
pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command. Send /help to see what I can do.";

/// Reply to `/restart` on bots not designated for it.
const RESTART_UNAVAILABLE: &str = "Restart is not available on this bot.";

/// Table-driven handler for `/`-prefixed messages.
pub struct CommandDispatcher {
    registry: Arc<BotRegistry>,
    brains: Arc<BrainStore>,
    db: Database,
    /// Bot identity allowed to serve `/restart`. `None` disables it
    /// everywhere.
    restart_bot_id: Option<String>,
}

impl CommandDispatcher {
    /// Wire up a dispatcher over the shared platform state.
    pub fn new(
        registry: Arc<BotRegistry>,
        brains: Arc<BrainStore>,
        db: Database,
        restart_bot_id: Option<String>,
    ) -> Self {
        Self {
            registry,
            brains,
            db,
            restart_bot_id,
        }
    }

    /// Handle one command message. The caller has already checked the
    /// `/` prefix.
    pub async fn handle(
        &self,
        bot_id: &str,
        message: &InboundMessage,
    ) -> Result<(), OrchestratorError> {
        let brain_id = self.registry.brain_id(bot_id).await?;
        let brain = self.brains.require(&brain_id)?.clone();
        let channel = self.registry.channel(bot_id).await?;
        let user_id = message.user_id.as_str();

        let command = message
            .text
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase();
        info!(bot = %bot_id, user = %user_id, command = %command, "handling command");

        match command.as_str() {
            "/start" | "/help" => {
                channel.send_text(user_id, &greeting(&brain)).await?;
            }
            "/reset" => {
                // Silent rotation: the next turn starts a fresh session.
                session::reset_conversation(self.db.pool(), bot_id, user_id).await?;
            }
            "/restart" => {
                if self.restart_bot_id.as_deref() == Some(bot_id) {
                    session::reset_conversation(self.db.pool(), bot_id, user_id).await?;
                    channel
                        .send_text(user_id, "Conversation restarted. Let's start over!")
                        .await?;
                } else {
                    channel.send_text(user_id, RESTART_UNAVAILABLE).await?;
                }
            }
            "/tts" => {
                let stored =
                    session::get_tts_preference(self.db.pool(), bot_id, user_id).await?;
                let effective = stored.unwrap_or(brain.tts.enabled);
                let toggled = !effective;
                session::set_tts_preference(self.db.pool(), bot_id, user_id, Some(toggled))
                    .await?;
                let reply = if toggled {
                    "Voice replies are now on."
                } else {
                    "Voice replies are now off."
                };
                channel.send_text(user_id, reply).await?;
            }
            "/stats" => {
                let reply = match session::get_session(self.db.pool(), bot_id, user_id).await? {
                    Some(record) => {
                        let last = record
                            .last_message_time()
                            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                            .unwrap_or_else(|| "never".to_string());
                        let conversation = if record.agent_session_uuid.is_some() {
                            "active"
                        } else {
                            "none"
                        };
                        format!(
                            "Messages: {}\nLast message: {}\nConversation: {}",
                            record.message_count, last, conversation
                        )
                    }
                    None => "No session yet. Say hi!".to_string(),
                };
                channel.send_text(user_id, &reply).await?;
            }
            _ => {
                channel.send_text(user_id, UNKNOWN_COMMAND_REPLY).await?;
            }
        }

        Ok(())
    }
}

fn greeting(brain: &BrainConfig) -> String {
    brain
        .greeting
        .clone()
        .unwrap_or_else(|| format!("Hi, I'm {}! Just send me a message to chat.", brain.name))
}
