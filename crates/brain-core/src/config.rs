//! Brain configuration model.
//!
//! One [`BrainConfig`] per bot, deserialized from a JSON file in the
//! brains directory. All feature sections default to "off" so a minimal
//! brain file only needs an id, a display name, and a system prompt.

use serde::{Deserialize, Serialize};

use crate::prompt::ContextStrategy;

/// Default daily per-user message limit.
pub const DEFAULT_DAILY_LIMIT: u32 = 50;

fn default_daily_limit() -> u32 {
    DEFAULT_DAILY_LIMIT
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_tts_provider() -> String {
    "openai".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_quality() -> String {
    "standard".to_string()
}

fn default_cta_interval() -> u32 {
    10
}

fn default_cta_delay_secs() -> u64 {
    30
}

/// Full personality configuration for one bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    /// Stable brain identifier (also the session namespace for this bot).
    pub id: String,

    /// Human-readable display name used in greetings.
    pub name: String,

    /// The personality system prompt sent on new agent sessions.
    pub system_prompt: String,

    /// Greeting text for `/start` and `/help`.
    #[serde(default)]
    pub greeting: Option<String>,

    /// Security wrapping policy.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Voice reply configuration.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Image generation configuration.
    #[serde(default)]
    pub image_gen: ImageGenConfig,

    /// Re-engagement nudge configuration.
    #[serde(default)]
    pub nudges: NudgeConfig,

    /// Call-to-action promotion configuration.
    #[serde(default)]
    pub cta: CtaConfig,

    /// Named prompt-framing strategy applied to the system prompt.
    #[serde(default)]
    pub context_strategy: ContextStrategy,

    /// Daily per-user message limit enforced by the rate gate.
    #[serde(default = "default_daily_limit")]
    pub daily_message_limit: u32,
}

impl BrainConfig {
    /// Validate required fields. Called once at load time.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("brain id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err(format!("brain '{}': name must not be empty", self.id));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(format!("brain '{}': system_prompt must not be empty", self.id));
        }
        if let Some(trigger) = self.nudges.triggers.iter().find(|t| t.delay_hours <= 0.0) {
            return Err(format!(
                "brain '{}': nudge trigger delay_hours must be positive, got {}",
                self.id, trigger.delay_hours
            ));
        }
        Ok(())
    }
}

/// Security wrapping policy for agent prompts.
///
/// When enabled, a model-directed reminder is prepended on *every* turn
/// (not only new sessions) so the agent keeps character over long
/// conversations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Whether outbound prompts are wrapped with the reminder.
    #[serde(default)]
    pub wrap_prompts: bool,

    /// Reminder text. `None` uses the built-in default reminder.
    #[serde(default)]
    pub reminder: Option<String>,
}

/// Voice reply configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Whether voice replies are the brain default. Users can override
    /// per-chat with `/tts`.
    #[serde(default)]
    pub enabled: bool,

    /// Voice name passed to the speech provider.
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Playback speed multiplier.
    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Speech synthesis provider name.
    #[serde(default = "default_tts_provider")]
    pub provider: String,

    /// Also send the reply text alongside the voice message.
    #[serde(default)]
    pub send_text_too: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            voice: default_voice(),
            speed: default_speed(),
            provider: default_tts_provider(),
            send_text_too: false,
        }
    }
}

/// Image generation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageGenConfig {
    /// Whether image-intent messages trigger the two-step image flow.
    #[serde(default)]
    pub enabled: bool,

    /// Named style profile. Takes precedence over [`Self::style`] when it
    /// resolves; a missing profile falls back to the inline values.
    #[serde(default)]
    pub style_profile: Option<String>,

    /// Inline style parameters used when no profile is set or resolvable.
    #[serde(default)]
    pub style: StyleParams,

    /// Also send the reply text alongside generated images.
    #[serde(default)]
    pub send_text_too: bool,
}

/// Image style parameters handed to the agent's image capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleParams {
    /// Image model name.
    #[serde(default)]
    pub model: Option<String>,

    /// Output size, e.g. "1024x1024".
    #[serde(default = "default_image_size")]
    pub size: String,

    /// Output quality tier.
    #[serde(default = "default_image_quality")]
    pub quality: String,

    /// Style text appended to the image prompt.
    #[serde(default)]
    pub style_prompt: Option<String>,
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            model: None,
            size: default_image_size(),
            quality: default_image_quality(),
            style_prompt: None,
        }
    }
}

/// Re-engagement nudge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NudgeConfig {
    /// Whether the engagement scheduler considers this brain at all.
    #[serde(default)]
    pub enabled: bool,

    /// Inactivity triggers, evaluated monotonically per user.
    #[serde(default)]
    pub triggers: Vec<NudgeTrigger>,
}

/// One declarative inactivity trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeTrigger {
    /// Hours of user silence before this trigger becomes eligible.
    pub delay_hours: f64,

    /// Condition gating the trigger once the delay has passed.
    #[serde(default)]
    pub condition: NudgeCondition,

    /// Prompt template handed to the agent to generate the follow-up.
    pub prompt: String,

    /// Stop nudging this user after this trigger fires.
    #[serde(default)]
    pub stop_after: bool,
}

/// Nudge trigger conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeCondition {
    /// The user has not written since the bot's last turn.
    #[default]
    NoReplySinceLastTurn,
}

/// Call-to-action promotion configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtaConfig {
    /// Whether qualifying replies schedule a delayed promotional message.
    #[serde(default)]
    pub enabled: bool,

    /// Also send after the user's very first message.
    #[serde(default)]
    pub send_on_first: bool,

    /// Send after every N-th message (message_count % N == 0).
    #[serde(default = "default_cta_interval")]
    pub every_n: u32,

    /// Delay between the reply and the promotional message.
    #[serde(default = "default_cta_delay_secs")]
    pub delay_secs: u64,

    /// Promotional text (sent with link preview when `photo_url` is unset).
    #[serde(default)]
    pub text: String,

    /// Optional photo; when set the text becomes its caption.
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_brain_parses_with_defaults() {
        let brain: BrainConfig = serde_json::from_str(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "You are Luna."}"#,
        )
        .unwrap();

        assert!(brain.validate().is_ok());
        assert!(!brain.tts.enabled);
        assert!(!brain.image_gen.enabled);
        assert!(!brain.nudges.enabled);
        assert!(!brain.cta.enabled);
        assert!(!brain.security.wrap_prompts);
        assert_eq!(brain.daily_message_limit, DEFAULT_DAILY_LIMIT);
        assert_eq!(brain.tts.voice, "alloy");
        assert_eq!(brain.image_gen.style.size, "1024x1024");
    }

    #[test]
    fn validate_rejects_empty_prompt() {
        let brain: BrainConfig = serde_json::from_str(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "  "}"#,
        )
        .unwrap();
        assert!(brain.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_trigger_delay() {
        let brain: BrainConfig = serde_json::from_str(
            r#"{
                "id": "luna",
                "name": "Luna",
                "system_prompt": "You are Luna.",
                "nudges": {"enabled": true, "triggers": [
                    {"delay_hours": 0, "prompt": "check in"}
                ]}
            }"#,
        )
        .unwrap();
        assert!(brain.validate().is_err());
    }

    #[test]
    fn nudge_trigger_parses() {
        let brain: BrainConfig = serde_json::from_str(
            r#"{
                "id": "luna",
                "name": "Luna",
                "system_prompt": "You are Luna.",
                "nudges": {"enabled": true, "triggers": [
                    {"delay_hours": 24, "prompt": "miss them"},
                    {"delay_hours": 72, "prompt": "last call", "stop_after": true}
                ]}
            }"#,
        )
        .unwrap();

        assert_eq!(brain.nudges.triggers.len(), 2);
        assert_eq!(brain.nudges.triggers[0].delay_hours, 24.0);
        assert_eq!(
            brain.nudges.triggers[0].condition,
            NudgeCondition::NoReplySinceLastTurn
        );
        assert!(brain.nudges.triggers[1].stop_after);
    }
}
