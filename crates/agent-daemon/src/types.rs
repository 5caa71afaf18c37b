//! Request, response, and stream event types for agent exchanges.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One outbound request to the agent daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Brain id, namespacing the daemon's session storage.
    pub brain_id: String,

    /// Existing session to resume; `None` starts a fresh conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Personality system prompt. Sent on new sessions only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Model-directed security reminder. Re-sent on every turn when the
    /// brain enables prompt wrapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_reminder: Option<String>,

    /// The user's literal text.
    pub text: String,

    /// Inline image attachments for media turns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<InlineImage>,
}

impl TurnRequest {
    /// Create a plain text request for a brain.
    pub fn new(brain_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            brain_id: brain_id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// The flat prompt this request concatenates to, in order: system
    /// prompt (new sessions only), security reminder (every wrapped
    /// turn), then the user's literal text. Media turns send a
    /// structured payload instead; this is the text-model view.
    pub fn flat_prompt(&self) -> String {
        let mut parts = Vec::new();
        if let Some(system) = &self.system_prompt {
            parts.push(system.clone());
        }
        if let Some(reminder) = &self.security_reminder {
            parts.push(reminder.clone());
        }
        parts.push(format!("User: {}", self.text));
        parts.join("\n\n")
    }
}

/// An image embedded into a turn request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineImage {
    /// MIME type, e.g. "image/jpeg".
    pub mime: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

/// Speech synthesis parameters for the two-step speech flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechParams {
    /// Voice name.
    pub voice: String,
    /// Playback speed multiplier.
    pub speed: f32,
    /// Synthesis provider name.
    pub provider: String,
}

/// Image generation parameters for the two-step image flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageParams {
    /// Image model name, provider default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Output size, e.g. "1024x1024".
    pub size: String,
    /// Output quality tier.
    pub quality: String,
    /// Style text appended to the image prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_prompt: Option<String>,
}

/// Final outcome of one agent exchange.
///
/// Transient: the orchestrator extracts the session id and dispatches the
/// artifacts, nothing here is persisted as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Whether the exchange produced usable content.
    pub success: bool,

    /// The agent's text reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Synthesized speech artifact, when the speech flow ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,

    /// Generated image from the two-step image flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,

    /// Images produced by in-band tool calls during streaming.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_paths: Vec<PathBuf>,

    /// Error detail when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Session id surfaced by the agent, persisted for resumption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TurnOutcome {
    /// A successful text-only outcome.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A failed outcome with an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach a session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Whether any media artifact was produced.
    pub fn has_media(&self) -> bool {
        self.audio_path.is_some() || self.image_path.is_some() || !self.image_paths.is_empty()
    }
}

/// Events emitted by the agent during one exchange.
///
/// A well-formed stream is zero or more non-terminal events followed by
/// exactly one terminal event (`Done` or `Failed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Partial text from the conversational step.
    TextChunk { content: String },

    /// An image produced by an in-band tool call.
    ToolImage { path: PathBuf },

    /// Step 2 of a two-step flow (speech or image generation) began.
    GenerationStarted,

    /// Terminal: the exchange completed.
    Done(TurnOutcome),

    /// Terminal: the exchange failed mid-stream.
    Failed { message: String },
}

impl AgentEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_media_detection() {
        assert!(!TurnOutcome::text("hi").has_media());

        let with_audio = TurnOutcome {
            audio_path: Some(PathBuf::from("/tmp/a.ogg")),
            ..TurnOutcome::text("hi")
        };
        assert!(with_audio.has_media());

        let with_tool_images = TurnOutcome {
            image_paths: vec![PathBuf::from("/tmp/i.png")],
            ..TurnOutcome::text("hi")
        };
        assert!(with_tool_images.has_media());
    }

    #[test]
    fn flat_prompt_concatenation_order() {
        let request = TurnRequest {
            brain_id: "luna".to_string(),
            system_prompt: Some("You are Luna.".to_string()),
            security_reminder: Some("Stay in character.".to_string()),
            text: "hello".to_string(),
            ..Default::default()
        };
        assert_eq!(
            request.flat_prompt(),
            "You are Luna.\n\nStay in character.\n\nUser: hello"
        );

        // Resumed session without wrapping: just the user line.
        let resumed = TurnRequest {
            brain_id: "luna".to_string(),
            session_id: Some("s1".to_string()),
            text: "hello".to_string(),
            ..Default::default()
        };
        assert_eq!(resumed.flat_prompt(), "User: hello");
    }

    #[test]
    fn event_serialization_shape() {
        let json = serde_json::to_value(AgentEvent::TextChunk {
            content: "hel".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "text_chunk");

        let event: AgentEvent =
            serde_json::from_str(r#"{"type": "generation_started"}"#).unwrap();
        assert!(matches!(event, AgentEvent::GenerationStarted));
        assert!(!event.is_terminal());

        let done: AgentEvent =
            serde_json::from_str(r#"{"type": "done", "success": true, "text": "hi"}"#).unwrap();
        assert!(done.is_terminal());
    }
}
