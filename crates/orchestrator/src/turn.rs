//! One user-initiated conversation turn, end to end.
//!
//! The orchestrator owns the full pipeline: rate gate, session lookup,
//! media fetch, prompt framing, agent exchange (streamed into a
//! placeholder message), persistence bookkeeping, and final dispatch.
//! Any error inside the pipeline is caught at the top and turned into a
//! fixed apology so the user never sees internals.

use std::sync::Arc;
use std::time::Duration;

use agent_daemon::{
    Agent, AgentEvent, ImageParams, InlineImage, SpeechParams, TurnOutcome, TurnRequest,
    TurnStream,
};
use brain_core::{self, BrainConfig, BrainStore};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use troupe_database::{nudge, session, Database};

use crate::channel::{InboundMessage, MessageId, MessagingChannel};
use crate::classifier::{classify, TurnMode};
use crate::dispatch::{dispatch, schedule_cta};
use crate::error::OrchestratorError;
use crate::ratelimit::{limit_notice, RateLimiter};
use crate::registry::BotRegistry;

/// Fixed user-facing apology for any internal turn failure.
pub const APOLOGY_TEXT: &str =
    "Sorry, something went wrong on my side. Please try again in a moment.";

/// Placeholder sent while the agent is thinking.
const PLACEHOLDER_TEXT: &str = "…";

/// Minimum interval between streaming edits of the placeholder.
const EDIT_THROTTLE: Duration = Duration::from_secs(1);

/// Drives one user message through classification, the agent exchange,
/// persistence, and dispatch.
pub struct TurnOrchestrator {
    registry: Arc<BotRegistry>,
    brains: Arc<BrainStore>,
    agent: Arc<dyn Agent>,
    db: Database,
    rate: RateLimiter,
}

impl TurnOrchestrator {
    /// Wire up an orchestrator over the shared platform state.
    pub fn new(
        registry: Arc<BotRegistry>,
        brains: Arc<BrainStore>,
        agent: Arc<dyn Agent>,
        db: Database,
    ) -> Self {
        let rate = RateLimiter::new(db.clone());
        Self {
            registry,
            brains,
            agent,
            db,
            rate,
        }
    }

    /// Handle one inbound message for a bot.
    ///
    /// Never propagates pipeline errors to the caller: failures are
    /// logged and answered with [`APOLOGY_TEXT`] best-effort.
    pub async fn handle_turn(&self, bot_id: &str, message: &InboundMessage) {
        match self.run_turn(bot_id, message).await {
            Ok(handled) => {
                if handled {
                    self.registry.record_message(bot_id).await;
                }
            }
            Err(err) => {
                error!(bot = %bot_id, user = %message.user_id, "turn failed: {err}");
                if let Ok(channel) = self.registry.channel(bot_id).await {
                    if let Err(send_err) =
                        channel.send_text(&message.user_id, APOLOGY_TEXT).await
                    {
                        warn!(bot = %bot_id, user = %message.user_id,
                              "apology delivery failed: {send_err}");
                    }
                }
            }
        }
    }

    /// The fallible turn pipeline. Returns whether a reply was produced
    /// (silently skipped turns return `Ok(false)`).
    async fn run_turn(
        &self,
        bot_id: &str,
        message: &InboundMessage,
    ) -> Result<bool, OrchestratorError> {
        // Nothing to react to.
        if message.text.trim().is_empty() && message.media.is_none() {
            debug!(bot = %bot_id, user = %message.user_id, "empty message, skipping");
            return Ok(false);
        }

        let brain_id = self.registry.brain_id(bot_id).await?;
        let brain = self.brains.require(&brain_id)?.clone();
        let channel = self.registry.channel(bot_id).await?;
        let user_id = message.user_id.as_str();

        let decision = self.rate.check_limit(bot_id, user_id, &brain).await?;
        if !decision.allowed {
            info!(bot = %bot_id, user = %user_id, "daily limit reached");
            channel.send_text(user_id, &limit_notice(&decision)).await?;
            return Ok(false);
        }

        let record = session::ensure_session(self.db.pool(), bot_id, user_id).await?;
        let session_id = record.agent_session_uuid.clone();
        let tts_pref =
            session::get_tts_preference(self.db.pool(), bot_id, user_id).await?;

        // Inbound media is best-effort: a failed download degrades the
        // turn to text-only instead of failing it.
        let mut attachments = Vec::new();
        if let Some(media) = &message.media {
            match channel.fetch_media(media).await {
                Ok(fetched) => attachments.push(InlineImage {
                    mime: fetched.mime,
                    data: fetched.data,
                }),
                Err(err) => {
                    warn!(bot = %bot_id, user = %user_id, "media fetch failed: {err}");
                }
            }
        }

        let request = TurnRequest {
            brain_id: brain.id.clone(),
            session_id: session_id.clone(),
            // The personality prompt goes out on new sessions only; the
            // daemon already holds it for resumed ones.
            system_prompt: if session_id.is_none() {
                Some(brain_core::build_system_prompt(
                    &brain,
                    message.user_name.as_deref(),
                ))
            } else {
                None
            },
            security_reminder: brain_core::security_reminder(&brain),
            text: message.text.clone(),
            attachments,
        };

        let mode = classify(&message.text, message.media.is_some(), &brain, tts_pref);
        debug!(bot = %bot_id, user = %user_id, ?mode, "classified turn");

        let status = match channel.send_text(user_id, PLACEHOLDER_TEXT).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(bot = %bot_id, user = %user_id, "placeholder send failed: {err}");
                None
            }
        };

        let stream = match mode {
            TurnMode::Image => {
                let style = self.brains.resolve_style(&brain);
                self.agent
                    .converse_with_image(
                        request,
                        ImageParams {
                            model: style.model,
                            size: style.size,
                            quality: style.quality,
                            style_prompt: style.style_prompt,
                        },
                    )
                    .await?
            }
            TurnMode::Tts => {
                self.agent
                    .converse_with_speech(
                        request,
                        SpeechParams {
                            voice: brain.tts.voice.clone(),
                            speed: brain.tts.speed,
                            provider: brain.tts.provider.clone(),
                        },
                    )
                    .await?
            }
            TurnMode::Text => self.agent.converse(request).await?,
        };

        let outcome = self
            .consume_stream(&channel, user_id, status.as_ref(), stream, mode)
            .await?;

        // The placeholder is replaced by the real dispatch below.
        if let Some(status) = &status {
            if let Err(err) = channel.delete_message(user_id, status).await {
                debug!(bot = %bot_id, user = %user_id, "placeholder delete failed: {err}");
            }
        }

        if !outcome.success {
            warn!(
                bot = %bot_id, user = %user_id,
                "agent reported failure: {}",
                outcome.error.as_deref().unwrap_or("unknown")
            );
            // Best-effort: propagating a failed apology send would make
            // handle_turn attempt a second apology to the same user.
            if let Err(err) = channel.send_text(user_id, APOLOGY_TEXT).await {
                warn!(bot = %bot_id, user = %user_id, "apology delivery failed: {err}");
            }
            return Ok(false);
        }

        if let Some(new_session) = &outcome.session_id {
            session::set_current_uuid(self.db.pool(), bot_id, user_id, new_session).await?;
        }
        session::increment_message_count(self.db.pool(), bot_id, user_id).await?;
        session::update_last_message_time(self.db.pool(), bot_id, user_id, Utc::now()).await?;
        self.rate.increment(bot_id, user_id).await?;
        // The user wrote back; any open nudge is answered.
        nudge::mark_latest_responded(self.db.pool(), bot_id, user_id).await?;

        dispatch(&channel, user_id, &outcome, &brain, Some(&message.text)).await;

        let count = session::get_session(self.db.pool(), bot_id, user_id)
            .await?
            .map(|s| s.message_count)
            .unwrap_or(0);
        schedule_cta(&self.registry, channel, user_id, &brain, count).await;

        Ok(true)
    }

    /// Drain the agent's event stream, mirroring text progress into the
    /// placeholder message with throttled edits.
    async fn consume_stream(
        &self,
        channel: &Arc<dyn MessagingChannel>,
        user_id: &str,
        status: Option<&MessageId>,
        mut stream: TurnStream,
        mode: TurnMode,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let mut buffered = String::new();
        let mut tool_images = Vec::new();
        let mut last_edit = Instant::now();

        while let Some(event) = stream.next_event().await {
            match event {
                AgentEvent::TextChunk { content } => {
                    buffered.push_str(&content);
                    if let Some(status) = status {
                        if last_edit.elapsed() >= EDIT_THROTTLE && !buffered.trim().is_empty() {
                            last_edit = Instant::now();
                            if let Err(err) =
                                channel.edit_text(user_id, status, &buffered).await
                            {
                                debug!(user = %user_id, "streaming edit failed: {err}");
                            }
                        }
                    }
                }
                AgentEvent::ToolImage { path } => {
                    tool_images.push(path);
                }
                AgentEvent::GenerationStarted => {
                    if let Some(status) = status {
                        let label = match mode {
                            TurnMode::Image => "creating your image…",
                            TurnMode::Tts => "recording a voice message…",
                            TurnMode::Text => PLACEHOLDER_TEXT,
                        };
                        if let Err(err) = channel.edit_text(user_id, status, label).await {
                            debug!(user = %user_id, "status edit failed: {err}");
                        }
                    }
                }
                AgentEvent::Done(mut outcome) => {
                    // In-band tool images ride along with the outcome.
                    outcome.image_paths.extend(tool_images);
                    return Ok(outcome);
                }
                AgentEvent::Failed { message } => {
                    return Ok(TurnOutcome::failure(message));
                }
            }
        }

        Err(agent_daemon::AgentError::StreamClosed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelCredentials, RecordingChannel, SentOp};
    use mock_agent::{CallShape, ScriptedAgent};
    use std::path::PathBuf;

    const BOT: &str = "luna-bot";
    const USER: &str = "u1";

    struct Harness {
        orchestrator: TurnOrchestrator,
        channel: Arc<RecordingChannel>,
        agent: Arc<ScriptedAgent>,
        db: Database,
    }

    async fn harness(brain_json: &str) -> Harness {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let mut brains = BrainStore::new();
        let brain: BrainConfig = serde_json::from_str(brain_json).unwrap();
        let brain_id = brain.id.clone();
        brains.insert(brain);

        let registry = Arc::new(BotRegistry::new());
        let channel = Arc::new(RecordingChannel::new());
        registry
            .register(
                BOT,
                brain_id,
                ChannelCredentials {
                    identity: "luna_bot".to_string(),
                    token: "token-1".to_string(),
                },
                channel.clone(),
            )
            .await
            .unwrap();

        let agent = Arc::new(ScriptedAgent::new());
        let orchestrator = TurnOrchestrator::new(
            registry,
            Arc::new(brains),
            agent.clone(),
            db.clone(),
        );
        Harness {
            orchestrator,
            channel,
            agent,
            db,
        }
    }

    fn minimal_brain() -> &'static str {
        r#"{"id": "luna", "name": "Luna", "system_prompt": "You are Luna."}"#
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            user_id: USER.to_string(),
            user_name: Some("Bob".to_string()),
            text: text.to_string(),
            media: None,
        }
    }

    #[tokio::test]
    async fn empty_message_produces_nothing() {
        let h = harness(minimal_brain()).await;
        h.orchestrator.handle_turn(BOT, &inbound("   ")).await;

        assert_eq!(h.agent.call_count().await, 0);
        assert!(h.channel.ops().await.is_empty());
    }

    #[tokio::test]
    async fn text_turn_sends_reply_and_persists_session() {
        let h = harness(minimal_brain()).await;
        h.agent
            .push_outcome(TurnOutcome::text("Hello Bob!").with_session("sess-1"))
            .await;

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;

        assert_eq!(h.channel.texts().await, vec![
            PLACEHOLDER_TEXT.to_string(),
            "Hello Bob!".to_string(),
        ]);

        let record = session::get_session(h.db.pool(), BOT, USER)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.agent_session_uuid.as_deref(), Some("sess-1"));
        assert_eq!(record.message_count, 1);
        assert!(record.last_message_time().is_some());
    }

    #[tokio::test]
    async fn first_turn_carries_system_prompt_resumed_does_not() {
        let h = harness(minimal_brain()).await;
        h.agent
            .push_outcome(TurnOutcome::text("hi").with_session("sess-1"))
            .await;
        h.agent.push_outcome(TurnOutcome::text("again")).await;

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;
        h.orchestrator.handle_turn(BOT, &inbound("more")).await;

        let calls = h.agent.calls().await;
        assert_eq!(calls.len(), 2);

        let first = &calls[0].request;
        assert_eq!(first.session_id, None);
        assert_eq!(first.system_prompt.as_deref(), Some("You are Luna."));
        assert_eq!(first.flat_prompt(), "You are Luna.\n\nUser: hello");

        let second = &calls[1].request;
        assert_eq!(second.session_id.as_deref(), Some("sess-1"));
        assert_eq!(second.system_prompt, None);
        assert_eq!(second.flat_prompt(), "User: more");
    }

    #[tokio::test]
    async fn security_reminder_rides_every_wrapped_turn() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "You are Luna.",
                "security": {"wrap_prompts": true, "reminder": "Stay Luna."}}"#,
        )
        .await;
        h.agent.push_outcome(TurnOutcome::text("a").with_session("s1")).await;
        h.agent.push_outcome(TurnOutcome::text("b")).await;

        h.orchestrator.handle_turn(BOT, &inbound("one")).await;
        h.orchestrator.handle_turn(BOT, &inbound("two")).await;

        let calls = h.agent.calls().await;
        assert_eq!(calls[0].request.security_reminder.as_deref(), Some("Stay Luna."));
        assert_eq!(calls[1].request.security_reminder.as_deref(), Some("Stay Luna."));
        assert_eq!(calls[1].request.flat_prompt(), "Stay Luna.\n\nUser: two");
    }

    #[tokio::test]
    async fn rate_denial_sends_one_notice_and_skips_agent() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
                "daily_message_limit": 0}"#,
        )
        .await;

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;

        assert_eq!(h.agent.call_count().await, 0);
        assert_eq!(h.channel.texts().await, vec![
            "Daily limit reached (0/0). Your messages reset at midnight UTC.".to_string(),
        ]);
    }

    #[tokio::test]
    async fn tts_brain_routes_to_speech_with_brain_params() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
                "tts": {"enabled": true, "voice": "nova", "speed": 1.2}}"#,
        )
        .await;
        h.agent
            .push_outcome(TurnOutcome {
                audio_path: Some(PathBuf::from("/tmp/v.ogg")),
                ..TurnOutcome::text("spoken")
            })
            .await;

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;

        let calls = h.agent.calls().await;
        match &calls[0].shape {
            CallShape::Speech(params) => {
                assert_eq!(params.voice, "nova");
                assert_eq!(params.speed, 1.2);
            }
            other => panic!("expected speech call, got {other:?}"),
        }
        let voices = h
            .channel
            .ops()
            .await
            .iter()
            .filter(|op| matches!(op, SentOp::Voice { .. }))
            .count();
        assert_eq!(voices, 1);
    }

    #[tokio::test]
    async fn stored_preference_overrides_tts_brain() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
                "tts": {"enabled": true}}"#,
        )
        .await;
        session::set_tts_preference(h.db.pool(), BOT, USER, Some(false))
            .await
            .unwrap();
        h.agent.push_outcome(TurnOutcome::text("typed reply")).await;

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;

        assert!(matches!(h.agent.calls().await[0].shape, CallShape::Plain));
    }

    #[tokio::test]
    async fn image_keyword_routes_to_image_flow() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
                "image_gen": {"enabled": true, "style": {"size": "512x512"}}}"#,
        )
        .await;
        h.agent
            .push_outcome(TurnOutcome {
                image_path: Some(PathBuf::from("/tmp/castle.png")),
                ..TurnOutcome::text("here you go")
            })
            .await;

        h.orchestrator
            .handle_turn(BOT, &inbound("draw me a castle"))
            .await;

        match &h.agent.calls().await[0].shape {
            CallShape::Image(params) => assert_eq!(params.size, "512x512"),
            other => panic!("expected image call, got {other:?}"),
        }
    }

    async fn edits(channel: &RecordingChannel) -> Vec<String> {
        channel
            .ops()
            .await
            .iter()
            .filter_map(|op| match op {
                SentOp::Edit { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    // Runs in real time: a paused clock auto-advances past the sqlx pool's
    // acquire timeout, so every database call in the turn fails.
    #[tokio::test]
    async fn streaming_edits_are_throttled_to_one_per_second() {
        let h = harness(minimal_brain()).await;
        let mut events: Vec<AgentEvent> = (0..8)
            .map(|i| AgentEvent::TextChunk {
                content: format!("part{i} "),
            })
            .collect();
        events.push(AgentEvent::Done(TurnOutcome::text("full reply")));
        // Eight chunks over two seconds of stream time.
        h.agent
            .push_paced_events(events, Duration::from_millis(250))
            .await;

        h.orchestrator.handle_turn(BOT, &inbound("tell me a story")).await;

        // One placeholder edit per elapsed second, not one per chunk.
        let edits = edits(&h.channel).await;
        assert_eq!(edits.len(), 2);
        assert!(edits[0].ends_with("part3 "), "unexpected first edit: {:?}", edits[0]);
        assert_eq!(
            h.channel.texts().await.last().map(String::as_str),
            Some("full reply")
        );
    }

    #[tokio::test]
    async fn generation_start_relabels_the_placeholder() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
                "image_gen": {"enabled": true}}"#,
        )
        .await;
        h.agent
            .push_events(vec![
                AgentEvent::GenerationStarted,
                AgentEvent::Done(TurnOutcome {
                    image_path: Some(PathBuf::from("/tmp/fox.png")),
                    ..TurnOutcome::text("")
                }),
            ])
            .await;

        h.orchestrator.handle_turn(BOT, &inbound("draw a fox")).await;

        assert_eq!(edits(&h.channel).await, vec!["creating your image…".to_string()]);
    }

    #[tokio::test]
    async fn agent_failure_becomes_apology() {
        let h = harness(minimal_brain()).await;
        h.agent.push_outcome(TurnOutcome::failure("model overloaded")).await;

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;

        let texts = h.channel.texts().await;
        assert_eq!(texts.last().map(String::as_str), Some(APOLOGY_TEXT));

        // Failed turns leave no session bookkeeping behind.
        let record = session::get_session(h.db.pool(), BOT, USER)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.message_count, 0);
    }

    #[tokio::test]
    async fn failed_apology_send_is_not_retried() {
        let h = harness(minimal_brain()).await;
        h.agent.push_outcome(TurnOutcome::failure("model overloaded")).await;
        h.channel.set_fail_text(true);

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;

        // Placeholder plus a single apology attempt; the failed apology
        // must not route back through the top-level apology path.
        assert_eq!(h.channel.text_attempts(), 2);
    }

    #[tokio::test]
    async fn failed_media_fetch_degrades_to_text_turn() {
        let h = harness(minimal_brain()).await;
        h.channel.set_fail_media(true);
        h.agent.push_outcome(TurnOutcome::text("nice photo!")).await;

        let message = InboundMessage {
            media: Some(crate::channel::MediaRef("file-1".to_string())),
            ..inbound("look at this")
        };
        h.orchestrator.handle_turn(BOT, &message).await;

        assert_eq!(h.agent.call_count().await, 1);
        assert!(h.agent.calls().await[0].request.attachments.is_empty());
        assert_eq!(
            h.channel.texts().await.last().map(String::as_str),
            Some("nice photo!")
        );
    }

    #[tokio::test]
    async fn tool_images_ride_along_with_the_outcome() {
        let h = harness(minimal_brain()).await;
        h.agent
            .push_events(vec![
                AgentEvent::TextChunk {
                    content: "look: ".to_string(),
                },
                AgentEvent::ToolImage {
                    path: PathBuf::from("/tmp/t1.png"),
                },
                AgentEvent::Done(TurnOutcome::text("look: done")),
            ])
            .await;

        h.orchestrator.handle_turn(BOT, &inbound("show me")).await;

        let photos = h
            .channel
            .ops()
            .await
            .iter()
            .filter(|op| matches!(op, SentOp::Photo { .. }))
            .count();
        assert_eq!(photos, 1);
    }

    #[tokio::test]
    async fn user_reply_marks_open_nudge_responded() {
        let h = harness(minimal_brain()).await;
        nudge::record_nudge(h.db.pool(), BOT, USER, Utc::now(), 24.0, "miss you")
            .await
            .unwrap();
        h.agent.push_outcome(TurnOutcome::text("welcome back")).await;

        h.orchestrator.handle_turn(BOT, &inbound("I'm back")).await;

        let history = nudge::history(h.db.pool(), BOT, USER).await.unwrap();
        assert!(history[0].responded);
    }

    #[tokio::test]
    async fn first_message_schedules_cta_when_configured() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
                "cta": {"enabled": true, "send_on_first": true, "delay_secs": 0,
                        "text": "join the channel"}}"#,
        )
        .await;
        h.agent.push_outcome(TurnOutcome::text("hi")).await;

        h.orchestrator.handle_turn(BOT, &inbound("hello")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h
            .channel
            .texts()
            .await
            .contains(&"join the channel".to_string()));
    }
}
