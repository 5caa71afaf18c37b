//! Background re-engagement nudges.
//!
//! Runs on its own timer, independent of message traffic. For every bot
//! with nudges enabled and every user with a session row, elapsed
//! silence is mapped onto the brain's trigger ladder; trigger selection
//! is monotonic per user, so an equal-or-earlier tier never fires twice.

use std::sync::Arc;
use std::time::Duration;

use agent_daemon::{Agent, SpeechParams, TurnRequest};
use brain_core::{self, BrainConfig, BrainStore, NudgeTrigger};
use chrono::Utc;
use tracing::{debug, info, warn};
use troupe_database::{nudge, session, Database};

use crate::dispatch::dispatch;
use crate::error::OrchestratorError;
use crate::registry::BotRegistry;

/// Default scheduler tick interval.
pub const DEFAULT_NUDGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Pick the trigger that fires for a user, if any.
///
/// Eligible triggers have their delay reached and sit strictly above the
/// last-sent tier; among those the smallest delay wins. Pure.
pub fn select_trigger<'a>(
    triggers: &'a [NudgeTrigger],
    hours_since_last_message: f64,
    last_sent_delay: Option<f64>,
) -> Option<&'a NudgeTrigger> {
    triggers
        .iter()
        .filter(|t| hours_since_last_message >= t.delay_hours)
        .filter(|t| last_sent_delay.map_or(true, |last| t.delay_hours > last))
        .min_by(|a, b| a.delay_hours.total_cmp(&b.delay_hours))
}

/// Periodic re-engagement scheduler.
pub struct EngagementScheduler {
    registry: Arc<BotRegistry>,
    brains: Arc<BrainStore>,
    agent: Arc<dyn Agent>,
    db: Database,
    interval: Duration,
}

impl EngagementScheduler {
    /// Wire up a scheduler over the shared platform state.
    pub fn new(
        registry: Arc<BotRegistry>,
        brains: Arc<BrainStore>,
        agent: Arc<dyn Agent>,
        db: Database,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            brains,
            agent,
            db,
            interval,
        }
    }

    /// Run the scheduler until the task is aborted.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// One pass over all bots and users. Per-user failures are logged
    /// and never stop the cycle.
    pub async fn run_cycle(&self) {
        for bot_id in self.registry.bot_ids().await {
            let brain = match self.brain_for(&bot_id).await {
                Some(brain) if brain.nudges.enabled => brain,
                _ => continue,
            };

            let users = match session::all_users_for_bot(self.db.pool(), &bot_id).await {
                Ok(users) => users,
                Err(err) => {
                    warn!(bot = %bot_id, "listing users for nudges failed: {err}");
                    continue;
                }
            };

            for user_id in users {
                if let Err(err) = self.try_nudge(&bot_id, &user_id, &brain).await {
                    warn!(bot = %bot_id, user = %user_id, "nudge failed: {err}");
                }
            }
        }
    }

    async fn brain_for(&self, bot_id: &str) -> Option<BrainConfig> {
        let brain_id = self.registry.brain_id(bot_id).await.ok()?;
        self.brains.get(&brain_id).cloned()
    }

    /// Consider one (bot, user) pair for a nudge this cycle.
    async fn try_nudge(
        &self,
        bot_id: &str,
        user_id: &str,
        brain: &BrainConfig,
    ) -> Result<(), OrchestratorError> {
        let Some(record) = session::get_session(self.db.pool(), bot_id, user_id).await? else {
            return Ok(());
        };
        let Some(last_message) = record.last_message_time() else {
            // Never heard from this user; nothing to re-engage.
            return Ok(());
        };

        let hours_since = (Utc::now() - last_message).num_seconds() as f64 / 3600.0;
        let last_delay = nudge::last_nudge_delay(self.db.pool(), bot_id, user_id).await?;

        // A fired stop-after tier ends the ladder for this user.
        if let Some(last) = last_delay {
            let stopped = brain
                .nudges
                .triggers
                .iter()
                .any(|t| t.delay_hours == last && t.stop_after);
            if stopped {
                return Ok(());
            }
        }

        let Some(trigger) = select_trigger(&brain.nudges.triggers, hours_since, last_delay)
        else {
            return Ok(());
        };
        info!(
            bot = %bot_id, user = %user_id,
            tier = trigger.delay_hours, hours = hours_since,
            "nudge trigger fired"
        );

        let session_id = record.agent_session_uuid.clone();
        let request = TurnRequest {
            brain_id: brain.id.clone(),
            session_id: session_id.clone(),
            system_prompt: if session_id.is_none() {
                Some(brain_core::build_system_prompt(brain, None))
            } else {
                None
            },
            security_reminder: brain_core::security_reminder(brain),
            text: trigger.prompt.clone(),
            attachments: Vec::new(),
        };

        // Brain default only here; the per-user /tts override is a
        // regular-turn concern.
        let stream = if brain.tts.enabled {
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
        } else {
            self.agent.converse(request).await?
        };

        let outcome = stream.into_outcome().await?;
        if !outcome.success {
            // Generation failed: abort without side effects, the trigger
            // stays eligible for the next cycle.
            debug!(
                bot = %bot_id, user = %user_id,
                "nudge generation failed: {}",
                outcome.error.as_deref().unwrap_or("unknown")
            );
            return Ok(());
        }

        let channel = self.registry.channel(bot_id).await?;
        dispatch(&channel, user_id, &outcome, brain, None).await;

        if let Some(new_session) = &outcome.session_id {
            session::set_current_uuid(self.db.pool(), bot_id, user_id, new_session).await?;
        }

        // Leave a note in the session so the agent remembers the nudge
        // on the user's next reply.
        let effective_session = outcome.session_id.or(session_id);
        if let Some(session_id) = &effective_session {
            if let Err(err) = self
                .agent
                .record_note(
                    &brain.id,
                    session_id,
                    "A re-engagement message was just sent to the user after a period of silence.",
                )
                .await
            {
                warn!(bot = %bot_id, user = %user_id, "recording nudge note failed: {err}");
            }
        }

        let message = outcome.text.as_deref().unwrap_or_default();
        nudge::record_nudge(
            self.db.pool(),
            bot_id,
            user_id,
            Utc::now(),
            trigger.delay_hours,
            message,
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelCredentials, RecordingChannel};
    use agent_daemon::TurnOutcome;
    use chrono::Duration as ChronoDuration;
    use mock_agent::{CallShape, ScriptedAgent};

    const BOT: &str = "luna-bot";
    const USER: &str = "u1";

    fn triggers(json: &str) -> Vec<NudgeTrigger> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn selection_is_monotonic_with_earliest_tier_tie_break() {
        let ladder = triggers(
            r#"[{"delay_hours": 24, "prompt": "a"},
                {"delay_hours": 72, "prompt": "b"}]"#,
        );

        // Nothing reached yet.
        assert!(select_trigger(&ladder, 3.0, None).is_none());

        // Both reached, none sent: earliest tier wins.
        assert_eq!(select_trigger(&ladder, 80.0, None).unwrap().delay_hours, 24.0);

        // 24h tier already sent: the 72h tier fires.
        assert_eq!(
            select_trigger(&ladder, 80.0, Some(24.0)).unwrap().delay_hours,
            72.0
        );

        // Top tier already sent: nothing left.
        assert!(select_trigger(&ladder, 500.0, Some(72.0)).is_none());
    }

    #[test]
    fn selection_never_fires_an_equal_or_earlier_tier() {
        let ladder = triggers(r#"[{"delay_hours": 24, "prompt": "a"}]"#);
        assert!(select_trigger(&ladder, 30.0, Some(24.0)).is_none());
    }

    struct Harness {
        scheduler: EngagementScheduler,
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
        let scheduler = EngagementScheduler::new(
            registry,
            Arc::new(brains),
            agent.clone(),
            db.clone(),
            Duration::from_secs(60),
        );
        Harness {
            scheduler,
            channel,
            agent,
            db,
        }
    }

    fn nudging_brain() -> &'static str {
        r#"{"id": "luna", "name": "Luna", "system_prompt": "You are Luna.",
            "nudges": {"enabled": true, "triggers": [
                {"delay_hours": 24, "prompt": "Reach out warmly."},
                {"delay_hours": 72, "prompt": "One last check-in.", "stop_after": true}
            ]}}"#
    }

    async fn seed_session(db: &Database, silent_hours: i64, uuid: Option<&str>) {
        session::ensure_session(db.pool(), BOT, USER).await.unwrap();
        if let Some(uuid) = uuid {
            session::set_current_uuid(db.pool(), BOT, USER, uuid).await.unwrap();
        }
        let last = Utc::now() - ChronoDuration::hours(silent_hours);
        session::update_last_message_time(db.pool(), BOT, USER, last)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fires_earliest_due_tier_and_records_it() {
        let h = harness(nudging_brain()).await;
        seed_session(&h.db, 30, Some("sess-1")).await;
        h.agent.push_outcome(TurnOutcome::text("hey, miss you!")).await;

        h.scheduler.run_cycle().await;

        assert_eq!(h.channel.texts().await, vec!["hey, miss you!".to_string()]);

        // The agent saw the trigger prompt in the resumed session.
        let calls = h.agent.calls().await;
        assert_eq!(calls[0].request.text, "Reach out warmly.");
        assert_eq!(calls[0].request.session_id.as_deref(), Some("sess-1"));

        // History records the fired tier, unanswered.
        assert_eq!(
            nudge::last_nudge_delay(h.db.pool(), BOT, USER).await.unwrap(),
            Some(24.0)
        );
        let history = nudge::history(h.db.pool(), BOT, USER).await.unwrap();
        assert!(!history[0].responded);

        // And a session note was recorded.
        let notes = h.agent.notes().await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "luna");
        assert_eq!(notes[0].1, "sess-1");
    }

    #[tokio::test]
    async fn same_tier_never_fires_twice() {
        let h = harness(nudging_brain()).await;
        seed_session(&h.db, 30, Some("sess-1")).await;
        nudge::record_nudge(h.db.pool(), BOT, USER, Utc::now(), 24.0, "earlier")
            .await
            .unwrap();

        h.scheduler.run_cycle().await;

        assert_eq!(h.agent.call_count().await, 0);
        assert!(h.channel.texts().await.is_empty());
    }

    #[tokio::test]
    async fn next_tier_fires_after_the_first() {
        let h = harness(nudging_brain()).await;
        seed_session(&h.db, 80, Some("sess-1")).await;
        nudge::record_nudge(h.db.pool(), BOT, USER, Utc::now(), 24.0, "earlier")
            .await
            .unwrap();
        h.agent.push_outcome(TurnOutcome::text("last call")).await;

        h.scheduler.run_cycle().await;

        assert_eq!(h.agent.calls().await[0].request.text, "One last check-in.");
        assert_eq!(
            nudge::last_nudge_delay(h.db.pool(), BOT, USER).await.unwrap(),
            Some(72.0)
        );
    }

    #[tokio::test]
    async fn stop_after_tier_ends_the_ladder() {
        let h = harness(nudging_brain()).await;
        seed_session(&h.db, 500, Some("sess-1")).await;
        nudge::record_nudge(h.db.pool(), BOT, USER, Utc::now(), 72.0, "final")
            .await
            .unwrap();

        h.scheduler.run_cycle().await;

        assert_eq!(h.agent.call_count().await, 0);
    }

    #[tokio::test]
    async fn generation_failure_leaves_no_side_effects() {
        let h = harness(nudging_brain()).await;
        seed_session(&h.db, 30, Some("sess-1")).await;
        h.agent.push_outcome(TurnOutcome::failure("model overloaded")).await;

        h.scheduler.run_cycle().await;

        assert!(h.channel.texts().await.is_empty());
        assert_eq!(
            nudge::last_nudge_delay(h.db.pool(), BOT, USER).await.unwrap(),
            None
        );
        assert!(h.agent.notes().await.is_empty());
    }

    #[tokio::test]
    async fn voice_brain_nudges_in_voice_ignoring_user_preference() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
                "tts": {"enabled": true},
                "nudges": {"enabled": true, "triggers": [
                    {"delay_hours": 24, "prompt": "check in"}
                ]}}"#,
        )
        .await;
        seed_session(&h.db, 30, Some("sess-1")).await;
        // The user turned voice off for regular turns; nudges do not
        // consult this.
        session::set_tts_preference(h.db.pool(), BOT, USER, Some(false))
            .await
            .unwrap();
        h.agent.push_outcome(TurnOutcome::text("spoken nudge")).await;

        h.scheduler.run_cycle().await;

        assert!(matches!(
            h.agent.calls().await[0].shape,
            CallShape::Speech(_)
        ));
    }

    #[tokio::test]
    async fn disabled_brains_are_skipped() {
        let h = harness(
            r#"{"id": "luna", "name": "Luna", "system_prompt": "p"}"#,
        )
        .await;
        seed_session(&h.db, 1000, Some("sess-1")).await;

        h.scheduler.run_cycle().await;
        assert_eq!(h.agent.call_count().await, 0);
    }
}
