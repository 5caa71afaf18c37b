//! End-to-end pipeline tests: ingestion through commands, turns,
//! recovery, and shutdown, against in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use agent_daemon::TurnOutcome;
use async_trait::async_trait;
use brain_core::{BrainConfig, BrainStore};
use mock_agent::{CallShape, ScriptedAgent};
use orchestrator::{
    BotRegistry, BotStatus, ChannelCredentials, ChannelFactory, ChannelUpdate, CommandDispatcher,
    HealthMonitor, InboundMessage, IngestProcessor, MessagingChannel, OrchestratorError,
    RecordingChannel, TurnOrchestrator,
};
use troupe_database::{session, Database};

const BOT: &str = "luna-bot";
const USER: &str = "u1";

struct Platform {
    registry: Arc<BotRegistry>,
    ingest: IngestProcessor,
    channel: Arc<RecordingChannel>,
    agent: Arc<ScriptedAgent>,
    db: Database,
}

async fn platform(brain_json: &str) -> Platform {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();

    let mut brains = BrainStore::new();
    let brain: BrainConfig = serde_json::from_str(brain_json).unwrap();
    let brain_id = brain.id.clone();
    brains.insert(brain);
    let brains = Arc::new(brains);

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
    let orchestrator = Arc::new(TurnOrchestrator::new(
        registry.clone(),
        brains.clone(),
        agent.clone(),
        db.clone(),
    ));
    let commands = Arc::new(CommandDispatcher::new(
        registry.clone(),
        brains,
        db.clone(),
        Some(BOT.to_string()),
    ));
    let ingest = IngestProcessor::new(registry.clone(), orchestrator, commands);

    Platform {
        registry,
        ingest,
        channel,
        agent,
        db,
    }
}

fn inbound(text: &str) -> ChannelUpdate {
    ChannelUpdate::Message(InboundMessage {
        user_id: USER.to_string(),
        user_name: Some("Bob".to_string()),
        text: text.to_string(),
        media: None,
    })
}

#[tokio::test]
async fn conversation_flows_through_commands_and_turns() {
    let p = platform(
        r#"{"id": "luna", "name": "Luna", "system_prompt": "You are Luna.",
            "greeting": "Hey, Luna here.",
            "tts": {"enabled": false, "voice": "nova"}}"#,
    )
    .await;

    // Greeting first.
    p.ingest.handle_update(BOT, inbound("/start")).await;

    // A first text turn establishes a session.
    p.agent
        .push_outcome(TurnOutcome::text("Hi Bob!").with_session("sess-1"))
        .await;
    p.ingest.handle_update(BOT, inbound("hello")).await;

    // Voice on, then the next turn uses the speech shape.
    p.ingest.handle_update(BOT, inbound("/tts")).await;
    p.agent.push_outcome(TurnOutcome::text("spoken")).await;
    p.ingest.handle_update(BOT, inbound("tell me more")).await;

    let calls = p.agent.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].request.system_prompt.as_deref(), Some("You are Luna."));
    assert!(matches!(calls[0].shape, CallShape::Plain));
    // Second turn resumes the stored session and honors the toggle.
    assert_eq!(calls[1].request.session_id.as_deref(), Some("sess-1"));
    assert!(matches!(calls[1].shape, CallShape::Speech(_)));

    let texts = p.channel.texts().await;
    assert!(texts.contains(&"Hey, Luna here.".to_string()));
    assert!(texts.contains(&"Hi Bob!".to_string()));
    assert!(texts.contains(&"Voice replies are now on.".to_string()));

    let record = session::get_session(p.db.pool(), BOT, USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.message_count, 2);
}

#[tokio::test]
async fn daily_limit_cuts_off_with_a_single_notice() {
    let p = platform(
        r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
            "daily_message_limit": 2}"#,
    )
    .await;

    p.agent.push_outcome(TurnOutcome::text("one")).await;
    p.agent.push_outcome(TurnOutcome::text("two")).await;
    p.ingest.handle_update(BOT, inbound("first")).await;
    p.ingest.handle_update(BOT, inbound("second")).await;
    p.ingest.handle_update(BOT, inbound("third")).await;

    assert_eq!(p.agent.call_count().await, 2);
    let texts = p.channel.texts().await;
    assert_eq!(
        texts.last().map(String::as_str),
        Some("Daily limit reached (2/2). Your messages reset at midnight UTC.")
    );
}

struct SwappingFactory {
    replacement: tokio::sync::Mutex<Option<Arc<RecordingChannel>>>,
}

#[async_trait]
impl ChannelFactory for SwappingFactory {
    async fn create(
        &self,
        _credentials: &ChannelCredentials,
    ) -> Result<Arc<dyn MessagingChannel>, OrchestratorError> {
        let replacement = self
            .replacement
            .lock()
            .await
            .take()
            .unwrap_or_else(|| Arc::new(RecordingChannel::new()));
        Ok(replacement)
    }
}

#[tokio::test]
async fn turns_after_recovery_land_on_the_new_channel() {
    let p = platform(r#"{"id": "luna", "name": "Luna", "system_prompt": "p"}"#).await;

    let fresh = Arc::new(RecordingChannel::new());
    let factory = Arc::new(SwappingFactory {
        replacement: tokio::sync::Mutex::new(Some(fresh.clone())),
    });
    let monitor = HealthMonitor::new(p.registry.clone(), factory, Duration::from_secs(60));

    p.channel.set_connected(false);
    monitor.run_cycle().await;

    assert!(p.channel.is_stopped());
    assert_eq!(p.registry.status(BOT).await.unwrap(), BotStatus::Healthy);

    // The next turn goes out over the recovered channel.
    p.agent.push_outcome(TurnOutcome::text("back online")).await;
    p.ingest.handle_update(BOT, inbound("hello again")).await;

    assert!(!p.channel.texts().await.contains(&"back online".to_string()));
    assert!(fresh.texts().await.contains(&"back online".to_string()));
}

#[tokio::test]
async fn shutdown_stops_channels_and_cancels_pending_promotions() {
    let p = platform(
        r#"{"id": "luna", "name": "Luna", "system_prompt": "p",
            "cta": {"enabled": true, "send_on_first": true, "delay_secs": 3600,
                    "text": "join us"}}"#,
    )
    .await;

    p.agent.push_outcome(TurnOutcome::text("hi")).await;
    p.ingest.handle_update(BOT, inbound("hello")).await;
    assert_eq!(p.registry.pending_cta_tasks().await, 1);

    p.registry.shutdown().await;

    assert!(p.channel.is_stopped());
    assert_eq!(p.registry.pending_cta_tasks().await, 0);
    // The promotion never fired.
    assert!(!p.channel.texts().await.contains(&"join us".to_string()));
}

#[tokio::test]
async fn restart_on_the_designated_bot_rotates_the_session() {
    let p = platform(r#"{"id": "luna", "name": "Luna", "system_prompt": "p"}"#).await;

    p.agent
        .push_outcome(TurnOutcome::text("hi").with_session("sess-1"))
        .await;
    p.ingest.handle_update(BOT, inbound("hello")).await;
    assert_eq!(
        session::get_current_uuid(p.db.pool(), BOT, USER).await.unwrap(),
        Some("sess-1".to_string())
    );

    p.ingest.handle_update(BOT, inbound("/restart")).await;
    assert_eq!(
        session::get_current_uuid(p.db.pool(), BOT, USER).await.unwrap(),
        None
    );

    // The next turn starts a fresh agent session.
    p.agent.push_outcome(TurnOutcome::text("fresh start")).await;
    p.ingest.handle_update(BOT, inbound("hi again")).await;
    let calls = p.agent.calls().await;
    assert_eq!(calls[1].request.session_id, None);
    assert!(calls[1].request.system_prompt.is_some());
}
