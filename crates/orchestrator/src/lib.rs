//! Conversation turn orchestrator for the Troupe bot platform.
//!
//! This crate is the core of the platform: everything between "a message
//! arrived on a bot's channel" and "the right reply left in the right
//! modality". It contains:
//!
//! - [`classify`] - pure mapping of an inbound message to a turn variant
//! - [`TurnOrchestrator`] - drives one user-initiated turn end to end
//! - [`dispatch`] - response dispatch under brain policy flags
//! - [`EngagementScheduler`] - background re-engagement nudges
//! - [`HealthMonitor`] - channel liveness polling and bounded recovery
//! - [`CommandDispatcher`] - slash-command handling
//! - [`BotRegistry`] - owned registry of bot instances and their channels
//! - [`IngestProcessor`] - per-bot ingestion loop feeding the above
//!
//! The external agent, the messaging channel, and persistence are all
//! consumed through seams ([`agent_daemon::Agent`], [`MessagingChannel`],
//! the `database` crate), so the whole pipeline runs in tests against
//! in-memory doubles.

mod channel;
mod classifier;
mod commands;
mod dispatch;
mod error;
mod health;
mod ingest;
mod nudge;
mod ratelimit;
mod registry;
mod turn;

pub use channel::{
    ChannelCredentials, ChannelFactory, ChannelUpdate, FetchedMedia, InboundMessage, MediaRef,
    MessageId, MessagingChannel, NoopChannel, PhotoSource, RecordingChannel, SentOp,
};
pub use classifier::{classify, TurnMode, IMAGE_KEYWORDS};
pub use commands::{CommandDispatcher, UNKNOWN_COMMAND_REPLY};
pub use dispatch::{chunk_text, dispatch, schedule_cta, MAX_MESSAGE_LEN};
pub use error::OrchestratorError;
pub use health::{HealthMonitor, DEFAULT_HEALTH_INTERVAL, ERROR_THRESHOLD, RECOVERY_DELAY};
pub use ingest::IngestProcessor;
pub use nudge::{select_trigger, EngagementScheduler, DEFAULT_NUDGE_INTERVAL};
pub use ratelimit::{limit_notice, RateDecision, RateLimiter};
pub use registry::{BotRegistry, BotSnapshot, BotStatus};
pub use turn::{TurnOrchestrator, APOLOGY_TEXT};
