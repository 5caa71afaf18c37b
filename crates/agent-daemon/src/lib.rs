//! Client for the external conversational agent daemon.
//!
//! Troupe bots do not generate language themselves; every turn is
//! delegated to a long-running agent process that keeps per-conversation
//! state and supports session resumption by uuid. This crate provides:
//!
//! - [`Agent`] - The trait the orchestrator consumes (three call shapes:
//!   plain streamed exchange, exchange-with-speech, exchange-with-image)
//! - [`AgentClient`] - HTTP + SSE implementation against the daemon
//! - [`AgentEvent`] / [`TurnStream`] - Discriminated event stream replacing
//!   nested progress/tool callbacks
//! - [`TurnOutcome`] - Final result of one agent exchange
//!
//! Two-step flows (speech, image) surface a [`AgentEvent::GenerationStarted`]
//! marker between the conversational step and the generation step so the
//! UI can update its in-progress status.

mod agent;
mod client;
mod config;
mod error;
mod stream;
mod types;

pub use agent::Agent;
pub use client::AgentClient;
pub use config::DaemonConfig;
pub use error::AgentError;
pub use stream::{turn_channel, TurnSender, TurnStream};
pub use types::{AgentEvent, ImageParams, InlineImage, SpeechParams, TurnOutcome, TurnRequest};

// Re-export async_trait for implementors.
pub use async_trait::async_trait;
