//! Personality ("brain") configuration for the Troupe bot platform.
//!
//! A brain is the static personality behind one bot: its system prompt,
//! security policy, and feature flags (voice replies, image generation,
//! re-engagement nudges, call-to-action promotions). This crate defines:
//!
//! - [`BrainConfig`] - The full per-bot personality configuration
//! - [`BrainStore`] - Loader/cache for brain files and image style profiles
//! - [`ContextStrategy`] - Fixed registry of pure prompt-framing strategies
//! - [`BrainError`] - Error types for configuration loading
//!
//! Brains are plain JSON files loaded once at startup; nothing in a brain
//! is executable and nothing is hot-reloaded.

mod config;
mod error;
mod prompt;
mod store;

pub use config::{
    BrainConfig, CtaConfig, ImageGenConfig, NudgeCondition, NudgeConfig, NudgeTrigger,
    SecurityConfig, StyleParams, TtsConfig,
};
pub use error::BrainError;
pub use prompt::{build_system_prompt, security_reminder, ContextStrategy};
pub use store::{BrainStore, StyleProfile};
