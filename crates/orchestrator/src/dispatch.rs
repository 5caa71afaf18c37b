//! Response dispatch: modality choice, chunking, call-to-action.
//!
//! Given a finished turn, decide which of {voice, image(s), text} to
//! send under the brain's policy flags. Delivery failures here never
//! fail the turn: audio falls back to text, everything else is logged
//! and skipped.

use std::sync::Arc;
use std::time::Duration;

use agent_daemon::TurnOutcome;
use brain_core::{BrainConfig, CtaConfig};
use tracing::{debug, info, warn};

use crate::channel::{MessagingChannel, PhotoSource};
use crate::registry::BotRegistry;

/// Channel message-size limit; longer text is split at this threshold.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Split text into sequential chunks of at most [`MAX_MESSAGE_LEN`]
/// characters, splitting on char boundaries.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for ch in text.chars() {
        if current_len == MAX_MESSAGE_LEN {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(ch);
        current_len += 1;
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Strip a leading echo of the user prompt from the agent's reply.
///
/// Some models repeat the "User: ..." line before answering; drop it
/// when it exactly matches this turn's input.
pub fn strip_prompt_echo(reply: &str, user_text: Option<&str>) -> String {
    if let Some(user_text) = user_text {
        let echo = format!("User: {user_text}");
        if let Some(rest) = reply.strip_prefix(&echo) {
            return rest.trim_start().to_string();
        }
    }
    reply.to_string()
}

/// Whether a call-to-action is due after this reply.
pub fn cta_due(cta: &CtaConfig, message_count: i64) -> bool {
    if !cta.enabled {
        return false;
    }
    if cta.send_on_first && message_count == 1 {
        return true;
    }
    cta.every_n > 0 && message_count > 0 && message_count % i64::from(cta.every_n) == 0
}

/// Dispatch a successful turn result to the user.
///
/// Policy: audio replaces text unless `tts.send_text_too`; images
/// replace text unless `image_gen.send_text_too`; text always goes out
/// when no media was produced.
pub async fn dispatch(
    channel: &Arc<dyn MessagingChannel>,
    user_id: &str,
    outcome: &TurnOutcome,
    brain: &BrainConfig,
    user_text: Option<&str>,
) {
    let mut audio_sent = false;
    let mut image_sent = false;
    let mut audio_failed = false;

    if let Some(audio) = &outcome.audio_path {
        match channel.send_voice(user_id, audio).await {
            Ok(_) => audio_sent = true,
            Err(err) => {
                // Fall back to text below.
                warn!(user = %user_id, "voice delivery failed, falling back to text: {err}");
                audio_failed = true;
            }
        }
    }

    let mut images: Vec<&std::path::PathBuf> = Vec::new();
    if let Some(image) = &outcome.image_path {
        images.push(image);
    }
    images.extend(outcome.image_paths.iter());
    for image in images {
        match channel
            .send_photo(user_id, PhotoSource::Path(image.clone()), None)
            .await
        {
            Ok(_) => image_sent = true,
            Err(err) => {
                warn!(user = %user_id, image = %image.display(), "photo delivery failed: {err}");
            }
        }
    }

    let suppress_text = (audio_sent && !brain.tts.send_text_too)
        || (image_sent && !brain.image_gen.send_text_too);
    let want_text = outcome
        .text
        .as_deref()
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false);

    if want_text && (!suppress_text || audio_failed) {
        let text = strip_prompt_echo(outcome.text.as_deref().unwrap_or_default(), user_text);
        for chunk in chunk_text(&text) {
            if let Err(err) = channel.send_text(user_id, &chunk).await {
                warn!(user = %user_id, "text delivery failed: {err}");
                break;
            }
        }
    }
}

/// Schedule the delayed call-to-action message after a qualifying reply.
///
/// The spawned task's handle is retained by the registry so platform
/// shutdown cancels pending promotions instead of firing them against a
/// torn-down channel.
pub async fn schedule_cta(
    registry: &BotRegistry,
    channel: Arc<dyn MessagingChannel>,
    user_id: &str,
    brain: &BrainConfig,
    message_count: i64,
) {
    if !cta_due(&brain.cta, message_count) {
        return;
    }

    let cta = brain.cta.clone();
    let user_id = user_id.to_string();
    let brain_id = brain.id.clone();
    info!(brain = %brain_id, user = %user_id, "scheduling call-to-action in {}s", cta.delay_secs);

    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(cta.delay_secs)).await;
        let result = match &cta.photo_url {
            Some(url) => channel
                .send_photo(&user_id, PhotoSource::Url(url.clone()), Some(&cta.text))
                .await
                .map(|_| ()),
            None => channel.send_text(&user_id, &cta.text).await.map(|_| ()),
        };
        match result {
            Ok(()) => debug!(brain = %brain_id, user = %user_id, "call-to-action delivered"),
            Err(err) => warn!(brain = %brain_id, user = %user_id, "call-to-action failed: {err}"),
        }
    });
    registry.retain_cta_task(handle).await;
}
