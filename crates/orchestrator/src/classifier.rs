//! Pure turn-variant classification.
//!
//! The decision is deliberately separated from dispatch so it can be
//! tested as a total function over its inputs.

use brain_core::BrainConfig;

/// Keywords that mark image intent. Deliberately coarse: phrasings that
/// avoid all six (e.g. "turn me into a cartoon") fall through to a text
/// turn even with image generation enabled. This is exact documented
/// behavior, not a bug.
pub const IMAGE_KEYWORDS: [&str; 6] = ["image", "picture", "photo", "draw", "generate", "create a"];

/// The three turn variants. Command turns are filtered earlier by the
/// `/` prefix check in ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    /// Two-step exchange ending in image generation.
    Image,
    /// Two-step exchange ending in speech synthesis.
    Tts,
    /// Single streamed text exchange.
    Text,
}

/// Classify an inbound message into a turn variant.
///
/// Pure and total: same inputs always yield the same variant, no side
/// effects. `user_tts_preference` is tri-state; when set it overrides
/// the brain's TTS default in both directions.
pub fn classify(
    text: &str,
    _has_media: bool,
    brain: &BrainConfig,
    user_tts_preference: Option<bool>,
) -> TurnMode {
    if brain.image_gen.enabled && has_image_intent(text) {
        return TurnMode::Image;
    }

    let tts_on = user_tts_preference.unwrap_or(brain.tts.enabled);
    if tts_on {
        return TurnMode::Tts;
    }

    TurnMode::Text
}

fn has_image_intent(text: &str) -> bool {
    let lowered = text.to_lowercase();
    IMAGE_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brain(tts: bool, image_gen: bool) -> BrainConfig {
        serde_json::from_str(&format!(
            r#"{{"id": "luna", "name": "Luna", "system_prompt": "You are Luna.",
                 "tts": {{"enabled": {tts}}},
                 "image_gen": {{"enabled": {image_gen}}}}}"#,
        ))
        .unwrap()
    }

    #[test]
    fn defaults_to_text() {
        assert_eq!(classify("hello", false, &brain(false, false), None), TurnMode::Text);
    }

    #[test]
    fn image_keyword_with_image_gen_enabled() {
        let b = brain(false, true);
        assert_eq!(classify("draw me a castle", false, &b, None), TurnMode::Image);
        assert_eq!(classify("A PICTURE of the sea", false, &b, None), TurnMode::Image);
        assert_eq!(classify("create a sunset scene", false, &b, None), TurnMode::Image);
    }

    #[test]
    fn image_keyword_without_image_gen_falls_through() {
        assert_eq!(
            classify("draw me a castle", false, &brain(true, false), None),
            TurnMode::Tts
        );
        assert_eq!(
            classify("draw me a castle", false, &brain(false, false), None),
            TurnMode::Text
        );
    }

    #[test]
    fn cartoon_phrasing_avoids_all_keywords() {
        // Documented exact behavior: no keyword matches, so this is a
        // text turn even with image generation enabled.
        assert_eq!(
            classify("turn me into a cartoon", true, &brain(false, true), None),
            TurnMode::Text
        );
    }

    #[test]
    fn user_preference_overrides_brain_default_both_ways() {
        assert_eq!(classify("hello", false, &brain(false, false), Some(true)), TurnMode::Tts);
        assert_eq!(classify("hello", false, &brain(true, false), Some(false)), TurnMode::Text);
        // Unset preference falls back to the brain default.
        assert_eq!(classify("hello", false, &brain(true, false), None), TurnMode::Tts);
    }

    #[test]
    fn image_wins_over_tts() {
        let b = brain(true, true);
        assert_eq!(classify("generate something", false, &b, Some(true)), TurnMode::Image);
    }

    #[test]
    fn is_deterministic() {
        let b = brain(true, true);
        let first = classify("a photo please", false, &b, Some(false));
        for _ in 0..10 {
            assert_eq!(classify("a photo please", false, &b, Some(false)), first);
        }
    }
}
