//! Bot roster loading.
//!
//! The roster is a JSON list binding bot ids to brains and channel
//! credentials. Tokens can be inline or pulled from the environment so
//! the file itself stays checked-in safe.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

/// One roster entry.
#[derive(Debug, Clone, Deserialize)]
pub struct BotEntry {
    /// Platform-wide bot id.
    pub bot_id: String,

    /// Brain backing this bot.
    pub brain_id: String,

    /// Bot identity on the messaging gateway (e.g. a bot username).
    pub identity: String,

    /// Inline channel token. Prefer `token_env` for real deployments.
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable holding the channel token.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl BotEntry {
    /// Resolve the channel token, preferring the environment variable.
    pub fn resolve_token(&self) -> Result<String, String> {
        if let Some(var) = &self.token_env {
            return env::var(var)
                .map_err(|_| format!("bot '{}': env var {var} is not set", self.bot_id));
        }
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| format!("bot '{}': no token or token_env configured", self.bot_id))
    }
}

/// Load the roster file.
pub fn load_roster(path: &Path) -> Result<Vec<BotEntry>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("reading roster {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("parsing roster {}: {e}", path.display()))
}
