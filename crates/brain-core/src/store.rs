//! Loading and caching of brain files and image style profiles.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::{BrainConfig, StyleParams};
use crate::error::BrainError;

/// A named image style profile, shareable across brains.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StyleProfile {
    /// Profile name referenced by `image_gen.style_profile`.
    pub name: String,

    /// The style parameters this profile resolves to.
    pub params: StyleParams,
}

/// In-memory store of brain configurations and style profiles.
///
/// Loaded once at startup; brains are static and never hot-reloaded.
#[derive(Debug, Default)]
pub struct BrainStore {
    brains: HashMap<String, BrainConfig>,
    profiles: HashMap<String, StyleProfile>,
}

impl BrainStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all `*.json` brain files from a directory.
    ///
    /// Invalid files are logged and skipped so one broken brain does not
    /// take down the platform; the corresponding bot simply never
    /// registers.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, BrainError> {
        let mut loaded = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load_file(&path) {
                Ok(brain) => {
                    info!(brain = %brain.id, file = %path.display(), "loaded brain");
                    self.brains.insert(brain.id.clone(), brain);
                    loaded += 1;
                }
                Err(err) => {
                    warn!(file = %path.display(), "skipping brain file: {err}");
                }
            }
        }
        Ok(loaded)
    }

    /// Load and validate a single brain file.
    pub fn load_file(path: &Path) -> Result<BrainConfig, BrainError> {
        let raw = fs::read_to_string(path)?;
        let brain: BrainConfig = serde_json::from_str(&raw)?;
        brain.validate().map_err(BrainError::Configuration)?;
        Ok(brain)
    }

    /// Load all `*.json` style profiles from a directory.
    pub fn load_profiles(&mut self, dir: &Path) -> Result<usize, BrainError> {
        let mut loaded = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<StyleProfile>(&raw) {
                Ok(profile) => {
                    self.profiles.insert(profile.name.clone(), profile);
                    loaded += 1;
                }
                Err(err) => {
                    warn!(file = %path.display(), "skipping style profile: {err}");
                }
            }
        }
        Ok(loaded)
    }

    /// Insert a brain directly (tests, programmatic setup).
    pub fn insert(&mut self, brain: BrainConfig) {
        self.brains.insert(brain.id.clone(), brain);
    }

    /// Insert a style profile directly.
    pub fn insert_profile(&mut self, profile: StyleProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    /// Look up a brain by id.
    pub fn get(&self, id: &str) -> Option<&BrainConfig> {
        self.brains.get(id)
    }

    /// Look up a brain by id, erroring when missing.
    pub fn require(&self, id: &str) -> Result<&BrainConfig, BrainError> {
        self.get(id).ok_or_else(|| BrainError::UnknownBrain(id.to_string()))
    }

    /// All loaded brain ids.
    pub fn brain_ids(&self) -> impl Iterator<Item = &str> {
        self.brains.keys().map(String::as_str)
    }

    /// Resolve the effective image style for a brain.
    ///
    /// A named profile takes precedence over the brain-inline parameters;
    /// an unresolvable profile falls back to the inline values rather
    /// than failing the turn.
    pub fn resolve_style(&self, brain: &BrainConfig) -> StyleParams {
        if let Some(name) = &brain.image_gen.style_profile {
            match self.profiles.get(name) {
                Some(profile) => return profile.params.clone(),
                None => {
                    warn!(
                        brain = %brain.id,
                        profile = %name,
                        "style profile not found, using brain-inline style"
                    );
                }
            }
        }
        brain.image_gen.style.clone()
    }
}
