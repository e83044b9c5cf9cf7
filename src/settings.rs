//! Persisted user settings, read at trigger-check time.
//!
//! Stored as TOML next to whatever profile directory the embedding UI uses.
//! The orchestrator reads `auto_update` and `threshold` on every trigger
//! check; the generation section configures the default HTTP generator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Endpoint parameters for the bundled HTTP generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Seconds the orchestrator waits before treating the generation call as
    /// a terminal cycle failure.
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.8,
            timeout_secs: 60,
        }
    }
}

/// User-facing knobs for the feed-update cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSettings {
    /// When false, only manual/forced triggers run a cycle.
    pub auto_update: bool,
    /// Message-count threshold that arms the automatic trigger.
    pub threshold: u32,
    #[serde(default)]
    pub generation: GenerationSettings,
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            auto_update: true,
            threshold: 10,
            generation: GenerationSettings::default(),
        }
    }
}

impl FeedSettings {
    /// Load settings from a TOML file. A missing file yields the defaults;
    /// a malformed file is an error (the user wrote something, we must not
    /// silently discard it).
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Persist settings as TOML.
    pub fn save(&self, path: &Path) -> Result<(), FeedError> {
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = FeedSettings::default();
        assert!(s.auto_update);
        assert_eq!(s.threshold, 10);
        assert_eq!(s.generation.timeout_secs, 60);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("does-not-exist.toml");
        let s = FeedSettings::load(&path).expect("load");
        assert_eq!(s, FeedSettings::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("feed.toml");
        let mut s = FeedSettings::default();
        s.auto_update = false;
        s.threshold = 25;
        s.generation.model = "local-model".to_string();
        s.save(&path).expect("save");
        let back = FeedSettings::load(&path).expect("load");
        assert_eq!(back, s);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("feed.toml");
        std::fs::write(&path, "threshold = \"not a number").expect("write");
        assert!(FeedSettings::load(&path).is_err());
    }

    #[test]
    fn test_partial_file_fills_generation_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("feed.toml");
        std::fs::write(&path, "auto_update = false\nthreshold = 5\n").expect("write");
        let s = FeedSettings::load(&path).expect("load");
        assert!(!s.auto_update);
        assert_eq!(s.threshold, 5);
        assert_eq!(s.generation, GenerationSettings::default());
    }
}
