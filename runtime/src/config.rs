//! Configuration
//!
//! Tunables are collected into `InterviewConfig`. Precedence, lowest to
//! highest: built-in defaults, an optional TOML file, environment
//! variables. This mirrors the defaults-struct-plus-env-overlay shape used
//! elsewhere in the ecosystem, scaled down to the handful of knobs this
//! system actually exposes.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::RuntimeError;
use crate::llm::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};

pub const DEFAULT_TOTAL_SECONDS: u64 = 300;
pub const DEFAULT_COLLECTION_WINDOW: Duration = Duration::from_millis(800);
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_HISTORY: usize = 6;

#[derive(Debug, Clone)]
pub struct InterviewConfig {
    pub total_seconds: u64,
    pub collection_window: Duration,
    pub tick_period: Duration,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub max_history: usize,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            total_seconds: DEFAULT_TOTAL_SECONDS,
            collection_window: DEFAULT_COLLECTION_WINDOW,
            tick_period: DEFAULT_TICK_PERIOD,
            llm_model: DEFAULT_MODEL.to_string(),
            llm_temperature: DEFAULT_TEMPERATURE,
            llm_max_tokens: DEFAULT_MAX_TOKENS,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Overlay file, every field optional so a file only needs to mention what
/// it overrides.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    total_seconds: Option<u64>,
    collection_window_ms: Option<u64>,
    tick_seconds: Option<u64>,
    llm_model: Option<String>,
    llm_temperature: Option<f32>,
    llm_max_tokens: Option<u32>,
    max_history: Option<usize>,
}

impl InterviewConfig {
    /// Load defaults, overlay an optional TOML file, then overlay
    /// environment variables.
    pub fn load(file_path: Option<&Path>) -> Result<Self, RuntimeError> {
        let mut config = Self::default();

        if let Some(path) = file_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| RuntimeError::Config(format!("reading {}: {e}", path.display())))?;
            let file: ConfigFile = toml::from_str(&contents)
                .map_err(|e| RuntimeError::Config(format!("parsing {}: {e}", path.display())))?;
            config.apply_file(file);
        }

        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.total_seconds {
            self.total_seconds = v;
        }
        if let Some(ms) = file.collection_window_ms {
            self.collection_window = Duration::from_millis(ms);
        }
        if let Some(secs) = file.tick_seconds {
            self.tick_period = Duration::from_secs(secs);
        }
        if let Some(v) = file.llm_model {
            self.llm_model = v;
        }
        if let Some(v) = file.llm_temperature {
            self.llm_temperature = v;
        }
        if let Some(v) = file.llm_max_tokens {
            self.llm_max_tokens = v;
        }
        if let Some(v) = file.max_history {
            self.max_history = v;
        }
    }

    fn apply_env(&mut self) -> Result<(), RuntimeError> {
        if let Ok(v) = std::env::var("INTERVIEW_MODEL") {
            if !v.is_empty() {
                self.llm_model = v;
            }
        }
        if let Ok(v) = std::env::var("INTERVIEW_TOTAL_SECONDS") {
            self.total_seconds = v
                .parse()
                .map_err(|_| RuntimeError::Config(format!("INTERVIEW_TOTAL_SECONDS not a u64: {v}")))?;
        }
        if let Ok(v) = std::env::var("INTERVIEW_WINDOW_MS") {
            let ms: u64 = v
                .parse()
                .map_err(|_| RuntimeError::Config(format!("INTERVIEW_WINDOW_MS not a u64: {v}")))?;
            self.collection_window = Duration::from_millis(ms);
        }
        if let Ok(v) = std::env::var("INTERVIEW_TICK_SECONDS") {
            let secs: u64 = v
                .parse()
                .map_err(|_| RuntimeError::Config(format!("INTERVIEW_TICK_SECONDS not a u64: {v}")))?;
            self.tick_period = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Whether the environment has a usable Anthropic API key. LLM agents
    /// use this, not a cached flag, so tests can flip the environment
    /// between cases.
    pub fn has_api_key() -> bool {
        std::env::var("ANTHROPIC_API_KEY")
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = InterviewConfig::default();
        assert_eq!(config.total_seconds, 300);
        assert_eq!(config.collection_window, Duration::from_millis(800));
        assert_eq!(config.tick_period, Duration::from_secs(10));
        assert_eq!(config.max_history, 6);
    }
}
