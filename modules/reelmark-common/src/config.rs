use std::env;
use std::path::PathBuf;

use crate::rules::RuleSet;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Ollama
    pub ollama_url: String,
    pub ollama_model: String,

    // Session persistence
    pub session_file: PathBuf,
    pub save_every: u32,

    // Pacing
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub delay_increment_ms: u64,
    pub batch_pause_every: u32,
    pub batch_pause_ms: u64,
    pub rate_limit_wait_ms: u64,

    // Run bounds
    pub max_cycles: u32,
    pub empty_cycle_limit: u32,

    // Matching rules
    pub target_domains: Vec<String>,
    pub include_patterns: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables. Every value has a
    /// production default; panics with a clear message when a numeric
    /// variable is set but unparseable.
    pub fn from_env() -> Self {
        let defaults = RuleSet::default();
        Self {
            ollama_url: env_or("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: env_or("OLLAMA_MODEL", "mistral"),
            session_file: PathBuf::from(env_or(
                "REELMARK_SESSION_FILE",
                "reelmark_session.json",
            )),
            save_every: numeric_env("REELMARK_SAVE_EVERY", 10),
            base_delay_ms: numeric_env("REELMARK_BASE_DELAY_MS", 3_000),
            max_delay_ms: numeric_env("REELMARK_MAX_DELAY_MS", 15_000),
            delay_increment_ms: numeric_env("REELMARK_DELAY_INCREMENT_MS", 1_000),
            batch_pause_every: numeric_env("REELMARK_BATCH_PAUSE_EVERY", 5),
            batch_pause_ms: numeric_env("REELMARK_BATCH_PAUSE_MS", 30_000),
            rate_limit_wait_ms: numeric_env("REELMARK_RATE_LIMIT_WAIT_MS", 60_000),
            max_cycles: numeric_env("REELMARK_MAX_CYCLES", 500),
            empty_cycle_limit: numeric_env("REELMARK_EMPTY_CYCLE_LIMIT", 5),
            target_domains: list_env("REELMARK_TARGET_DOMAINS", &defaults.target_domains),
            include_patterns: list_env("REELMARK_INCLUDE_PATTERNS", &defaults.include_patterns),
        }
    }

    /// Matching rules derived from the configured domains and patterns.
    pub fn rules(&self) -> RuleSet {
        RuleSet::new(self.target_domains.clone(), self.include_patterns.clone())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn numeric_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}

/// Comma-separated list variable. Setting the variable to an empty string
/// yields an empty list, which disables the corresponding checks.
fn list_env(key: &str, default: &[String]) -> Vec<String> {
    match env::var(key) {
        Ok(value) => value
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        Err(_) => default.to_vec(),
    }
}
