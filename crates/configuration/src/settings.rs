use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Config {
    /// Rejects settings that would make the runner loop misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bt = &self.backtest;
        if bt.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backtest.poll_interval_secs must be positive".to_string(),
            ));
        }
        if bt.inactivity_timeout_secs < bt.poll_interval_secs {
            return Err(ConfigError::ValidationError(format!(
                "backtest.inactivity_timeout_secs ({}) must be at least the poll interval ({})",
                bt.inactivity_timeout_secs, bt.poll_interval_secs
            )));
        }
        if bt.trade_sample_limit == 0 {
            return Err(ConfigError::ValidationError(
                "backtest.trade_sample_limit must be positive".to_string(),
            ));
        }
        if self.ai.enabled && self.ai.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ai.base_url is required when ai.enabled = true".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for the PostgreSQL store.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Falls back to the `DATABASE_URL` environment variable when empty.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

/// Where the simulation service lives and how patiently we wait on it.
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSettings {
    #[serde(default = "default_backtest_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How often a running job is polled.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// A job with neither progress nor heartbeat for this long is stalled.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// Number of trades sampled for evaluation and comparison.
    #[serde(default = "default_trade_sample_limit")]
    pub trade_sample_limit: usize,
}

impl BacktestSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            base_url: default_backtest_url(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            trade_sample_limit: default_trade_sample_limit(),
        }
    }
}

/// The chat-completions endpoint used for evaluation and optimization.
#[derive(Debug, Clone, Deserialize)]
pub struct AiSettings {
    /// When false the deterministic fallbacks are used for every iteration.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ai_url")]
    pub base_url: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl AiSettings {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_ai_url(),
            model: default_ai_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_ai_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Log level and the rolling log file location.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_log_prefix(),
        }
    }
}

// --- Default Values ---

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_backtest_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_inactivity_timeout_secs() -> u64 {
    300
}

fn default_trade_sample_limit() -> usize {
    100
}

fn default_ai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "EVOLVER_AI_API_KEY".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    180
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "evolver.log".to_string()
}
