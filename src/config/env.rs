use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub pipeline: PipelineConfig,
    pub feed: FeedConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    Rules,
    Assisted,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub label_source: LabelSource,
    pub debounce: Duration,
    pub retention: Duration,
    pub classify_timeout: Duration,
    /// First delay before a row whose classification failed is tried again.
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label_source: LabelSource::Rules,
            debounce: MIN_DEBOUNCE,
            retention: Duration::from_secs(60 * 60),
            classify_timeout: Duration::from_secs(20),
            retry_backoff: Duration::from_secs(5),
        }
    }
}

/// Bounds for the change batcher window.
pub const MIN_DEBOUNCE: Duration = Duration::from_millis(100);
pub const MAX_DEBOUNCE: Duration = Duration::from_secs(60);

/// Ceiling for the failed-classification retry delay.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub enum FeedSource {
    Stdin,
    File(String),
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub source: FeedSource,
    pub settle: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
