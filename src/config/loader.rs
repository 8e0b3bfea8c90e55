use std::{env, time::Duration};

use url::Url;

use super::env::{
    AppConfig, BackendConfig, ConfigError, DirectoryConfig, FeedConfig, FeedSource, LabelSource,
    LoggingConfig, PipelineConfig, MAX_DEBOUNCE, MAX_RETRY_BACKOFF, MIN_DEBOUNCE,
};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_lookup(|key| env::var(key).ok())
}

impl AppConfig {
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let endpoint = get("OPENAI_API_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        match Url::parse(&endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::Invalid {
                    key: "OPENAI_API_URL",
                    reason: format!("unsupported scheme {}", url.scheme()),
                })
            }
            Err(err) => {
                return Err(ConfigError::Invalid {
                    key: "OPENAI_API_URL",
                    reason: err.to_string(),
                })
            }
        }

        let backend = BackendConfig {
            api_key: get("OPENAI_API_KEY"),
            model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            endpoint,
            request_timeout: millis(get("BACKEND_TIMEOUT_MS"), 15_000),
        };

        let label_source = match get("LABEL_SOURCE").as_deref().map(str::to_ascii_lowercase) {
            None => LabelSource::Rules,
            Some(value) if value == "rules" => LabelSource::Rules,
            Some(value) if value == "assisted" => LabelSource::Assisted,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LABEL_SOURCE",
                    reason: format!("expected `rules` or `assisted`, got `{other}`"),
                })
            }
        };
        if label_source == LabelSource::Assisted && backend.api_key.is_none() {
            return Err(ConfigError::Missing("OPENAI_API_KEY"));
        }

        let pipeline = PipelineConfig {
            label_source,
            debounce: millis(get("SCAN_DEBOUNCE_MS"), 100).clamp(MIN_DEBOUNCE, MAX_DEBOUNCE),
            retention: Duration::from_secs(
                get("LEDGER_RETENTION_SECS")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(3_600),
            ),
            classify_timeout: millis(get("CLASSIFY_TIMEOUT_MS"), 20_000),
            retry_backoff: millis(get("RETRY_BACKOFF_MS"), 5_000)
                .clamp(MIN_DEBOUNCE, MAX_RETRY_BACKOFF),
        };

        let feed = FeedConfig {
            source: match get("INBOX_FEED") {
                None => FeedSource::Stdin,
                Some(path) if path == "-" => FeedSource::Stdin,
                Some(path) => FeedSource::File(path),
            },
            settle: millis(get("FEED_SETTLE_MS"), 1_500),
        };

        let directories = DirectoryConfig {
            logs_dir: get("LOGS_DIR").unwrap_or_else(|| "logs".to_string()),
        };

        let logging = LoggingConfig {
            level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        Ok(Self {
            backend,
            pipeline,
            feed,
            directories,
            logging,
        })
    }
}

fn millis(value: Option<String>, default: u64) -> Duration {
    Duration::from_millis(
        value
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default),
    )
}
