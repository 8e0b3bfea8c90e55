use std::io;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

static INIT: OnceCell<()> = OnceCell::new();
static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Targets this crate logs under.
pub const SUBSYSTEMS: [&str; 7] = [
    "pipeline",
    "scanner",
    "renderer",
    "classifier",
    "backend",
    "feed",
    "actions",
];

/// HTTP stack crates that are chatty at debug level.
const QUIET_DEPENDENCIES: [&str; 4] = ["hyper", "hyper_util", "reqwest", "rustls"];

/// `RUST_LOG` wins when it parses; otherwise `level` applies to everything
/// and the HTTP stack is held at `warn`.
fn build_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    if let Some(directives) = rust_log {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    let base = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    QUIET_DEPENDENCIES.iter().fold(base, |filter, krate| {
        match format!("{krate}=warn").parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    })
}

/// Compact console output on stderr, so stdin/stdout stay free for the feed,
/// plus a daily rolling file with full timestamps.
pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    INIT.get_or_try_init::<_, anyhow::Error>(|| {
        let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        let env_filter = build_filter(rust_log.as_deref(), &config.logging.level);

        let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "labeler.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        let _ = GUARD.set(guard);

        let console_layer = fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_timer(fmt::time::uptime())
            .with_target(true)
            .with_ansi(true);

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::info!(
            logs = %paths.logs_dir.display(),
            subsystems = ?SUBSYSTEMS,
            "tracing initialized"
        );
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_fallback_quiets_http_stack() {
        let filter = build_filter(None, "debug").to_string().to_lowercase();
        assert!(filter.contains("debug"));
        for krate in QUIET_DEPENDENCIES {
            assert!(filter.contains(&format!("{krate}=warn")), "{filter}");
        }
    }

    #[test]
    fn rust_log_overrides_level() {
        let filter = build_filter(Some("scanner=trace"), "debug")
            .to_string()
            .to_lowercase();
        assert!(filter.contains("scanner=trace"));
        assert!(!filter.contains("hyper=warn"));
    }
}
