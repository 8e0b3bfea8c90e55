mod actions;
mod ai;
mod app;
mod classifier;
mod config;
mod domain;
mod host;
mod infrastructure;
mod pipeline;

use std::time::Duration;

use anyhow::Result;
use infrastructure::{directories, logging, shutdown};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run());
    // a blocked stdin read would otherwise keep the runtime alive
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let (shutdown, _) = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());

    let app = app::InboxLabelerApp::initialize(config, paths, shutdown)?;
    app.run().await
}
