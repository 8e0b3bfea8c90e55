use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::{fs::File, io::BufReader, task::JoinHandle, time::sleep};

use crate::{
    ai::{GenerativeBackend, OpenAiClient},
    classifier::{AssistedClassifier, Classifier, RuleClassifier},
    config::{AppConfig, FeedSource, LabelSource},
    host::{
        feed::{FeedCommand, FeedDriver},
        InMemoryInbox,
    },
    infrastructure::{directories::ResolvedPaths, shutdown::Shutdown},
    pipeline::{LabelPipeline, PipelineStats},
};

pub struct InboxLabelerApp {
    _paths: ResolvedPaths,
    config: Arc<AppConfig>,
    pipeline_handle: JoinHandle<PipelineStats>,
    driver: FeedDriver,
    shutdown: Shutdown,
}

impl InboxLabelerApp {
    pub fn initialize(config: AppConfig, paths: ResolvedPaths, shutdown: Shutdown) -> Result<Self> {
        let config = Arc::new(config);

        let http_client = Client::builder()
            .user_agent(format!("inbox-labeler/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let backend: Arc<dyn GenerativeBackend> =
            Arc::new(OpenAiClient::new(http_client, config.backend.clone()));

        let classifier: Arc<dyn Classifier> = match config.pipeline.label_source {
            LabelSource::Rules => Arc::new(RuleClassifier),
            LabelSource::Assisted => Arc::new(AssistedClassifier::new(backend.clone())),
        };
        tracing::info!(
            source = ?config.pipeline.label_source,
            debounce_ms = config.pipeline.debounce.as_millis() as u64,
            retention_secs = config.pipeline.retention.as_secs(),
            retry_backoff_ms = config.pipeline.retry_backoff.as_millis() as u64,
            "label source configured"
        );

        let inbox = Arc::new(InMemoryInbox::new());
        let pipeline = LabelPipeline::new(inbox.clone(), classifier, &config.pipeline);
        let pipeline_handle = pipeline.spawn(shutdown.subscribe());

        let driver = FeedDriver::new(inbox, backend, config.backend.request_timeout);

        Ok(Self {
            _paths: paths,
            config,
            pipeline_handle,
            driver,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let InboxLabelerApp {
            _paths: _,
            config,
            mut pipeline_handle,
            mut driver,
            shutdown,
        } = self;

        tracing::info!("inbox labeler started");

        let mut listener = shutdown.subscribe();
        let feed_result = match &config.feed.source {
            FeedSource::Stdin => {
                driver
                    .run(BufReader::new(tokio::io::stdin()), &mut listener)
                    .await
            }
            FeedSource::File(path) => match File::open(path)
                .await
                .with_context(|| format!("failed to open inbox feed {path}"))
            {
                Ok(file) => driver.run(BufReader::new(file), &mut listener).await,
                Err(err) => Err(err),
            },
        };
        if let Err(err) = feed_result {
            tracing::error!(target: "feed", error = %err, "inbox feed aborted");
        }

        if !listener.is_triggered() {
            tokio::select! {
                _ = sleep(config.feed.settle) => {}
                _ = listener.notified() => {}
            }
            driver.apply(FeedCommand::Dump).await;
        }

        shutdown.trigger();

        let shutdown_timeout = Duration::from_secs(5);
        let pipeline_sleep = sleep(shutdown_timeout);
        tokio::pin!(pipeline_sleep);
        tokio::select! {
            res = &mut pipeline_handle => match res {
                Ok(stats) => tracing::info!(
                    passes = stats.passes,
                    dispatched = stats.dispatched,
                    labeled = stats.labeled,
                    discarded = stats.discarded,
                    failed = stats.failed,
                    "pipeline summary"
                ),
                Err(err) if err.is_panic() => {
                    tracing::error!("labeling pipeline panicked");
                }
                Err(_) => {}
            },
            _ = &mut pipeline_sleep => {
                tracing::warn!(
                    target: "pipeline",
                    "pipeline did not stop within {:?}; aborting",
                    shutdown_timeout
                );
                pipeline_handle.abort();
            }
        }

        tracing::info!("inbox labeler stopped");
        Ok(())
    }
}
