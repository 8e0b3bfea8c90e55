//! JSON-lines driver that plays host events into an [`InMemoryInbox`].
//!
//! One command per line, e.g.
//! `{"op":"insert","key":"a","message_id":"m1","sender":"x@y.z","subject":"Hi"}`.
//! Blank lines and lines starting with `#` are ignored.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    actions::{ActionBar, MailActions, ReplyFlow},
    ai::GenerativeBackend,
    host::{memory::RowSpec, InMemoryInbox, MarkerKind},
    infrastructure::shutdown::ShutdownListener,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FeedCommand {
    Insert(RowSpec),
    Update(RowSpec),
    Remove { key: String },
    Rerender { key: String },
    Hide { key: String },
    Show { key: String },
    Open { key: String },
    Archive,
    Forward,
    Reply,
    Dismiss { id: u64 },
    Dump,
}

pub struct FeedDriver {
    inbox: Arc<InMemoryInbox>,
    backend: Arc<dyn GenerativeBackend>,
    suggest_timeout: Duration,
    bar: ActionBar,
    reply: ReplyFlow,
    reported_notifications: u64,
}

impl FeedDriver {
    pub fn new(
        inbox: Arc<InMemoryInbox>,
        backend: Arc<dyn GenerativeBackend>,
        backend_timeout: Duration,
    ) -> Self {
        let reply = ReplyFlow::new(backend.clone(), inbox.clone(), backend_timeout);
        Self {
            inbox,
            backend,
            suggest_timeout: backend_timeout,
            bar: ActionBar::default(),
            reply,
            reported_notifications: 0,
        }
    }

    #[cfg(test)]
    pub fn action_bar(&self) -> &ActionBar {
        &self.bar
    }

    /// Applies commands until the reader is exhausted or shutdown fires.
    /// Returns the number of commands applied.
    pub async fn run<R>(&mut self, mut reader: R, shutdown: &mut ShutdownListener) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut line_no = 0usize;
        let mut applied = 0usize;

        loop {
            buf.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read.context("failed to read inbox feed")?,
                _ = shutdown.notified() => break,
            };
            if read == 0 {
                break;
            }
            line_no += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                tracing::warn!(target: "feed", line_no, "skipping feed line that is not valid UTF-8");
                continue;
            };
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<FeedCommand>(line) {
                Ok(command) => {
                    self.apply(command).await;
                    applied += 1;
                }
                Err(err) => {
                    tracing::warn!(target: "feed", line_no, error = %err, "skipping malformed feed line");
                }
            }
        }

        tracing::info!(target: "feed", applied, "inbox feed finished");
        Ok(applied)
    }

    pub async fn apply(&mut self, command: FeedCommand) {
        tracing::trace!(target: "feed", ?command, "applying");
        match command {
            FeedCommand::Insert(spec) | FeedCommand::Update(spec) => {
                self.inbox.upsert(&spec);
            }
            FeedCommand::Remove { key } => {
                if !self.inbox.remove(&key) {
                    tracing::warn!(target: "feed", key = %key, "remove for unknown row");
                }
            }
            FeedCommand::Rerender { key } => {
                if self.inbox.rerender(&key).is_none() {
                    tracing::warn!(target: "feed", key = %key, "rerender for unknown row");
                }
            }
            FeedCommand::Hide { key } => {
                self.inbox.set_visible(&key, false);
            }
            FeedCommand::Show { key } => {
                self.inbox.set_visible(&key, true);
            }
            FeedCommand::Open { key } => self.open(&key).await,
            FeedCommand::Archive => {
                if let Err(err) = self.inbox.archive() {
                    tracing::warn!(target: "actions", error = %err, "archive failed");
                }
                self.bar.clear();
            }
            FeedCommand::Forward => {
                if let Err(err) = self.inbox.forward() {
                    tracing::warn!(target: "actions", error = %err, "forward failed");
                }
            }
            FeedCommand::Reply => {
                let content = self.inbox.opened_content();
                self.reply.run(content).await;
                self.report_notifications();
            }
            FeedCommand::Dismiss { id } => {
                if self.reply.dismiss(id) {
                    tracing::debug!(target: "actions", id, "notification dismissed");
                }
            }
            FeedCommand::Dump => self.dump(),
        }
    }

    /// Opens a row and emphasizes the suggested action. The backend is asked
    /// first; the row's label decides when it cannot answer.
    async fn open(&mut self, key: &str) {
        self.bar.clear();
        let Some(content) = self.inbox.open(key) else {
            tracing::warn!(target: "feed", key, "open for unknown row");
            return;
        };
        if content.body.trim().is_empty() {
            tracing::debug!(target: "actions", key, "skipping analysis, no message body");
            return;
        }

        let suggestion =
            tokio::time::timeout(self.suggest_timeout, self.backend.suggest_action(content)).await;
        let action = match suggestion {
            Ok(Ok(action)) => Some(action),
            Ok(Err(err)) => {
                tracing::debug!(target: "actions", key, error = %err, "action analysis failed");
                None
            }
            Err(_) => {
                tracing::debug!(target: "actions", key, "action analysis timed out");
                None
            }
        };
        let action = action.or_else(|| match self.inbox.marker_of(key)?.kind {
            MarkerKind::Labeled { label, suggestion } => {
                Some(suggestion.unwrap_or_else(|| label.default_action()))
            }
            MarkerKind::Pending => None,
        });

        if let Some(action) = action {
            self.bar.emphasize(action);
            tracing::info!(
                target: "actions",
                key,
                buttons = ?self.bar.captions(),
                "suggested action highlighted"
            );
        }
    }

    fn report_notifications(&mut self) {
        for notification in self.reply.notifications() {
            if notification.id > self.reported_notifications {
                tracing::warn!(
                    target: "actions",
                    id = notification.id,
                    raised_at = %notification.raised_at.to_rfc3339(),
                    message = %notification.message,
                    "notification shown"
                );
                self.reported_notifications = notification.id;
            }
        }
    }

    fn dump(&self) {
        for row in self.inbox.snapshot() {
            let marker = row
                .marker
                .map(|m| m.text())
                .unwrap_or_else(|| "-".to_string());
            tracing::info!(
                target: "feed",
                key = %row.key,
                node = %row.node,
                visible = row.visible,
                marker = %marker,
                "row"
            );
        }
    }
}
