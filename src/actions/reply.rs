use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{ai::GenerativeBackend, domain::MessageContent};

use super::MailActions;

/// State of the reply button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Generating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Drafts a reply through the backend and hands it to the host composer.
///
/// Failures never escape: they become a dismissable [`Notification`] and the
/// control goes back to [`ControlState::Idle`].
pub struct ReplyFlow {
    backend: Arc<dyn GenerativeBackend>,
    actions: Arc<dyn MailActions>,
    timeout: Duration,
    control: ControlState,
    notifications: Vec<Notification>,
    next_notification: u64,
}

impl ReplyFlow {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        actions: Arc<dyn MailActions>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            actions,
            timeout,
            control: ControlState::Idle,
            notifications: Vec::new(),
            next_notification: 0,
        }
    }

    #[cfg(test)]
    pub fn control(&self) -> ControlState {
        self.control
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        self.notifications.len() != before
    }

    /// Returns `true` when a draft was placed in the composer.
    pub async fn run(&mut self, content: Option<MessageContent>) -> bool {
        let Some(content) = content.filter(|c| !c.body.trim().is_empty()) else {
            self.notify("Could not extract email content");
            return false;
        };

        self.control = ControlState::Generating;
        let outcome = self.draft_and_compose(content).await;
        self.control = ControlState::Idle;

        match outcome {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(target: "actions", error = %err, "reply generation failed");
                self.notify("Failed to generate reply. Please try again.");
                false
            }
        }
    }

    async fn draft_and_compose(&self, content: MessageContent) -> anyhow::Result<()> {
        let text = tokio::time::timeout(self.timeout, self.backend.draft_reply(content))
            .await
            .map_err(|_| anyhow::anyhow!("reply generation exceeded {:?}", self.timeout))??;
        self.actions.compose_reply(&text)?;
        Ok(())
    }

    fn notify(&mut self, message: &str) {
        self.next_notification += 1;
        self.notifications.push(Notification {
            id: self.next_notification,
            message: message.to_string(),
            raised_at: Utc::now(),
        });
    }
}
