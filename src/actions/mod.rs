//! Explicit user actions on the opened message.

pub mod bar;
pub mod reply;

use thiserror::Error;

pub use bar::ActionBar;
pub use reply::ReplyFlow;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("no message is open")]
    NoOpenMessage,
}

/// Operations the host mail client performs on the opened message.
pub trait MailActions: Send + Sync {
    fn archive(&self) -> Result<(), ActionError>;

    fn forward(&self) -> Result<(), ActionError>;

    fn compose_reply(&self, text: &str) -> Result<(), ActionError>;
}
