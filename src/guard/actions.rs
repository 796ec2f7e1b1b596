//! Sanction actions against the chat platform.
//!
//! The platform client is a collaborator, not part of this crate: the
//! [`ChatActions`] trait is the capability the embedding bot injects.
//! Every action is best-effort: a failure becomes a
//! [`ActionStatus::Failed`] outcome and never blocks the remaining actions.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A single chat-platform call failed. The reason is recorded, not retried.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ActionError(pub String);

/// The sanction actions a configuration can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Delete,
    Warn,
    Timeout,
    Kick,
    Ban,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::Delete => "delete",
            ActionKind::Warn => "warn",
            ActionKind::Timeout => "timeout",
            ActionKind::Kick => "kick",
            ActionKind::Ban => "ban",
        };
        f.write_str(name)
    }
}

/// What happened to one configured action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStatus {
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn applied(kind: ActionKind) -> Self {
        Self {
            kind,
            status: ActionStatus::Applied,
        }
    }

    pub fn failed(kind: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            status: ActionStatus::Failed(reason.into()),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status == ActionStatus::Applied
    }
}

/// Moderation capability of the chat platform.
///
/// Implementations are expected to carry their own transport timeouts; the
/// pipeline does not wrap calls in deadlines of its own.
#[async_trait]
pub trait ChatActions: Send + Sync {
    async fn delete_message(&self, channel_id: &str, message_id: &str)
        -> Result<(), ActionError>;

    /// Direct-message a warning to the member.
    async fn warn_member(&self, user_id: &str, text: &str) -> Result<(), ActionError>;

    async fn timeout_member(
        &self,
        community_id: &str,
        user_id: &str,
        duration: Duration,
        reason: &str,
    ) -> Result<(), ActionError>;

    async fn kick_member(
        &self,
        community_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), ActionError>;

    async fn ban_member(
        &self,
        community_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), ActionError>;

    /// Post a formatted enforcement notice to a logging channel.
    async fn post_notice(&self, channel_id: &str, text: &str) -> Result<(), ActionError>;
}
