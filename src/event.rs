//! Domain events reported by the moderation front end.
//!
//! Events arrive over HTTP as an [`IngestEvent`] and are classified into a
//! [`ModEvent`] before folding into the stats document. Events are never
//! stored individually; only their aggregate effect persists.
//!
//! # Wire format
//!
//! ```json
//! { "communityId": "123", "kind": "links", "subjectId": "456" }
//! { "communityId": "123", "action": "open" }
//! ```
//!
//! Older bot builds send `guildId`, `type` and `userId`; those aliases are
//! still accepted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an incoming event could not be classified.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("communityId is required")]
    MissingCommunity,

    #[error("event needs either a violation kind or a ticket action")]
    MissingKind,

    #[error("unknown ticket action '{0}'")]
    UnknownAction(String),
}

/// An event as posted to `POST /event`.
///
/// All fields are optional at the wire level so that validation can answer
/// with a proper 400 instead of a deserializer rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEvent {
    #[serde(alias = "guildId", skip_serializing_if = "Option::is_none")]
    pub community_id: Option<String>,

    /// Violation label (e.g. "links", "caps").
    #[serde(alias = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Ticket action ("open" or "close").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// The member the event concerns, when there is one.
    #[serde(alias = "userId", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

impl IngestEvent {
    /// Validate and classify into a [`ModEvent`].
    ///
    /// A ticket `action` takes precedence over a violation `kind` when both
    /// are present; an event carrying neither is malformed.
    pub fn classify(&self) -> Result<ModEvent, EventError> {
        let community_id = self
            .community_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(EventError::MissingCommunity)?
            .to_string();

        let kind = if let Some(action) = &self.action {
            match action.as_str() {
                "open" => ModEventKind::Ticket(TicketAction::Open),
                "close" => ModEventKind::Ticket(TicketAction::Close),
                other => return Err(EventError::UnknownAction(other.to_string())),
            }
        } else if let Some(label) = self.kind.as_deref().filter(|k| !k.is_empty()) {
            ModEventKind::Violation {
                label: label.to_string(),
            }
        } else {
            return Err(EventError::MissingKind);
        };

        Ok(ModEvent {
            community_id,
            kind,
            subject_id: self.subject_id.clone(),
        })
    }
}

/// A classified, validated event ready to fold.
#[derive(Debug, Clone, PartialEq)]
pub struct ModEvent {
    pub community_id: String,
    pub kind: ModEventKind,
    pub subject_id: Option<String>,
}

impl ModEvent {
    /// A rule-violation event.
    pub fn violation(
        community_id: impl Into<String>,
        label: impl Into<String>,
        subject_id: Option<String>,
    ) -> Self {
        Self {
            community_id: community_id.into(),
            kind: ModEventKind::Violation {
                label: label.into(),
            },
            subject_id,
        }
    }

    /// A ticket lifecycle event.
    pub fn ticket(community_id: impl Into<String>, action: TicketAction) -> Self {
        Self {
            community_id: community_id.into(),
            kind: ModEventKind::Ticket(action),
            subject_id: None,
        }
    }

    /// Back to the wire shape, for reporting over HTTP.
    pub fn to_wire(&self) -> IngestEvent {
        let mut wire = IngestEvent {
            community_id: Some(self.community_id.clone()),
            subject_id: self.subject_id.clone(),
            ..IngestEvent::default()
        };
        match &self.kind {
            ModEventKind::Violation { label } => wire.kind = Some(label.clone()),
            ModEventKind::Ticket(action) => wire.action = Some(action.as_str().to_string()),
        }
        wire
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModEventKind {
    Violation { label: String },
    Ticket(TicketAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketAction {
    Open,
    Close,
}

impl TicketAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketAction::Open => "open",
            TicketAction::Close => "close",
        }
    }
}
