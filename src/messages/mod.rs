mod routes;
mod service;
mod store;

use axum::{routing::{delete, get, patch, post}, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::UserProfile, paging::PageMeta, AppError, AppResult, AppState};

pub use service::{Delivery, MessageService};
pub use store::MessageStore;

pub const MAX_TEXT_CHARS: usize = 1000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(routes::send))
        .route("/{id}", delete(routes::delete))
        .route("/conversation/{conversation_id}", get(routes::list))
        .route("/conversation/{conversation_id}/read", patch(routes::mark_read))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
        }
    }

    pub fn parse(raw: &str) -> Option<MessageKind> {
        match raw {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "file" => Some(MessageKind::File),
            _ => None,
        }
    }
}

/// Delivery lifecycle. Variants are ordered; a message only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 3] = [MessageStatus::Sent, MessageStatus::Delivered, MessageStatus::Read];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }

    pub fn parse(raw: &str) -> Option<MessageStatus> {
        match raw {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            _ => None,
        }
    }

    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        next > *self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A message with sender and receiver profiles filled in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: UserProfile,
    pub receiver: UserProfile,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub status: MessageStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

pub fn validate_text(text: &str) -> AppResult<()> {
    if text.is_empty() {
        return Err(AppError::invalid("Message text is required"));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(AppError::invalid("Message too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        use MessageStatus::*;
        assert!(Sent.can_advance_to(Delivered));
        assert!(Sent.can_advance_to(Read));
        assert!(Delivered.can_advance_to(Read));
        assert!(!Read.can_advance_to(Delivered));
        assert!(!Delivered.can_advance_to(Sent));
        assert!(!Read.can_advance_to(Read));
    }

    #[test]
    fn text_bounds() {
        assert!(validate_text("").is_err());
        assert!(validate_text("hi").is_ok());
        assert!(validate_text(&"é".repeat(MAX_TEXT_CHARS)).is_ok());
        assert!(validate_text(&"x".repeat(MAX_TEXT_CHARS + 1)).is_err());
    }

    #[test]
    fn kinds_and_statuses_parse_their_names() {
        for kind in [MessageKind::Text, MessageKind::Image, MessageKind::File] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        for status in [MessageStatus::Sent, MessageStatus::Delivered, MessageStatus::Read] {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MessageStatus::parse("lost"), None);
    }
}
