mod routes;
mod service;
mod store;

use axum::{routing::{get, patch}, Router};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::UserProfile, paging::PageMeta, AppError, AppResult, AppState};

pub use service::ConversationService;
pub use store::ConversationStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::list).post(routes::create_or_get))
        .route("/{id}", get(routes::get_one).delete(routes::delete))
        .route("/{id}/read", patch(routes::reset_unread))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

/// The two distinct members of a conversation, kept in sorted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Participants {
    first: Uuid,
    second: Uuid,
}

impl Participants {
    pub fn new(a: Uuid, b: Uuid) -> AppResult<Participants> {
        if a == b {
            return Err(AppError::invalid("Cannot create conversation with yourself"));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        Ok(Participants { first, second })
    }

    pub fn first(&self) -> Uuid {
        self.first
    }

    pub fn second(&self) -> Uuid {
        self.second
    }

    pub fn slot(&self, user_id: Uuid) -> Option<Slot> {
        if user_id == self.first {
            Some(Slot::First)
        } else if user_id == self.second {
            Some(Slot::Second)
        } else {
            None
        }
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.slot(user_id).is_some()
    }

    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        match self.slot(user_id)? {
            Slot::First => Some(self.second),
            Slot::Second => Some(self.first),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnreadCounts {
    pub first: u32,
    pub second: u32,
}

impl UnreadCounts {
    pub fn get(&self, slot: Slot) -> u32 {
        match slot {
            Slot::First => self.first,
            Slot::Second => self.second,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Participants,
    pub last_message: Option<LastMessage>,
    pub unread: UnreadCounts,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    /// Unread count of `user_id`, zero for outsiders.
    pub fn unread_for(&self, user_id: Uuid) -> u32 {
        self.participants
            .slot(user_id)
            .map(|slot| self.unread.get(slot))
            .unwrap_or(0)
    }
}

/// A conversation as seen by one of its participants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub other_user: UserProfile,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPage {
    pub conversations: Vec<ConversationView>,
    #[serde(flatten)]
    pub meta: PageMeta,
}
