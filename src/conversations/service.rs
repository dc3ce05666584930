use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{profile_or_unknown, ProfileLookup},
    paging::Paging,
    AppError, AppResult,
};

use super::{Conversation, ConversationPage, ConversationStore, ConversationView, Participants};

#[derive(Clone)]
pub struct ConversationService {
    store: ConversationStore,
    profiles: Arc<dyn ProfileLookup>,
}

impl ConversationService {
    pub fn new(store: ConversationStore, profiles: Arc<dyn ProfileLookup>) -> Self {
        Self { store, profiles }
    }

    /// Finds the conversation between two users, creating it on first contact.
    pub async fn create_or_get(&self, user_id: Uuid, other_user_id: Uuid) -> AppResult<Conversation> {
        let participants = Participants::new(user_id, other_user_id)?;

        if let Some(existing) = self.store.find_by_participants(&participants).await? {
            return Ok(existing);
        }

        let conversation = self.store.create(&participants).await?;
        tracing::info!(conversation_id = %conversation.id, "conversation created");
        Ok(conversation)
    }

    /// Loads a conversation and checks that `user_id` is one of its participants.
    pub async fn fetch_authorized(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let Some(conversation) = self.store.find_by_id(conversation_id).await? else {
            return Err(AppError::NotFound("Conversation"));
        };

        if !conversation.participants.contains(user_id) {
            return Err(AppError::Forbidden);
        }

        Ok(conversation)
    }

    pub async fn get_by_id(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<ConversationView> {
        let conversation = self.fetch_authorized(conversation_id, user_id).await?;
        self.view(conversation, user_id).await
    }

    pub async fn list_for_user(&self, user_id: Uuid, paging: Paging) -> AppResult<ConversationPage> {
        let (conversations, total) = self
            .store
            .list_for_user(user_id, paging.limit(), paging.offset())
            .await?;

        let mut views = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            views.push(self.view(conversation, user_id).await?);
        }

        Ok(ConversationPage {
            conversations: views,
            meta: paging.meta(total),
        })
    }

    pub async fn delete(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.fetch_authorized(conversation_id, user_id).await?;
        let messages = self.store.delete_cascade(conversation_id).await?;
        tracing::info!(%conversation_id, %user_id, messages, "conversation deleted");
        Ok(())
    }

    pub async fn reset_unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.fetch_authorized(conversation_id, user_id).await?;
        self.store.reset_unread(conversation_id, user_id).await?;
        Ok(())
    }

    pub(crate) async fn increment_unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if !self.store.increment_unread(conversation_id, user_id).await? {
            return Err(AppError::NotFound("Conversation"));
        }
        Ok(())
    }

    pub(crate) async fn touch_last_message(
        &self,
        conversation_id: Uuid,
        text: &str,
        sender_id: Uuid,
        at: OffsetDateTime,
    ) -> AppResult<()> {
        if !self.store.update_last_message(conversation_id, text, sender_id, at).await? {
            return Err(AppError::NotFound("Conversation"));
        }
        Ok(())
    }

    pub async fn view(&self, conversation: Conversation, user_id: Uuid) -> AppResult<ConversationView> {
        let other_id = conversation
            .participants
            .other(user_id)
            .ok_or(AppError::Forbidden)?;

        Ok(ConversationView {
            id: conversation.id,
            other_user: profile_or_unknown(self.profiles.as_ref(), other_id).await?,
            unread_count: conversation.unread_for(user_id),
            last_message: conversation.last_message,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        })
    }
}
