use std::sync::Arc;

use uuid::Uuid;

use crate::{
    auth::{profile_or_unknown, ProfileLookup},
    conversations::ConversationService,
    paging::Paging,
    AppError, AppResult,
};

use super::{validate_text, Message, MessageKind, MessagePage, MessageStore, MessageView};

/// Messages to one receiver that were just moved from `sent` to `delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub count: u64,
}

#[derive(Clone)]
pub struct MessageService {
    store: MessageStore,
    conversations: ConversationService,
    profiles: Arc<dyn ProfileLookup>,
}

impl MessageService {
    pub fn new(store: MessageStore, conversations: ConversationService, profiles: Arc<dyn ProfileLookup>) -> Self {
        Self {
            store,
            conversations,
            profiles,
        }
    }

    /// Stores the message, then refreshes the conversation snapshot and the
    /// receiver's unread counter. The second step is not transactional with the
    /// first: once the message row exists the send counts as successful.
    pub async fn send(&self, sender_id: Uuid, conversation_id: Uuid, text: &str) -> AppResult<MessageView> {
        validate_text(text)?;

        let conversation = self.conversations.fetch_authorized(conversation_id, sender_id).await?;
        let receiver_id = conversation
            .participants
            .other(sender_id)
            .ok_or_else(|| AppError::invalid("Receiver not found"))?;

        let message = self
            .store
            .insert(conversation_id, sender_id, receiver_id, text, MessageKind::Text)
            .await?;

        if let Err(e) = self.refresh_conversation(&message).await {
            tracing::warn!(
                %conversation_id,
                message_id = %message.id,
                error = %e,
                "message stored but conversation metadata is stale"
            );
        }

        self.view(message).await
    }

    async fn refresh_conversation(&self, message: &Message) -> AppResult<()> {
        self.conversations
            .touch_last_message(message.conversation_id, &message.text, message.sender_id, message.created_at)
            .await?;
        self.conversations
            .increment_unread_count(message.conversation_id, message.receiver_id)
            .await
    }

    /// Returns one page of the conversation. Reading any page acknowledges the
    /// whole conversation for `user_id`.
    ///
    /// The page is read before that acknowledgement, so messages addressed to
    /// the caller still show the status they had when the request arrived.
    pub async fn list(&self, conversation_id: Uuid, user_id: Uuid, paging: Paging) -> AppResult<MessagePage> {
        self.conversations.fetch_authorized(conversation_id, user_id).await?;

        let (messages, total) = self
            .store
            .list_by_conversation(conversation_id, paging.limit(), paging.offset())
            .await?;

        self.store.mark_read(conversation_id, user_id).await?;
        self.conversations.reset_unread_count(conversation_id, user_id).await?;

        let mut views = Vec::with_capacity(messages.len());
        for message in messages {
            views.push(self.view(message).await?);
        }

        Ok(MessagePage {
            messages: views,
            meta: paging.meta(total),
        })
    }

    pub async fn mark_delivered(&self, conversation_id: Uuid, receiver_id: Uuid) -> AppResult<u64> {
        let count = self.store.mark_delivered(conversation_id, receiver_id).await?;
        tracing::debug!(%conversation_id, %receiver_id, count, "messages delivered");
        Ok(count)
    }

    /// Marks everything addressed to `receiver_id` as read and zeroes their counter.
    /// Returns how many messages changed; a repeat call returns zero.
    pub async fn mark_read(&self, conversation_id: Uuid, receiver_id: Uuid) -> AppResult<u64> {
        self.conversations.fetch_authorized(conversation_id, receiver_id).await?;

        let count = self.store.mark_read(conversation_id, receiver_id).await?;
        self.conversations.reset_unread_count(conversation_id, receiver_id).await?;
        tracing::debug!(%conversation_id, %receiver_id, count, "messages read");
        Ok(count)
    }

    /// Delivers everything still waiting for `receiver_id`, grouped per conversation and sender.
    pub async fn deliver_pending(&self, receiver_id: Uuid) -> AppResult<Vec<Delivery>> {
        let mut deliveries = Vec::new();
        for (conversation_id, sender_id) in self.store.pending_for_receiver(receiver_id).await? {
            let count = self.mark_delivered(conversation_id, receiver_id).await?;
            if count > 0 {
                deliveries.push(Delivery {
                    conversation_id,
                    sender_id,
                    count,
                });
            }
        }
        Ok(deliveries)
    }

    /// Only the sender may delete a message.
    pub async fn delete(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let Some(message) = self.store.find_by_id(message_id).await? else {
            return Err(AppError::NotFound("Message"));
        };

        if message.sender_id != user_id {
            return Err(AppError::Forbidden);
        }

        self.store.delete(message_id).await?;
        tracing::info!(%message_id, conversation_id = %message.conversation_id, "message deleted");
        Ok(())
    }

    pub async fn view(&self, message: Message) -> AppResult<MessageView> {
        Ok(MessageView {
            id: message.id,
            conversation_id: message.conversation_id,
            sender: profile_or_unknown(self.profiles.as_ref(), message.sender_id).await?,
            receiver: profile_or_unknown(self.profiles.as_ref(), message.receiver_id).await?,
            text: message.text,
            kind: message.kind,
            status: message.status,
            created_at: message.created_at,
            updated_at: message.updated_at,
        })
    }
}
