use std::sync::Arc;

use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::{
    auth::{parse_id, Identity, IdentityLookup},
    conversations::ConversationService,
    messages::{MessageService, MessageView},
    AppError, AppResult,
};

use super::{
    events::{parse_frame, ClientEvent, Outbound, ServerEvent},
    presence::{Announcement, Outbox, Presence},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Disconnected,
}

/// One socket's view of the gateway. Frames addressed to this connection
/// (acks, echoes) go through its own outbox, never through the presence map.
pub struct Connection {
    id: Uuid,
    state: ConnectionState,
    identity: Option<Identity>,
    outbox: Outbox,
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    fn push(&self, outbound: Outbound) {
        // receiver gone means the socket is closing
        let _ = self.outbox.send(outbound);
    }
}

#[derive(Clone)]
pub struct Gateway {
    presence: Presence,
    identity: Arc<dyn IdentityLookup>,
    conversations: ConversationService,
    messages: MessageService,
}

impl Gateway {
    pub fn new(
        presence: Presence,
        identity: Arc<dyn IdentityLookup>,
        conversations: ConversationService,
        messages: MessageService,
    ) -> Self {
        Self {
            presence,
            identity,
            conversations,
            messages,
        }
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn open(&self) -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let connection = Connection {
            id: Uuid::now_v7(),
            state: ConnectionState::Connecting,
            identity: None,
            outbox,
        };
        (connection, rx)
    }

    /// `Connecting -> Authenticated`. Any failure is terminal for the connection.
    pub async fn authenticate(&self, connection: &mut Connection, credential: Option<&str>) -> AppResult<Identity> {
        if connection.state != ConnectionState::Connecting {
            return Err(AppError::invalid("Connection already authenticated"));
        }

        let verified = match credential {
            Some(credential) => self.identity.verify(credential).await,
            None => Err(AppError::Unauthenticated("No token provided".to_owned())),
        };

        match verified {
            Ok(identity) => {
                connection.identity = Some(identity);
                connection.state = ConnectionState::Authenticated;
                Ok(identity)
            }
            Err(e) => {
                connection.state = ConnectionState::Disconnected;
                tracing::info!(connection_id = %connection.id, error = %e, "socket authentication failed");
                Err(match e {
                    AppError::Internal(_) => e,
                    other => AppError::Unauthenticated(other.public_message()),
                })
            }
        }
    }

    /// `Authenticated -> Active`: registers presence, announces the user and
    /// delivers whatever was waiting for them.
    pub async fn activate(&self, connection: &mut Connection) -> AppResult<broadcast::Receiver<Announcement>> {
        let Some(identity) = connection.identity.filter(|_| connection.state == ConnectionState::Authenticated) else {
            return Err(AppError::Unauthenticated("Connection is not authenticated".to_owned()));
        };
        let user_id = identity.user_id;

        let announcements = self.presence.subscribe();
        if let Some(previous) = self
            .presence
            .register(user_id, connection.id, connection.outbox.clone())
            .await
        {
            tracing::info!(%user_id, %previous, "replacing earlier session");
        }
        connection.state = ConnectionState::Active;
        tracing::info!(%user_id, connection_id = %connection.id, role = identity.role.as_str(), "user connected");

        self.presence.announce(connection.id, ServerEvent::UserOnline { user_id });

        match self.messages.deliver_pending(user_id).await {
            Ok(deliveries) => {
                for delivery in deliveries {
                    self.presence
                        .send_to(
                            delivery.sender_id,
                            ServerEvent::MessageDelivered {
                                conversation_id: delivery.conversation_id,
                                message_id: None,
                            },
                        )
                        .await;
                }
            }
            Err(e) => tracing::warn!(%user_id, error = %e, "could not deliver pending messages"),
        }

        Ok(announcements)
    }

    /// Parses and handles one text frame. Malformed frames are reported through
    /// the ack when one was supplied and otherwise only logged.
    pub async fn handle_frame(&self, connection: &Connection, text: &str) {
        match parse_frame(text) {
            (ack, Ok(event)) => self.handle(connection, ack, event).await,
            (ack, Err(e)) => {
                tracing::debug!(connection_id = %connection.id, error = %e, "ignoring frame");
                if let Some(ack) = ack {
                    connection.push(Outbound::ack_result(ack, Err(e)));
                }
            }
        }
    }

    pub async fn handle(&self, connection: &Connection, ack: Option<u64>, event: ClientEvent) {
        let Some(user_id) = connection
            .identity
            .filter(|_| connection.state == ConnectionState::Active)
            .map(|identity| identity.user_id)
        else {
            tracing::warn!(connection_id = %connection.id, event = event.name(), "event on inactive connection");
            return;
        };

        let name = event.name();
        let result = match event {
            ClientEvent::SendMessage { conversation_id, text } => self
                .send_message(connection, user_id, &conversation_id, &text)
                .await
                .map(|message| json!({ "message": message })),
            ClientEvent::Typing { conversation_id, receiver_id } => {
                self.relay_typing(user_id, &conversation_id, &receiver_id, true).await;
                return;
            }
            ClientEvent::StopTyping { conversation_id, receiver_id } => {
                self.relay_typing(user_id, &conversation_id, &receiver_id, false).await;
                return;
            }
            ClientEvent::MarkAsRead { conversation_id } => self
                .mark_as_read(user_id, &conversation_id)
                .await
                .map(|count| json!({ "count": count })),
            ClientEvent::GetOnlineUsers => {
                if let Some(ack) = ack {
                    let users = self.presence.online_users().await;
                    connection.push(Outbound::ack(ack, json!(users)));
                }
                return;
            }
        };

        if let Err(e) = &result {
            tracing::warn!(%user_id, event = name, error = %e, "socket event failed");
        }
        if let Some(ack) = ack {
            connection.push(Outbound::ack_result(ack, result));
        }
    }

    async fn send_message(
        &self,
        connection: &Connection,
        sender_id: Uuid,
        conversation_id: &str,
        text: &str,
    ) -> AppResult<MessageView> {
        let conversation_id = parse_id(conversation_id, "conversation")?;
        let message = self.messages.send(sender_id, conversation_id, text).await?;
        let receiver_id = message.receiver.id;

        if self
            .presence
            .send_to(receiver_id, ServerEvent::NewMessage(message.clone()))
            .await
        {
            // the message is stored; a failed status update must not turn the send into an error
            match self.messages.mark_delivered(conversation_id, receiver_id).await {
                Ok(_) => connection.push(Outbound::Event(ServerEvent::MessageDelivered {
                    conversation_id,
                    message_id: Some(message.id),
                })),
                Err(e) => tracing::warn!(%conversation_id, error = %e, "could not mark message delivered"),
            }
        }

        Ok(message)
    }

    async fn relay_typing(&self, user_id: Uuid, conversation_id: &str, receiver_id: &str, typing: bool) {
        let (Ok(conversation_id), Ok(receiver_id)) = (
            parse_id(conversation_id, "conversation"),
            parse_id(receiver_id, "receiver"),
        ) else {
            tracing::debug!(%user_id, "dropping typing event with malformed ids");
            return;
        };

        let event = if typing {
            ServerEvent::UserTyping { conversation_id, user_id }
        } else {
            ServerEvent::UserStopTyping { conversation_id, user_id }
        };
        self.presence.send_to(receiver_id, event).await;
    }

    async fn mark_as_read(&self, user_id: Uuid, conversation_id: &str) -> AppResult<u64> {
        let conversation_id = parse_id(conversation_id, "conversation")?;
        let count = self.messages.mark_read(conversation_id, user_id).await?;

        let conversation = self.conversations.fetch_authorized(conversation_id, user_id).await?;
        if let Some(other_id) = conversation.participants.other(user_id) {
            self.presence
                .send_to(
                    other_id,
                    ServerEvent::MessagesRead {
                        conversation_id,
                        read_by: user_id,
                    },
                )
                .await;
        }

        Ok(count)
    }

    /// Terminal. Removes the user from presence unless a newer connection took over.
    pub async fn disconnect(&self, connection: &mut Connection) {
        let was_active = connection.state == ConnectionState::Active;
        connection.state = ConnectionState::Disconnected;

        let Some(identity) = connection.identity.filter(|_| was_active) else {
            return;
        };

        if self.presence.unregister(identity.user_id, connection.id).await {
            self.presence
                .announce(connection.id, ServerEvent::UserOffline { user_id: identity.user_id });
        }
        tracing::info!(user_id = %identity.user_id, connection_id = %connection.id, "user disconnected");
    }
}
