use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{messages::MessageView, AppError, AppResult};

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    SendMessage { conversation_id: String, text: String },
    Typing { conversation_id: String, receiver_id: String },
    StopTyping { conversation_id: String, receiver_id: String },
    MarkAsRead { conversation_id: String },
    GetOnlineUsers,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StopTyping { .. } => "stop_typing",
            ClientEvent::MarkAsRead { .. } => "mark_as_read",
            ClientEvent::GetOnlineUsers => "get_online_users",
        }
    }
}

/// Server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    NewMessage(MessageView),
    MessageDelivered {
        conversation_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<Uuid>,
    },
    UserTyping { conversation_id: Uuid, user_id: Uuid },
    UserStopTyping { conversation_id: Uuid, user_id: Uuid },
    MessagesRead { conversation_id: Uuid, read_by: Uuid },
    UserOnline { user_id: Uuid },
    UserOffline { user_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct AckFrame {
    event: &'static str,
    pub ack: u64,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Event(ServerEvent),
    Ack(AckFrame),
}

impl Outbound {
    pub fn ack(ack: u64, data: Value) -> Outbound {
        Outbound::Ack(AckFrame { event: "ack", ack, data })
    }

    /// `{"success": true, ...extra}` or `{"success": false, "error": ...}`.
    pub fn ack_result(ack: u64, result: AppResult<Value>) -> Outbound {
        let data = match result {
            Ok(Value::Object(mut extra)) => {
                extra.insert("success".to_owned(), Value::Bool(true));
                Value::Object(extra)
            }
            Ok(_) => json!({ "success": true }),
            Err(e) => json!({ "success": false, "error": e.public_message() }),
        };
        Outbound::ack(ack, data)
    }

    pub fn to_text(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    ack: Option<u64>,
}

/// Splits a text frame into its acknowledgment id and event. The ack id is
/// recovered even when the event itself does not parse, so the failure can be
/// reported back to the caller.
pub fn parse_frame(text: &str) -> (Option<u64>, AppResult<ClientEvent>) {
    let raw: RawFrame = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => return (None, Err(AppError::invalid(format!("Malformed frame: {e}")))),
    };

    let tagged = match raw.data {
        Value::Null => json!({ "event": raw.event }),
        data => json!({ "event": raw.event, "data": data }),
    };

    let event = serde_json::from_value(tagged)
        .map_err(|e| AppError::invalid(format!("Invalid {} payload: {e}", raw.event)));

    (raw.ack, event)
}
