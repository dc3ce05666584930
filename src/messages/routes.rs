use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Deserialize;

use crate::{
    auth::{parse_id, AuthUser},
    paging::{PageQuery, Paging},
    res, AppError, AppResult, AppState,
};

use super::MessageService;

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageBody {
    conversation_id: Option<String>,
    text: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn send(
    AuthUser(identity): AuthUser,
    State(messages): State<MessageService>,
    body: Result<Json<SendMessageBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(SendMessageBody { conversation_id, text }) = body?;

    let Some(conversation_id) = conversation_id.filter(|id| !id.is_empty()) else {
        return Err(AppError::invalid("Conversation ID is required"));
    };
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let text = text.unwrap_or_default();

    let message = messages.send(identity.user_id, conversation_id, &text).await?;

    Ok(res::ok(StatusCode::CREATED, "Message sent successfully", message))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    AuthUser(identity): AuthUser,
    State(messages): State<MessageService>,
    Path(conversation_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let paging = Paging::from_query(&query, DEFAULT_PAGE_SIZE);

    let page = messages.list(conversation_id, identity.user_id, paging).await?;

    Ok(res::ok(StatusCode::OK, "Messages retrieved successfully", page))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    AuthUser(identity): AuthUser,
    State(messages): State<MessageService>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id, "message")?;
    messages.delete(id, identity.user_id).await?;

    Ok(res::done("Message deleted successfully"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn mark_read(
    AuthUser(identity): AuthUser,
    State(messages): State<MessageService>,
    Path(conversation_id): Path<String>,
) -> AppResult<Response> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    messages.mark_read(conversation_id, identity.user_id).await?;

    Ok(res::done("Messages marked as read"))
}
