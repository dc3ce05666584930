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

use super::ConversationService;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateConversationBody {
    other_user_id: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_or_get(
    AuthUser(identity): AuthUser,
    State(conversations): State<ConversationService>,
    body: Result<Json<CreateConversationBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(CreateConversationBody { other_user_id }) = body?;
    let Some(other_user_id) = other_user_id.filter(|id| !id.is_empty()) else {
        return Err(AppError::invalid("Other user ID is required"));
    };
    let other_user_id = parse_id(&other_user_id, "user")?;

    let conversation = conversations.create_or_get(identity.user_id, other_user_id).await?;
    let view = conversations.view(conversation, identity.user_id).await?;

    Ok(res::ok(StatusCode::OK, "Conversation retrieved successfully", view))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    AuthUser(identity): AuthUser,
    State(conversations): State<ConversationService>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let paging = Paging::from_query(&query, DEFAULT_PAGE_SIZE);
    let page = conversations.list_for_user(identity.user_id, paging).await?;

    Ok(res::ok(StatusCode::OK, "Conversations retrieved successfully", page))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_one(
    AuthUser(identity): AuthUser,
    State(conversations): State<ConversationService>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id, "conversation")?;
    let view = conversations.get_by_id(id, identity.user_id).await?;

    Ok(res::ok(StatusCode::OK, "Conversation retrieved successfully", view))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    AuthUser(identity): AuthUser,
    State(conversations): State<ConversationService>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id, "conversation")?;
    conversations.delete(id, identity.user_id).await?;

    Ok(res::done("Conversation deleted successfully"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn reset_unread(
    AuthUser(identity): AuthUser,
    State(conversations): State<ConversationService>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id, "conversation")?;
    conversations.reset_unread_count(id, identity.user_id).await?;

    Ok(res::done("Unread count reset successfully"))
}
