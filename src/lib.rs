pub mod auth;
pub mod config;
pub mod conversations;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod messages;
pub mod paging;
pub mod res;

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, routing::get, Router};
use sqlx::SqlitePool;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use auth::{Directory, IdentityLookup, ProfileLookup};
use conversations::{ConversationService, ConversationStore};
use gateway::{Gateway, Presence};
use messages::{MessageService, MessageStore};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub identity: Arc<dyn IdentityLookup>,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub gateway: Gateway,
}

impl AppState {
    /// Wires every service over one pool, with the SQLite directory standing in
    /// for the identity and profile collaborators.
    pub fn new(db_pool: SqlitePool) -> Self {
        let directory = Arc::new(Directory::new(db_pool.clone()));
        Self::with_collaborators(db_pool, directory.clone(), directory)
    }

    pub fn with_collaborators(
        db_pool: SqlitePool,
        identity: Arc<dyn IdentityLookup>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        let conversations = ConversationService::new(ConversationStore::new(db_pool.clone()), profiles.clone());
        let messages = MessageService::new(MessageStore::new(db_pool.clone()), conversations.clone(), profiles);
        let gateway = Gateway::new(
            Presence::new(),
            identity.clone(),
            conversations.clone(),
            messages.clone(),
        );

        AppState {
            identity,
            conversations,
            messages,
            gateway,
        }
    }
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(res::ready))
        .nest("/conversations", conversations::router())
        .nest("/messages", messages::router())
        .merge(gateway::router())
        .fallback(res::not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Access denied")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to hand back to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal Server Error".to_owned(),
            e => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            tracing::error!(error = ?e, "request failed");
        }
        res::fail(self.status_code(), self.public_message())
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::InvalidArgument(format!("Validation failed: {}", rejection.body_text()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(anyhow::Error);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(axum::Error);
apperr_impl!(uuid::Error);
apperr_impl!(time::error::ComponentRange);
