mod directory;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, AppResult};

pub use directory::Directory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Seller,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "user" => Some(Role::User),
            "seller" => Some(Role::Seller),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

/// A verified caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

/// Public display fields of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub image_url: Option<String>,
}

impl UserProfile {
    pub fn unknown(id: Uuid) -> UserProfile {
        UserProfile {
            id,
            first_name: "Unknown".to_owned(),
            last_name: "User".to_owned(),
            email: String::new(),
            image_url: None,
        }
    }
}

/// Turns a credential into a verified identity.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn verify(&self, credential: &str) -> AppResult<Identity>;
}

/// Read-only profile directory.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;
}

pub(crate) async fn profile_or_unknown(profiles: &dyn ProfileLookup, user_id: Uuid) -> AppResult<UserProfile> {
    Ok(profiles.profile(user_id).await?.unwrap_or_else(|| UserProfile::unknown(user_id)))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn parse_id(raw: &str, what: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::invalid(format!("Invalid {what} ID")))
}

/// Extracts the caller from `Authorization: Bearer <token>`.
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<dyn IdentityLookup>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Err(AppError::Unauthenticated("Unauthorized".to_owned()));
        };

        let identity = <Arc<dyn IdentityLookup> as FromRef<S>>::from_ref(state);
        Ok(AuthUser(identity.verify(token).await?))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(bearer_token(&headers), Some("tok-1"));
    }

    #[test]
    fn malformed_ids_are_invalid_arguments() {
        assert!(matches!(parse_id("nope", "conversation"), Err(AppError::InvalidArgument(_))));
        assert!(parse_id(&Uuid::now_v7().to_string(), "conversation").is_ok());
    }

    #[test]
    fn roles_round_trip_through_their_names() {
        for role in [Role::User, Role::Seller, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }
}
