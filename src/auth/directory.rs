use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult};

use super::{Identity, IdentityLookup, ProfileLookup, Role, UserProfile};

/// Profiles and credentials kept in the same database as the messages.
#[derive(Clone)]
pub struct Directory {
    db_pool: SqlitePool,
}

impl Directory {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Provisions a profile and a credential for it.
    pub async fn register(&self, profile: &UserProfile, token: &str, role: Role) -> AppResult<()> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query("INSERT OR REPLACE INTO profiles (id,first_name,last_name,email,image_url) VALUES (?,?,?,?,?)")
            .bind(profile.id.to_string())
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.email)
            .bind(&profile.image_url)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR REPLACE INTO credentials (token,user_id,role) VALUES (?,?,?)")
            .bind(token)
            .bind(profile.id.to_string())
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(user_id = %profile.id, role = role.as_str(), "registered user");
        Ok(())
    }
}

#[async_trait]
impl IdentityLookup for Directory {
    async fn verify(&self, credential: &str) -> AppResult<Identity> {
        let Some((user_id, role)): Option<(String, String)> =
            sqlx::query_as("SELECT user_id,role FROM credentials WHERE token=?")
                .bind(credential)
                .fetch_optional(&self.db_pool)
                .await?
        else {
            return Err(AppError::Unauthenticated("Invalid token".to_owned()));
        };

        let role = Role::parse(&role).ok_or_else(|| anyhow::anyhow!("unknown role {role} for {user_id}"))?;

        Ok(Identity {
            user_id: Uuid::parse_str(&user_id)?,
            role,
        })
    }
}

#[async_trait]
impl ProfileLookup for Directory {
    async fn profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row: Option<(String, String, String, Option<String>)> =
            sqlx::query_as("SELECT first_name,last_name,email,image_url FROM profiles WHERE id=?")
                .bind(user_id.to_string())
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(row.map(|(first_name, last_name, email, image_url)| UserProfile {
            id: user_id,
            first_name,
            last_name,
            email,
            image_url,
        }))
    }
}
