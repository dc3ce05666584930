use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db, AppResult};

use super::{Conversation, LastMessage, Participants, UnreadCounts};

const COLUMNS: &str =
    "id,participant_a,participant_b,last_text,last_sender_id,last_at,unread_a,unread_b,created_at,updated_at";

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    participant_a: String,
    participant_b: String,
    last_text: Option<String>,
    last_sender_id: Option<String>,
    last_at: Option<i64>,
    unread_a: i64,
    unread_b: i64,
    created_at: i64,
    updated_at: i64,
}

impl ConversationRow {
    fn into_conversation(self) -> AppResult<Conversation> {
        let last_message = match (self.last_text, self.last_sender_id, self.last_at) {
            (Some(text), Some(sender_id), Some(at)) => Some(LastMessage {
                text,
                sender_id: Uuid::parse_str(&sender_id)?,
                timestamp: db::from_millis(at)?,
            }),
            _ => None,
        };

        Ok(Conversation {
            id: Uuid::parse_str(&self.id)?,
            participants: Participants::new(
                Uuid::parse_str(&self.participant_a)?,
                Uuid::parse_str(&self.participant_b)?,
            )?,
            last_message,
            unread: UnreadCounts {
                first: self.unread_a.max(0) as u32,
                second: self.unread_b.max(0) as u32,
            },
            created_at: db::from_millis(self.created_at)?,
            updated_at: db::from_millis(self.updated_at)?,
        })
    }
}

/// Conversation records, including the last-message snapshot and both unread counters.
#[derive(Clone)]
pub struct ConversationStore {
    db_pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        sqlx::query_as::<_, ConversationRow>(&format!("SELECT {COLUMNS} FROM conversations WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .map(ConversationRow::into_conversation)
            .transpose()
    }

    pub async fn find_by_participants(&self, participants: &Participants) -> AppResult<Option<Conversation>> {
        sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {COLUMNS} FROM conversations WHERE participant_a=? AND participant_b=?"
        ))
        .bind(participants.first().to_string())
        .bind(participants.second().to_string())
        .fetch_optional(&self.db_pool)
        .await?
        .map(ConversationRow::into_conversation)
        .transpose()
    }

    /// Inserts the pair unless it already exists, then returns whichever row won.
    pub async fn create(&self, participants: &Participants) -> AppResult<Conversation> {
        let now = db::now_millis();
        sqlx::query(
            "INSERT INTO conversations (id,participant_a,participant_b,unread_a,unread_b,created_at,updated_at) \
             VALUES (?,?,?,0,0,?,?) ON CONFLICT (participant_a,participant_b) DO NOTHING",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(participants.first().to_string())
        .bind(participants.second().to_string())
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        self.find_by_participants(participants)
            .await?
            .ok_or_else(|| anyhow::anyhow!("conversation vanished right after insert").into())
    }

    /// Newest activity first.
    pub async fn list_for_user(&self, user_id: Uuid, limit: i64, offset: i64) -> AppResult<(Vec<Conversation>, i64)> {
        let user_id = user_id.to_string();

        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {COLUMNS} FROM conversations WHERE participant_a=? OR participant_b=? \
             ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(&user_id)
        .bind(&user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE participant_a=? OR participant_b=?")
                .bind(&user_id)
                .bind(&user_id)
                .fetch_one(&self.db_pool)
                .await?;

        let conversations = rows
            .into_iter()
            .map(ConversationRow::into_conversation)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((conversations, total))
    }

    pub async fn update_last_message(
        &self,
        id: Uuid,
        text: &str,
        sender_id: Uuid,
        at: OffsetDateTime,
    ) -> AppResult<bool> {
        let at = (at.unix_timestamp_nanos() / 1_000_000) as i64;
        let result = sqlx::query(
            "UPDATE conversations SET last_text=?, last_sender_id=?, last_at=?, updated_at=MAX(updated_at, ?) WHERE id=?",
        )
        .bind(text)
        .bind(sender_id.to_string())
        .bind(at)
        .bind(db::now_millis())
        .bind(id.to_string())
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Single-statement increment of the counter that belongs to `user_id`.
    pub async fn increment_unread(&self, id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let user_id = user_id.to_string();
        let result = sqlx::query(
            "UPDATE conversations SET \
                unread_a = unread_a + (participant_a = ?), \
                unread_b = unread_b + (participant_b = ?), \
                updated_at = MAX(updated_at, ?) \
             WHERE id=? AND (participant_a=? OR participant_b=?)",
        )
        .bind(&user_id)
        .bind(&user_id)
        .bind(db::now_millis())
        .bind(id.to_string())
        .bind(&user_id)
        .bind(&user_id)
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn reset_unread(&self, id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let user_id = user_id.to_string();
        let result = sqlx::query(
            "UPDATE conversations SET \
                unread_a = CASE WHEN participant_a=? THEN 0 ELSE unread_a END, \
                unread_b = CASE WHEN participant_b=? THEN 0 ELSE unread_b END, \
                updated_at = MAX(updated_at, ?) \
             WHERE id=? AND (participant_a=? OR participant_b=?)",
        )
        .bind(&user_id)
        .bind(&user_id)
        .bind(db::now_millis())
        .bind(id.to_string())
        .bind(&user_id)
        .bind(&user_id)
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes the conversation together with all of its messages.
    pub async fn delete_cascade(&self, id: Uuid) -> AppResult<u64> {
        let mut tx = self.db_pool.begin().await?;

        let messages = sqlx::query("DELETE FROM messages WHERE conversation_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM conversations WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(messages)
    }
}
