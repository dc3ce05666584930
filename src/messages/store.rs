use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db, AppResult};

use super::{Message, MessageKind, MessageStatus};

const COLUMNS: &str = "id,conversation_id,sender_id,receiver_id,text,kind,status,created_at,updated_at";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    receiver_id: String,
    text: String,
    kind: String,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl MessageRow {
    fn into_message(self) -> AppResult<Message> {
        Ok(Message {
            id: Uuid::parse_str(&self.id)?,
            conversation_id: Uuid::parse_str(&self.conversation_id)?,
            sender_id: Uuid::parse_str(&self.sender_id)?,
            receiver_id: Uuid::parse_str(&self.receiver_id)?,
            text: self.text,
            kind: MessageKind::parse(&self.kind)
                .ok_or_else(|| anyhow::anyhow!("unknown message kind {}", self.kind))?,
            status: MessageStatus::parse(&self.status)
                .ok_or_else(|| anyhow::anyhow!("unknown message status {}", self.status))?,
            created_at: db::from_millis(self.created_at)?,
            updated_at: db::from_millis(self.updated_at)?,
        })
    }
}

#[derive(Clone)]
pub struct MessageStore {
    db_pool: SqlitePool,
}

impl MessageStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn insert(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: &str,
        kind: MessageKind,
    ) -> AppResult<Message> {
        let id = Uuid::now_v7();
        let now = db::now_millis();

        sqlx::query(
            "INSERT INTO messages (id,conversation_id,sender_id,receiver_id,text,kind,status,created_at,updated_at) \
             VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(conversation_id.to_string())
        .bind(sender_id.to_string())
        .bind(receiver_id.to_string())
        .bind(text)
        .bind(kind.as_str())
        .bind(MessageStatus::Sent.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            receiver_id,
            text: text.to_owned(),
            kind,
            status: MessageStatus::Sent,
            created_at: db::from_millis(now)?,
            updated_at: db::from_millis(now)?,
        })
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Message>> {
        sqlx::query_as::<_, MessageRow>(&format!("SELECT {COLUMNS} FROM messages WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .map(MessageRow::into_message)
            .transpose()
    }

    /// Page 1 is the newest `limit` messages; each page comes back oldest first.
    pub async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Message>, i64)> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM messages WHERE conversation_id=? \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(conversation_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE conversation_id=?")
            .bind(conversation_id.to_string())
            .fetch_one(&self.db_pool)
            .await?;

        let mut messages = rows
            .into_iter()
            .map(MessageRow::into_message)
            .collect::<AppResult<Vec<_>>>()?;
        messages.reverse();

        Ok((messages, total))
    }

    /// Moves every message addressed to `receiver_id` that is still behind `status` up to it.
    async fn advance(&self, conversation_id: Uuid, receiver_id: Uuid, status: MessageStatus) -> AppResult<u64> {
        let behind: Vec<MessageStatus> = MessageStatus::ALL
            .into_iter()
            .filter(|current| current.can_advance_to(status))
            .collect();
        if behind.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; behind.len()].join(",");
        let sql = format!(
            "UPDATE messages SET status=?, updated_at=? \
             WHERE conversation_id=? AND receiver_id=? AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(db::now_millis())
            .bind(conversation_id.to_string())
            .bind(receiver_id.to_string());
        for current in &behind {
            query = query.bind(current.as_str());
        }

        Ok(query.execute(&self.db_pool).await?.rows_affected())
    }

    pub async fn mark_delivered(&self, conversation_id: Uuid, receiver_id: Uuid) -> AppResult<u64> {
        self.advance(conversation_id, receiver_id, MessageStatus::Delivered).await
    }

    pub async fn mark_read(&self, conversation_id: Uuid, receiver_id: Uuid) -> AppResult<u64> {
        self.advance(conversation_id, receiver_id, MessageStatus::Read).await
    }

    /// Distinct (conversation, sender) pairs with messages to `receiver_id` still in `sent`.
    pub async fn pending_for_receiver(&self, receiver_id: Uuid) -> AppResult<Vec<(Uuid, Uuid)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT DISTINCT conversation_id,sender_id FROM messages WHERE receiver_id=? AND status=?",
        )
        .bind(receiver_id.to_string())
        .bind(MessageStatus::Sent.as_str())
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|(conversation_id, sender_id)| -> AppResult<(Uuid, Uuid)> {
                Ok((Uuid::parse_str(&conversation_id)?, Uuid::parse_str(&sender_id)?))
            })
            .collect()
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id=?")
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
