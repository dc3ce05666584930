use std::str::FromStr;

use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use time::OffsetDateTime;

use crate::AppResult;

// unique: participant_a, participant_b (stored sorted)
// unread_a belongs to participant_a, unread_b to participant_b
// messages.conversation_id is enforced; sqlx enables foreign_keys on every connection
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL,
        image_url TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS credentials (
        token TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user'
    )"#,
    r#"CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY NOT NULL,
        participant_a TEXT NOT NULL,
        participant_b TEXT NOT NULL,
        last_text TEXT,
        last_sender_id TEXT,
        last_at INTEGER,
        unread_a INTEGER NOT NULL DEFAULT 0 CHECK (unread_a >= 0),
        unread_b INTEGER NOT NULL DEFAULT 0 CHECK (unread_b >= 0),
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        CHECK (participant_a < participant_b),
        UNIQUE (participant_a, participant_b)
    )"#,
    "CREATE INDEX IF NOT EXISTS conversations_a ON conversations (participant_a, updated_at)",
    "CREATE INDEX IF NOT EXISTS conversations_b ON conversations (participant_b, updated_at)",
    r#"CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY NOT NULL,
        conversation_id TEXT NOT NULL REFERENCES conversations (id) ON DELETE CASCADE,
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        text TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'text',
        status TEXT NOT NULL DEFAULT 'sent',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS messages_conversation ON messages (conversation_id, created_at)",
    "CREATE INDEX IF NOT EXISTS messages_receiver ON messages (receiver_id, status)",
];

pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> AppResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    Ok(())
}

/// Private in-memory database, one connection so every query sees the same data.
pub async fn in_memory() -> AppResult<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(millis: i64) -> AppResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_survive_conversion() {
        let now = now_millis();
        let at = from_millis(now).unwrap();
        assert_eq!((at.unix_timestamp_nanos() / 1_000_000) as i64, now);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let db_pool = in_memory().await.unwrap();
        migrate(&db_pool).await.unwrap();
    }
}
