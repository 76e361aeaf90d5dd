//! SQLite chat repository implementation.
//!
//! Chats and their message history. All reads that return history order
//! by `created_at` ascending; that ordering is the conversational
//! context order the orchestrator feeds to the model.

use sqlx::Row;
use uuid::Uuid;

use parley_core::repository::chat::ChatRepository;
use parley_types::chat::{Chat, ChatMessage, MessageRole};
use parley_types::error::RepositoryError;

use super::pool::DatabasePool;
use super::user::{format_datetime, parse_datetime, parse_uuid};

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ChatRow {
    id: String,
    user_id: i64,
    name: String,
    created_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_chat(self) -> Result<Chat, RepositoryError> {
        Ok(Chat {
            id: parse_uuid(&self.id)?,
            user_id: self.user_id,
            name: self.name,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct MessageRow {
    id: String,
    chat_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        Ok(ChatMessage {
            id: parse_uuid(&self.id)?,
            chat_id: parse_uuid(&self.chat_id)?,
            role,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// ChatRepository impl
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO chats (id, user_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(chat.id.to_string())
            .bind(chat.user_id)
            .bind(&chat.name)
            .bind(format_datetime(&chat.created_at))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_chat(&self, chat_id: &Uuid, user_id: i64) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ? AND user_id = ?")
            .bind(chat_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r =
                    ChatRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_chat()?))
            }
            None => Ok(None),
        }
    }

    async fn list_chats(&self, user_id: i64) -> Result<Vec<Chat>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chats WHERE user_id = ? ORDER BY created_at ASC")
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut chats = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ChatRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            chats.push(r.into_chat()?);
        }
        Ok(chats)
    }

    async fn delete_chat(&self, user_id: i64, chat_id: &Uuid) -> Result<(), RepositoryError> {
        // ON DELETE CASCADE takes the messages with it.
        sqlx::query("DELETE FROM chats WHERE id = ? AND user_id = ?")
            .bind(chat_id.to_string())
            .bind(user_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (id, chat_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(message.chat_id.to_string())
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(format_datetime(&message.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_history(&self, chat_id: &Uuid) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows =
            sqlx::query("SELECT * FROM messages WHERE chat_id = ? ORDER BY created_at ASC, id ASC")
                .bind(chat_id.to_string())
                .fetch_all(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(r.into_message()?);
        }
        Ok(messages)
    }

    async fn count_messages(&self, chat_id: &Uuid) -> Result<u64, RepositoryError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(chat_id.to_string())
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(count.0 as u64)
    }
}
