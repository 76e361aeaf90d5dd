//! SQLite user repository implementation.
//!
//! Implements `UserRepository` from `parley-core` using sqlx with split
//! read/write pools. Users keep the platform-assigned numeric id.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use parley_core::repository::user::UserRepository;
use parley_types::chat::LogEntry;
use parley_types::error::RepositoryError;
use parley_types::user::{User, UserRole};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `UserRepository`.
pub struct SqliteUserRepository {
    pool: DatabasePool,
}

impl SqliteUserRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct UserRow {
    id: i64,
    name: String,
    role: String,
    current_chat_id: Option<String>,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            role: row.try_get("role")?,
            current_chat_id: row.try_get("current_chat_id")?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        let role: UserRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let current_chat_id = self
            .current_chat_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?;
        Ok(User {
            id: self.id,
            name: self.name,
            role,
            current_chat_id,
        })
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ---------------------------------------------------------------------------
// UserRepository impl
// ---------------------------------------------------------------------------

impl UserRepository for SqliteUserRepository {
    async fn upsert_user(&self, id: i64, name: &str) -> Result<User, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO users (id, name) VALUES (?, ?)
               ON CONFLICT(id) DO UPDATE SET name = excluded.name"#,
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        UserRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_user()
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = UserRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_user()?))
            }
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = UserRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            users.push(r.into_user()?);
        }
        Ok(users)
    }

    async fn set_current_chat(
        &self,
        user_id: i64,
        chat_id: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET current_chat_id = ? WHERE id = ?")
            .bind(chat_id.map(|id| id.to_string()))
            .bind(user_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: i64) -> Result<(), RepositoryError> {
        // One transaction for the whole ownership tree.
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"DELETE FROM payments WHERE subscription_id IN
               (SELECT id FROM subscriptions WHERE user_id = ?)"#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM subscriptions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            "DELETE FROM messages WHERE chat_id IN (SELECT id FROM chats WHERE user_id = ?)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM chats WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn write_log(&self, entry: &LogEntry) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO logs (id, user_id, content, created_at) VALUES (?, ?, ?, ?)")
            .bind(entry.id.to_string())
            .bind(entry.user_id)
            .bind(&entry.content)
            .bind(format_datetime(&entry.created_at))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}
