//! UserRepository trait definition.

use parley_types::chat::LogEntry;
use parley_types::error::RepositoryError;
use parley_types::user::User;
use uuid::Uuid;

/// Repository trait for user persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteUserRepository`).
pub trait UserRepository: Send + Sync {
    /// Insert or update a user, keyed by the platform id.
    ///
    /// Idempotent: a second call with the same id updates the name and
    /// leaves everything else untouched.
    fn upsert_user(
        &self,
        id: i64,
        name: &str,
    ) -> impl std::future::Future<Output = Result<User, RepositoryError>> + Send;

    /// Get a user by platform id.
    fn get_user(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// List all users.
    fn list_users(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<User>, RepositoryError>> + Send;

    /// Update the current-chat pointer. `None` clears it.
    fn set_current_chat(
        &self,
        user_id: i64,
        chat_id: Option<Uuid>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a user and everything they own (chats, messages,
    /// subscriptions, payments) in a single transaction. All-or-nothing.
    fn delete_user(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Append a log row. Never read on the hot path.
    fn write_log(
        &self,
        entry: &LogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
