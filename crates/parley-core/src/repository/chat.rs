//! ChatRepository trait definition.
//!
//! Provides persistence for chats and their ordered message history.

use parley_types::chat::{Chat, ChatMessage};
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for chat and message persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteChatRepository`).
pub trait ChatRepository: Send + Sync {
    /// Persist a new chat.
    fn create_chat(
        &self,
        chat: &Chat,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a chat by id, scoped to its owner. Returns `None` when the
    /// chat does not exist *or* belongs to a different user.
    fn get_chat(
        &self,
        chat_id: &Uuid,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, RepositoryError>> + Send;

    /// List a user's chats, ordered by created_at ASC.
    fn list_chats(
        &self,
        user_id: i64,
    ) -> impl std::future::Future<Output = Result<Vec<Chat>, RepositoryError>> + Send;

    /// Delete a chat and its messages. No-op if the chat does not belong
    /// to `user_id`.
    fn delete_chat(
        &self,
        user_id: i64,
        chat_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist a message. Messages are immutable once created.
    fn save_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get the full message history for a chat, ordered by created_at ASC.
    /// This ordering is the conversational context order.
    fn get_history(
        &self,
        chat_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Total number of messages in a chat.
    fn count_messages(
        &self,
        chat_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
