//! Session resolver: which chat does a user's turn belong to?
//!
//! Tracks the `current_chat_id` pointer and enforces its invariant:
//! when set, it references a chat owned by that user -- never another
//! user's chat, never a deleted one.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use parley_types::chat::Chat;
use parley_types::error::SessionError;

use crate::repository::{ChatRepository, UserRepository};

/// How the active chat was obtained.
#[derive(Debug, Clone)]
pub enum ResolvedChat {
    /// The user's current-chat pointer was already set and valid.
    Current(Chat),
    /// No pointer was set; the earliest existing chat was selected.
    Selected(Chat),
    /// The user had no chats; a fresh one was created.
    Created(Chat),
}

impl ResolvedChat {
    pub fn chat(&self) -> &Chat {
        match self {
            ResolvedChat::Current(c) | ResolvedChat::Selected(c) | ResolvedChat::Created(c) => c,
        }
    }

    pub fn into_chat(self) -> Chat {
        match self {
            ResolvedChat::Current(c) | ResolvedChat::Selected(c) | ResolvedChat::Created(c) => c,
        }
    }
}

/// Resolves and tracks the active chat for each user.
///
/// Generic over the user and chat repositories, like every service in
/// this crate: parley-core never depends on parley-infra.
pub struct SessionResolver<U: UserRepository, C: ChatRepository> {
    users: U,
    chats: C,
    default_chat_name: String,
}

impl<U: UserRepository, C: ChatRepository> SessionResolver<U, C> {
    pub fn new(users: U, chats: C, default_chat_name: impl Into<String>) -> Self {
        Self {
            users,
            chats,
            default_chat_name: default_chat_name.into(),
        }
    }

    /// Determine the active chat for `user_id`, creating one if absent.
    ///
    /// Precondition: the user row exists (callers upsert on sign-in).
    /// Persists the updated pointer whenever it changes. A stale pointer
    /// (chat deleted out from under it) is repaired by falling back to
    /// selection.
    pub async fn resolve_active_chat(&self, user_id: i64) -> Result<ResolvedChat, SessionError> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(SessionError::UserNotFound(user_id))?;

        if let Some(chat_id) = user.current_chat_id
            && let Some(chat) = self.chats.get_chat(&chat_id, user_id).await?
        {
            return Ok(ResolvedChat::Current(chat));
        }

        let chats = self.chats.list_chats(user_id).await?;
        if let Some(chat) = chats.into_iter().next() {
            self.users
                .set_current_chat(user_id, Some(chat.id))
                .await?;
            info!(user_id, chat_id = %chat.id, "selected earliest chat as current");
            return Ok(ResolvedChat::Selected(chat));
        }

        let chat = Chat {
            id: Uuid::now_v7(),
            user_id,
            name: self.default_chat_name.clone(),
            created_at: Utc::now(),
        };
        self.chats.create_chat(&chat).await?;
        self.users
            .set_current_chat(user_id, Some(chat.id))
            .await?;
        info!(user_id, chat_id = %chat.id, "created fresh chat as current");
        Ok(ResolvedChat::Created(chat))
    }

    /// Explicitly switch the active chat (e.g. from a selection callback).
    pub async fn set_active_chat(&self, user_id: i64, chat_id: Uuid) -> Result<Chat, SessionError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(SessionError::UserNotFound(user_id))?;

        let chat = self
            .chats
            .get_chat(&chat_id, user_id)
            .await?
            .ok_or(SessionError::ChatNotOwned { user_id, chat_id })?;

        self.users
            .set_current_chat(user_id, Some(chat.id))
            .await?;
        Ok(chat)
    }

    /// Create a named chat and make it current.
    pub async fn start_chat(&self, user_id: i64, name: &str) -> Result<Chat, SessionError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(SessionError::UserNotFound(user_id))?;

        let chat = Chat {
            id: Uuid::now_v7(),
            user_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.chats.create_chat(&chat).await?;
        self.users
            .set_current_chat(user_id, Some(chat.id))
            .await?;
        Ok(chat)
    }

    /// Delete a chat; clears the pointer if it was current.
    pub async fn delete_chat(&self, user_id: i64, chat_id: Uuid) -> Result<(), SessionError> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(SessionError::UserNotFound(user_id))?;

        self.chats
            .get_chat(&chat_id, user_id)
            .await?
            .ok_or(SessionError::ChatNotOwned { user_id, chat_id })?;

        self.chats.delete_chat(user_id, &chat_id).await?;
        if user.current_chat_id == Some(chat_id) {
            self.users.set_current_chat(user_id, None).await?;
        }
        Ok(())
    }
}
