//! Conversation orchestrator: one inbound turn, end to end.
//!
//! Order of operations is fixed: entitlement gate, chat resolution,
//! content normalization, user-turn persistence, model invocation,
//! delivery, assistant-turn persistence. The user turn is persisted
//! *before* the model is invoked, so a model failure never loses what
//! the user said. Exactly one assistant message is persisted per
//! successful turn, already stripped of the end-of-turn marker.

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::chat::{ChatMessage, MessageRole};
use parley_types::config::{ModelConfig, Strings};
use parley_types::error::{AttachmentError, OrchestratorError};
use parley_types::model::{END_OF_TURN_MARKER, ModelMessage, ModelRequest};
use parley_types::subscription::{Entitlement, SubscriptionPlan};

use crate::attachment::{AttachmentIngestor, FileDescriptor, NormalizedContent, TextExtractor};
use crate::gate::AccessGate;
use crate::model::BoxModelProvider;
use crate::repository::{ChatRepository, SubscriptionRepository, UserRepository};
use crate::session::SessionResolver;
use crate::transport::{ChatRef, MessageRef, Transport};

/// What the user sent this turn.
#[derive(Debug, Clone)]
pub enum TurnContent {
    Text(String),
    Attachment(FileDescriptor),
}

/// One inbound turn, as handed over by the router.
#[derive(Debug, Clone)]
pub struct InboundTurn {
    pub user_id: i64,
    /// The platform-side conversation to deliver replies into.
    pub platform_chat: ChatRef,
    pub content: TurnContent,
}

/// How a turn ended. Recoverable failures (entitlement, attachment,
/// model) are outcomes, not errors: the user was already notified.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Reply delivered and persisted.
    Completed { chat_id: Uuid },
    /// No active subscription; the available plans for the purchase prompt.
    Denied(Vec<SubscriptionPlan>),
    /// The attachment could not be normalized; nothing was persisted.
    ContentRejected(AttachmentError),
    /// The model failed mid-turn; the user turn is kept.
    ModelFailed,
    /// Canceled by the user; no assistant message was persisted.
    Canceled,
}

/// Drives one conversational turn from inbound content to a persisted,
/// delivered reply.
pub struct ConversationOrchestrator<U, C, S, T, X>
where
    U: UserRepository,
    C: ChatRepository,
    S: SubscriptionRepository,
    T: Transport,
    X: TextExtractor,
{
    resolver: SessionResolver<U, C>,
    gate: AccessGate<S>,
    chats: C,
    ingestor: AttachmentIngestor<T, X>,
    provider: BoxModelProvider,
    transport: T,
    model: ModelConfig,
    strings: Strings,
}

impl<U, C, S, T, X> ConversationOrchestrator<U, C, S, T, X>
where
    U: UserRepository,
    C: ChatRepository,
    S: SubscriptionRepository,
    T: Transport,
    X: TextExtractor,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: SessionResolver<U, C>,
        gate: AccessGate<S>,
        chats: C,
        ingestor: AttachmentIngestor<T, X>,
        provider: BoxModelProvider,
        transport: T,
        model: ModelConfig,
        strings: Strings,
    ) -> Self {
        Self {
            resolver,
            gate,
            chats,
            ingestor,
            provider,
            transport,
            model,
            strings,
        }
    }

    /// Process one turn. `cancel` aborts the model invocation; everything
    /// persisted before the cancellation stays.
    pub async fn process_turn(
        &self,
        turn: InboundTurn,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let entitlement = self.gate.check_entitlement(turn.user_id).await?;
        if let Entitlement::Denied(plans) = entitlement {
            info!(user_id = turn.user_id, "turn denied: no active subscription");
            self.transport
                .send(turn.platform_chat, &self.strings.no_subscription)
                .await?;
            return Ok(TurnOutcome::Denied(plans));
        }

        let chat = self
            .resolver
            .resolve_active_chat(turn.user_id)
            .await?
            .into_chat();

        let content = match &turn.content {
            TurnContent::Text(text) => NormalizedContent {
                text: Some(text.clone()),
                image: None,
            },
            TurnContent::Attachment(descriptor) => {
                match self.ingestor.ingest(descriptor).await {
                    Ok(content) => content,
                    Err(error) => {
                        warn!(user_id = turn.user_id, %error, "attachment rejected");
                        let notice = Strings::fill(
                            &self.strings.attachment_error,
                            "reason",
                            &error.to_string(),
                        );
                        self.transport.send(turn.platform_chat, &notice).await?;
                        return Ok(TurnOutcome::ContentRejected(error));
                    }
                }
            }
        };

        let user_text =
            truncate_chars(&content.text.unwrap_or_default(), self.model.max_message_chars);

        self.chats
            .save_message(&ChatMessage {
                id: Uuid::now_v7(),
                chat_id: chat.id,
                role: MessageRole::User,
                content: user_text,
                created_at: chrono::Utc::now(),
            })
            .await?;

        let history = self.chats.get_history(&chat.id).await?;
        let skip = history.len().saturating_sub(self.model.chat_history_limit);
        let mut messages: Vec<ModelMessage> = history
            .into_iter()
            .skip(skip)
            .map(|m| ModelMessage::text(m.role, m.content))
            .collect();

        if let Some(image) = content.image
            && let Some(slot) = messages.iter_mut().rev().find(|m| m.role == MessageRole::User)
        {
            slot.image = Some(image);
        }

        let request = ModelRequest {
            model: self.model.model_name.clone(),
            messages,
            max_tokens: self.model.max_tokens,
            temperature: Some(self.model.temperature),
        };

        let reply = if self.model.stream {
            match self.stream_reply(turn.platform_chat, request, cancel).await? {
                Some(text) => text,
                None => return Ok(TurnOutcome::Canceled),
            }
        } else {
            match self.batch_reply(turn.platform_chat, request, cancel).await? {
                Some(text) => text,
                None => return Ok(TurnOutcome::Canceled),
            }
        };

        let Some(reply) = reply else {
            return Ok(TurnOutcome::ModelFailed);
        };

        self.chats
            .save_message(&ChatMessage {
                id: Uuid::now_v7(),
                chat_id: chat.id,
                role: MessageRole::Assistant,
                content: reply,
                created_at: chrono::Utc::now(),
            })
            .await?;

        info!(user_id = turn.user_id, chat_id = %chat.id, "turn completed");
        Ok(TurnOutcome::Completed { chat_id: chat.id })
    }

    /// Streamed delivery: placeholder first, progressive edits every
    /// `edit_interval` fragments, one final edit with the full text.
    ///
    /// Returns `Ok(None)` on cancellation, `Ok(Some(None))` on a model
    /// failure (the user was notified), `Ok(Some(Some(text)))` on success.
    async fn stream_reply(
        &self,
        platform_chat: ChatRef,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> Result<Option<Option<String>>, OrchestratorError> {
        let placeholder = self
            .transport
            .send(platform_chat, &self.strings.placeholder)
            .await?;

        let mut stream = self.provider.stream(request);
        let mut accumulated = String::new();
        let mut fragments = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("turn canceled mid-stream");
                    if let Err(error) = self
                        .transport
                        .edit(platform_chat, placeholder, &self.strings.canceled)
                        .await
                    {
                        warn!(%error, "failed to mark canceled turn");
                    }
                    return Ok(None);
                }
                next = stream.next() => match next {
                    Some(Ok(fragment)) => {
                        accumulated.push_str(&fragment);
                        fragments += 1;
                        if self.model.edit_interval > 0
                            && fragments % self.model.edit_interval == 0
                            && !accumulated.is_empty()
                        {
                            // Progress edits are best-effort; the final
                            // edit carries the authoritative text.
                            if let Err(error) = self
                                .transport
                                .edit(platform_chat, placeholder, &accumulated)
                                .await
                            {
                                warn!(%error, "progress edit failed, continuing");
                            }
                        }
                    }
                    Some(Err(error)) => {
                        warn!(%error, "model stream failed");
                        self.deliver_notice(platform_chat, placeholder, &self.strings.model_error)
                            .await?;
                        return Ok(Some(None));
                    }
                    None => break,
                },
            }
        }

        let text = accumulated.replace(END_OF_TURN_MARKER, "");
        self.deliver_notice(platform_chat, placeholder, &text).await?;
        Ok(Some(Some(text)))
    }

    /// Batch delivery: one request, one sent message.
    async fn batch_reply(
        &self,
        platform_chat: ChatRef,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> Result<Option<Option<String>>, OrchestratorError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("turn canceled before completion");
                return Ok(None);
            }
            response = self.provider.complete(&request) => response,
        };

        match response {
            Ok(response) => {
                let text = response.content.replace(END_OF_TURN_MARKER, "");
                self.transport.send(platform_chat, &text).await?;
                Ok(Some(Some(text)))
            }
            Err(error) => {
                warn!(%error, "model invocation failed");
                self.transport
                    .send(platform_chat, &self.strings.model_error)
                    .await?;
                Ok(Some(None))
            }
        }
    }

    /// Edit `message` to `text`, falling back to a fresh send when the
    /// edit is refused.
    async fn deliver_notice(
        &self,
        platform_chat: ChatRef,
        message: MessageRef,
        text: &str,
    ) -> Result<(), OrchestratorError> {
        if let Err(error) = self.transport.edit(platform_chat, message, text).await {
            warn!(%error, "final edit failed, sending instead");
            self.transport.send(platform_chat, text).await?;
        }
        Ok(())
    }
}

/// Truncate to at most `max` characters on a char boundary. Silent:
/// the user is not told their message was clipped.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
