//! Error taxonomy for Parley.
//!
//! Each error enum covers one seam: persistence, session resolution,
//! attachment ingestion, model invocation, and outbound delivery. The
//! orchestrator recovers attachment and model errors into user-visible
//! notices; repository and delivery errors propagate to the router.

use thiserror::Error;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from session resolution.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller must have upserted the user first; this is a broken
    /// precondition, not something the resolver repairs.
    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("chat {chat_id} does not belong to user {user_id}")]
    ChatNotOwned { user_id: i64, chat_id: uuid::Uuid },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors from attachment ingestion.
///
/// Each variant maps to a distinct user-facing message, so callers can
/// name the specific cause.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("the file is too large, the maximum size is {limit_mb} MB")]
    FileTooLarge { limit_mb: u64 },

    #[error("file type '{0}' is not supported")]
    UnsupportedFileType(String),

    #[error("decoding error while reading the text file")]
    Decoding,

    #[error("error reading the Word document")]
    WordRead,

    #[error("error reading the PDF file")]
    PdfRead,

    #[error("unexpected error while reading the file: {0}")]
    Unexpected(String),
}

/// Errors from model providers.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Raised at provider construction time, never per call.
    #[error("invalid provider: '{0}'")]
    InvalidProvider(String),

    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("model invocation timed out")]
    Timeout,

    #[error("image generation failed: {0}")]
    ImageGeneration(String),
}

/// Errors delivering messages to the user.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to send message: {0}")]
    Send(String),

    #[error("failed to edit message: {0}")]
    Edit(String),

    #[error("failed to download file: {0}")]
    Download(String),
}

/// Unrecoverable errors from an orchestrated turn.
///
/// Attachment, entitlement, and model failures are handled inside the
/// orchestrator (they become user notices); only failures of the
/// surrounding machinery surface here.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
