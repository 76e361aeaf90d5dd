//! Transport trait: the narrow contract this core requires of the
//! messaging platform.
//!
//! The concrete implementation (a Telegram Bot API client) lives in
//! parley-infra. The orchestrator only ever sends, edits, and downloads;
//! update polling and callback registration are the router's business.

use std::path::Path;

use parley_types::error::DeliveryError;

/// Platform chat identifier (the conversation on the messaging side,
/// distinct from a [`parley_types::chat::Chat`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatRef(pub i64);

/// Platform identifier of a delivered message, used for in-place edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef(pub i64);

/// Outbound delivery and file retrieval.
pub trait Transport: Send + Sync {
    /// Send a text message; returns a reference usable for edits.
    fn send(
        &self,
        chat: ChatRef,
        text: &str,
    ) -> impl std::future::Future<Output = Result<MessageRef, DeliveryError>> + Send;

    /// Send a photo from raw bytes.
    fn send_photo(
        &self,
        chat: ChatRef,
        image: &[u8],
    ) -> impl std::future::Future<Output = Result<MessageRef, DeliveryError>> + Send;

    /// Edit a previously sent message in place.
    fn edit(
        &self,
        chat: ChatRef,
        message: MessageRef,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;

    /// Download a platform-hosted file to `dest`. Returns the byte count.
    fn download_file(
        &self,
        file_id: &str,
        dest: &Path,
    ) -> impl std::future::Future<Output = Result<u64, DeliveryError>> + Send;
}
