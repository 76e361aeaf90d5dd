//! Model request/response types.
//!
//! These are the provider-agnostic shapes handed to a model client:
//! an ordered list of turns, at most one image (attached to the newest
//! user turn), and the generation limits from configuration.

use serde::{Deserialize, Serialize};

pub use crate::chat::MessageRole;

/// End-of-turn marker some models leak into their output; stripped from
/// the final delivered text.
pub const END_OF_TURN_MARKER: &str = "<end_of_turn>";

/// Raw image bytes attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub bytes: Vec<u8>,
}

/// A single turn in model format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: MessageRole,
    pub content: String,
    /// Image content, present only on the newest user turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
}

impl ModelMessage {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image: None,
        }
    }
}

/// Request to a model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Response from a model provider for a batch completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
}
