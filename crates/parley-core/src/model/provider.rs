//! ModelProvider trait definition.
//!
//! Uses RPITIT for `complete`, and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxModelProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use parley_types::error::ModelError;
use parley_types::model::{ModelRequest, ModelResponse};

/// A type-erased stream of response text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send + 'static>>;

/// Trait for model backends (OpenAI, Fireworks, ...).
///
/// Provider selection happens once at configuration-load time:
/// an unsupported provider name is a construction error
/// ([`ModelError::InvalidProvider`]), never a per-call lookup miss.
///
/// Implementations live in parley-infra (e.g., `OpenAiCompatibleProvider`).
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "fireworks").
    fn name(&self) -> &str;

    /// Send a request and receive the full response (batch mode).
    fn complete(
        &self,
        request: &ModelRequest,
    ) -> impl std::future::Future<Output = Result<ModelResponse, ModelError>> + Send;

    /// Send a streaming request. Returns a stream of text fragments.
    fn stream(&self, request: ModelRequest) -> FragmentStream;
}

/// Trait for image-generation backends.
///
/// Returns the URL of the generated image; the caller downloads and
/// delivers it.
pub trait ImageGenerator: Send + Sync {
    /// Generate one image from a prompt. `size` overrides the configured
    /// default when given.
    fn generate(
        &self,
        prompt: &str,
        size: Option<&str>,
    ) -> impl std::future::Future<Output = Result<String, ModelError>> + Send;
}
