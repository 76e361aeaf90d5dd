//! OpenAI-compatible model provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves both supported backends
//! (OpenAI and Fireworks) via configurable base URLs. Provider selection
//! happens once in [`build_provider`]; an unknown provider name fails
//! construction, never a later call.
//!
//! Uses [`async_openai`] for type-safe request/response handling and
//! built-in SSE streaming.

pub mod image;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
    ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequest, ImageUrl,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::StreamExt;

use parley_core::model::provider::{FragmentStream, ModelProvider};
use parley_core::model::BoxModelProvider;
use parley_types::config::ModelConfig;
use parley_types::error::ModelError;
use parley_types::model::{MessageRole, ModelMessage, ModelRequest, ModelResponse};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const FIREWORKS_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";

/// Build the configured provider, or fail with
/// [`ModelError::InvalidProvider`] when the name is unknown.
pub fn build_provider(config: &ModelConfig, api_key: &str) -> Result<BoxModelProvider, ModelError> {
    let base_url = match config.provider.as_str() {
        "openai" => OPENAI_BASE_URL,
        "fireworks" => FIREWORKS_BASE_URL,
        other => return Err(ModelError::InvalidProvider(other.to_string())),
    };
    Ok(BoxModelProvider::new(OpenAiCompatibleProvider::new(
        &config.provider,
        base_url,
        api_key,
    )))
}

/// Unified provider for any OpenAI-compatible chat completions API.
///
/// # API Key Security
///
/// Does NOT derive Debug to prevent accidental exposure of the API key
/// stored inside the `async_openai::Client`.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(provider_name: &str, base_url: &str, api_key: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);

        Self {
            client: Client::with_config(openai_config),
            provider_name: provider_name.to_string(),
        }
    }
}

/// Map a generic [`ModelMessage`] into the wire message type. An image
/// on a user turn becomes a multi-part content array with the image as
/// a base64 data URL.
fn map_message(msg: &ModelMessage) -> ChatCompletionRequestMessage {
    match msg.role {
        MessageRole::User => {
            let content = match &msg.image {
                Some(image) => {
                    let data_url = format!(
                        "data:image/jpeg;base64,{}",
                        BASE64.encode(&image.bytes)
                    );
                    ChatCompletionRequestUserMessageContent::Array(vec![
                        ChatCompletionRequestUserMessageContentPart::Text(
                            ChatCompletionRequestMessageContentPartText {
                                text: msg.content.clone(),
                            },
                        ),
                        ChatCompletionRequestUserMessageContentPart::ImageUrl(
                            ChatCompletionRequestMessageContentPartImage {
                                image_url: ImageUrl {
                                    url: data_url,
                                    detail: None,
                                },
                            },
                        ),
                    ])
                }
                None => ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
            };
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content,
                name: None,
            })
        }
        MessageRole::Assistant => {
            #[allow(deprecated)]
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    msg.content.clone(),
                )),
                refusal: None,
                name: None,
                audio: None,
                tool_calls: None,
                function_call: None,
            })
        }
    }
}

/// Build a [`CreateChatCompletionRequest`] from a generic [`ModelRequest`].
fn build_request(request: &ModelRequest, stream: bool) -> CreateChatCompletionRequest {
    let messages: Vec<ChatCompletionRequestMessage> =
        request.messages.iter().map(map_message).collect();

    let mut req = CreateChatCompletionRequest {
        model: request.model.clone(),
        messages,
        max_completion_tokens: Some(request.max_tokens),
        temperature: request.temperature.map(|t| t as f32),
        ..Default::default()
    };

    if stream {
        req.stream = Some(true);
    }

    req
}

impl ModelProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let oai_request = build_request(request, false);

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(|e| ModelError::Invocation(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(ModelResponse {
            content,
            model: response.model,
        })
    }

    fn stream(&self, request: ModelRequest) -> FragmentStream {
        let oai_request = build_request(&request, true);

        // Clone the client for the 'static stream closure
        let client = self.client.clone();

        Box::pin(async_stream::try_stream! {
            let mut oai_stream = client
                .chat()
                .create_stream(oai_request)
                .await
                .map_err(|e| ModelError::Invocation(e.to_string()))?;

            while let Some(result) = oai_stream.next().await {
                let chunk = result.map_err(|e| ModelError::Stream(e.to_string()))?;
                for choice in &chunk.choices {
                    if let Some(text) = &choice.delta.content
                        && !text.is_empty()
                    {
                        yield text.clone();
                    }
                }
            }
        })
    }
}
