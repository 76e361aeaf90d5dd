//! Bot configuration types.
//!
//! `BotConfig` represents the top-level `config.toml`: model selection and
//! limits, streaming behavior, file handling, image generation, admin
//! identities, and user-facing string templates. Every field has a
//! default, so an empty file is a valid configuration. Secrets (the bot
//! token, provider API keys) are *not* configuration -- they come from
//! the environment.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub image_gen: ImageGenConfig,
    #[serde(default)]
    pub files: FileConfig,
    /// User ids allowed to run admin commands.
    #[serde(default)]
    pub admin_user_ids: Vec<i64>,
    #[serde(default)]
    pub strings: Strings,
}

/// Model provider selection and generation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name; validated once at provider construction.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// How many trailing history messages go to the model.
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
    /// Streaming vs. batch delivery.
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Edit the placeholder on every k-th streamed fragment.
    #[serde(default = "default_edit_interval")]
    pub edit_interval: usize,
    /// Silent truncation cap for a single turn's content.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

fn default_chat_history_limit() -> usize {
    10
}

fn default_stream() -> bool {
    true
}

fn default_edit_interval() -> usize {
    20
}

fn default_max_message_chars() -> usize {
    10_000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: default_model_name(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            chat_history_limit: default_chat_history_limit(),
            stream: default_stream(),
            edit_interval: default_edit_interval(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// Image generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenConfig {
    #[serde(default = "default_image_model")]
    pub model_name: String,
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_image_quality")]
    pub quality: String,
    #[serde(default = "default_image_count")]
    pub count: u8,
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_quality() -> String {
    "standard".to_string()
}

fn default_image_count() -> u8 {
    1
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            model_name: default_image_model(),
            size: default_image_size(),
            quality: default_image_quality(),
            count: default_image_count(),
        }
    }
}

/// Uploaded file limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

fn default_max_file_size_mb() -> u64 {
    10
}

impl FileConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

/// User-facing text templates.
///
/// `{placeholders}` are substituted by the router with simple string
/// replacement; no templating engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Strings {
    pub welcome: String,
    pub help: String,
    pub default_chat_name: String,
    pub current_chat: String,
    pub new_chat_created: String,
    pub ask_chat_name: String,
    pub no_subscription: String,
    pub purchase_button: String,
    pub payment_successful: String,
    pub image_ask_description: String,
    pub image_please_wait: String,
    pub model_error: String,
    pub attachment_error: String,
    pub canceled: String,
    pub placeholder: String,
}

impl Default for Strings {
    fn default() -> Self {
        Self {
            welcome: "Hi {name}! Send me a message to start chatting.".to_string(),
            help: "Send text, a photo, or a document and I will answer. \
                   Commands: /new, /chats, /delete, /generate, /purchase, /account, /cancel."
                .to_string(),
            default_chat_name: "New chat".to_string(),
            current_chat: "Current chat: {chat_name}".to_string(),
            new_chat_created: "Created a new chat for you.".to_string(),
            ask_chat_name: "What should the new chat be called?".to_string(),
            no_subscription: "You have no active subscription.".to_string(),
            purchase_button: "Purchase a subscription".to_string(),
            payment_successful: "Payment received -- {plan_name} is now active. Thank you!"
                .to_string(),
            image_ask_description: "Describe the image you want me to generate.".to_string(),
            image_please_wait: "Generating your image, this can take a minute...".to_string(),
            model_error: "Something went wrong while generating a reply. Your message was saved; \
                          please try again."
                .to_string(),
            attachment_error: "Could not process your file: {reason}".to_string(),
            canceled: "Canceled.".to_string(),
            placeholder: "...".to_string(),
        }
    }
}

impl Strings {
    /// Substitute a single `{placeholder}` in a template.
    pub fn fill(template: &str, key: &str, value: &str) -> String {
        template.replace(&format!("{{{key}}}"), value)
    }
}
