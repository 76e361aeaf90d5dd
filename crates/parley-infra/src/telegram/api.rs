//! TelegramApi -- Bot API client and `Transport` implementation.
//!
//! All methods go through one POST helper that unwraps the `ok`/`result`
//! envelope. The bot token is wrapped in [`secrecy::SecretString`]; it is
//! only exposed when building request URLs and never appears in Debug
//! output or tracing logs.

use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use parley_core::transport::{ChatRef, MessageRef, Transport};
use parley_types::error::DeliveryError;

use super::types::{ApiResponse, File, InlineKeyboardMarkup, LabeledPrice, Message, Update};

/// Errors talking to the Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("http error: {0}")]
    Http(String),

    /// The API answered but refused the call (`ok: false`).
    #[error("api error: {0}")]
    Api(String),
}

/// Telegram Bot API client.
///
/// Cheap to clone: the underlying reqwest client is shared.
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl TelegramApi {
    /// Long-poll window for `getUpdates`, in seconds.
    const POLL_TIMEOUT_SECS: u64 = 30;

    pub fn new(token: SecretString) -> Self {
        let client = reqwest::Client::builder()
            // Above the long-poll window so the poll call never times out locally.
            .timeout(Duration::from_secs(Self::POLL_TIMEOUT_SECS + 30))
            .build()
            .expect("failed to create reqwest client");

        Self {
            client,
            token,
            base_url: "https://api.telegram.org".to_string(),
        }
    }

    /// Override the base URL (useful for testing or proxies).
    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            method
        )
    }

    /// POST a method with a JSON body and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &impl Serialize,
    ) -> Result<T, TelegramError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        if !envelope.ok {
            return Err(TelegramError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| TelegramError::Api("ok response without result".to_string()))
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": Self::POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query", "pre_checkout_query"],
            }),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = serde_json::to_value(markup)
                .map_err(|e| TelegramError::Api(e.to_string()))?;
        }
        self.call("sendMessage", &body).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        // editMessageText returns the edited Message; we only need success.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &json!({ "chat_id": chat_id, "message_id": message_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    /// Upload raw image bytes as a photo.
    pub async fn send_photo_bytes(
        &self,
        chat_id: i64,
        bytes: Vec<u8>,
    ) -> Result<Message, TelegramError> {
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(bytes).file_name("image.png"),
            );

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        let envelope: ApiResponse<Message> = response
            .json()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;
        if !envelope.ok {
            return Err(TelegramError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| TelegramError::Api("ok response without result".to_string()))
    }

    /// Upload raw bytes as a named document.
    pub async fn send_document_bytes(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Message, TelegramError> {
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            );

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        let envelope: ApiResponse<Message> = response
            .json()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;
        if !envelope.ok {
            return Err(TelegramError::Api(
                envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            ));
        }
        envelope
            .result
            .ok_or_else(|| TelegramError::Api("ok response without result".to_string()))
    }

    pub async fn answer_callback_query(&self, callback_id: &str) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    /// Start the payment flow for a plan.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_invoice(
        &self,
        chat_id: i64,
        title: &str,
        description: &str,
        payload: &str,
        provider_token: &str,
        currency: &str,
        prices: &[LabeledPrice],
    ) -> Result<Message, TelegramError> {
        self.call(
            "sendInvoice",
            &json!({
                "chat_id": chat_id,
                "title": title,
                "description": description,
                "payload": payload,
                "provider_token": provider_token,
                "currency": currency,
                "prices": prices,
            }),
        )
        .await
    }

    /// Approve or reject a pre-checkout query. Must be answered within
    /// ten seconds or the payment fails on the platform side.
    pub async fn answer_pre_checkout_query(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut body = json!({ "pre_checkout_query_id": query_id, "ok": ok });
        if let Some(message) = error_message {
            body["error_message"] = json!(message);
        }
        let _: serde_json::Value = self.call("answerPreCheckoutQuery", &body).await?;
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        self.call("getFile", &json!({ "file_id": file_id })).await
    }

    /// Stream a platform-hosted file to `dest`. Returns the byte count.
    async fn download_to(&self, file_path: &str, dest: &Path) -> Result<u64, TelegramError> {
        let url = format!(
            "{}/file/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            file_path
        );
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| TelegramError::Http(e.to_string()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| TelegramError::Http(e.to_string()))?;

        debug!(file_path, written, "file downloaded");
        Ok(written)
    }
}

impl Transport for TelegramApi {
    async fn send(&self, chat: ChatRef, text: &str) -> Result<MessageRef, DeliveryError> {
        let message = self
            .send_message(chat.0, text, None)
            .await
            .map_err(|e| DeliveryError::Send(e.to_string()))?;
        Ok(MessageRef(message.message_id))
    }

    async fn send_photo(&self, chat: ChatRef, image: &[u8]) -> Result<MessageRef, DeliveryError> {
        let message = self
            .send_photo_bytes(chat.0, image.to_vec())
            .await
            .map_err(|e| DeliveryError::Send(e.to_string()))?;
        Ok(MessageRef(message.message_id))
    }

    async fn edit(
        &self,
        chat: ChatRef,
        message: MessageRef,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.edit_message_text(chat.0, message.0, text)
            .await
            .map_err(|e| DeliveryError::Edit(e.to_string()))
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, DeliveryError> {
        let file = self
            .get_file(file_id)
            .await
            .map_err(|e| DeliveryError::Download(e.to_string()))?;
        let file_path = file
            .file_path
            .ok_or_else(|| DeliveryError::Download("file has no path".to_string()))?;
        self.download_to(&file_path, dest)
            .await
            .map_err(|e| DeliveryError::Download(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url_embeds_token() {
        let api = TelegramApi::new(SecretString::from("123:abc"));
        assert_eq!(
            api.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_base_url_override() {
        let api = TelegramApi::new(SecretString::from("123:abc"))
            .with_base_url("http://localhost:8081".to_string());
        assert!(api.method_url("getMe").starts_with("http://localhost:8081/bot"));
    }

    #[test]
    fn test_envelope_error_surfaces_description() {
        let json = r#"{"ok": false, "error_code": 400, "description": "Bad Request: message is not modified"}"#;
        let envelope: ApiResponse<Message> = serde_json::from_str(json).unwrap();
        assert!(!envelope.ok);
        assert!(envelope.description.unwrap().contains("not modified"));
    }
}
