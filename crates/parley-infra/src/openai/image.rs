//! OpenAI Images API client.
//!
//! Implements [`ImageGenerator`] against `/v1/images/generations` with a
//! hand-rolled reqwest client and typed wire structs. The API returns a
//! hosted URL; the router downloads it and re-uploads the bytes to the
//! messaging platform.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use parley_core::model::provider::ImageGenerator;
use parley_types::config::ImageGenConfig;
use parley_types::error::ModelError;

/// OpenAI image generation client.
pub struct OpenAiImageGenerator {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    config: ImageGenConfig,
}

impl OpenAiImageGenerator {
    pub fn new(api_key: SecretString, config: ImageGenConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .expect("failed to create reqwest client");

        Self {
            client,
            api_key,
            base_url: "https://api.openai.com".to_string(),
            config,
        }
    }

    /// Override the base URL (useful for testing or proxies).
    #[allow(dead_code)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str, size: Option<&str>) -> Result<String, ModelError> {
        let body = GenerationRequest {
            model: &self.config.model_name,
            prompt,
            n: self.config.count,
            size: size.unwrap_or(&self.config.size),
            quality: &self.config.quality,
            response_format: "url",
        };

        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::ImageGeneration(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = match response.json::<ApiErrorResponse>().await {
                Ok(err) => err.error.message,
                Err(_) => format!("HTTP {status}"),
            };
            return Err(ModelError::ImageGeneration(message));
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ImageGeneration(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|img| img.url)
            .ok_or_else(|| ModelError::ImageGeneration("empty image list".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let body = GenerationRequest {
            model: "dall-e-3",
            prompt: "a cat in a hat",
            n: 1,
            size: "1024x1024",
            quality: "standard",
            response_format: "url",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "dall-e-3");
        assert_eq!(json["n"], 1);
        assert_eq!(json["response_format"], "url");
    }

    #[test]
    fn test_response_parses_first_url() {
        let json = r#"{"created": 1700000000, "data": [{"url": "https://img.example/1.png"}]}"#;
        let parsed: GenerationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data[0].url, "https://img.example/1.png");
    }

    #[test]
    fn test_error_body_parses() {
        let json = r#"{"error": {"message": "Billing hard limit reached", "type": "invalid_request_error"}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error.message, "Billing hard limit reached");
    }
}
