//! Gemini `generateContent` client.

use async_trait::async_trait;
use qqbot_core::{Content, ContentGenerator, Secret, traits::GenerateError};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Text model endpoint.
pub const DEFAULT_PRO_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent";

/// Vision model endpoint.
pub const DEFAULT_PRO_VISION_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro-vision:generateContent";

/// Message used when the API gives no usable error text.
pub const INTERNAL_ERROR: &str = "内部错误————嘎嘎————";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Endpoints.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub pro_url: String,
    pub pro_vision_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            pro_url: DEFAULT_PRO_URL.to_string(),
            pro_vision_url: DEFAULT_PRO_VISION_URL.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    stop_sequences: [&'static str; 1],
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            stop_sequences: ["Title"],
            temperature: 0.7,
            max_output_tokens: 800,
            top_p: 0.8,
            top_k: 10,
        }
    }
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl<'a> GenerateRequest<'a> {
    fn new(contents: &'a [Content]) -> Self {
        Self {
            contents,
            generation_config: GenerationConfig::default(),
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

/// Client for the Gemini REST API.
///
/// The API key is read from a shared [`Secret`] on every request, so a
/// rotation applies to the next call.
pub struct GeminiClient {
    http: reqwest::Client,
    key: Secret,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Create a client.
    #[must_use]
    pub const fn new(http: reqwest::Client, key: Secret, config: GeminiConfig) -> Self {
        Self { http, key, config }
    }

    /// Pick the endpoint for `contents`.
    ///
    /// Images go to the vision model, which only takes single-turn prompts:
    /// longer histories are sent to the text model with images removed.
    fn select_endpoint(&self, contents: &mut [Content]) -> &str {
        let has_images = contents.iter().any(Content::has_inline_data);
        if contents.len() > 2 {
            for content in contents.iter_mut() {
                content.parts.retain(|part| !part.is_inline_data());
            }
            return &self.config.pro_url;
        }
        if has_images {
            &self.config.pro_vision_url
        } else {
            &self.config.pro_url
        }
    }
}

fn candidate_text(body: &Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts")?
        .as_array()?
        .iter()
        .map(|part| part.get("text").and_then(Value::as_str))
        .collect()
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(&self, mut contents: Vec<Content>) -> Result<String, GenerateError> {
        let url = self.select_endpoint(&mut contents).to_string();
        debug!(%url, turns = contents.len(), "Generating content");

        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.key.expose())])
            .json(&GenerateRequest::new(&contents))
            .send()
            .await
            .map_err(|e| GenerateError::Network(e.to_string()))?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or_default();

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or(INTERNAL_ERROR);
            return Err(GenerateError::Response {
                message: message.to_string(),
            });
        }

        if body.get("candidates").is_none_or(Value::is_null) {
            let feedback = body.get("promptFeedback").cloned().unwrap_or_default();
            return Err(GenerateError::Safety(feedback.to_string()));
        }

        let text = candidate_text(&body).ok_or_else(|| GenerateError::Response {
            message: INTERNAL_ERROR.to_string(),
        })?;
        debug!(%text, "Generated content");
        Ok(text)
    }
}
