//! Gemini `generateContent` client.
//!
//! Sends a text prompt, optionally preceded by an inline image, and returns
//! the text of the first candidate.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::config::GeminiConfig;
use crate::domain::{GenerativeModel, ModelRequest};
use crate::errors::ModelError;

pub struct GeminiClient {
    http_client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(http_client: reqwest::Client, config: GeminiConfig) -> Self {
        tracing::info!(model = %config.model, base_url = %config.base_url, "Initializing GeminiClient");
        Self { http_client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: ModelRequest) -> Result<String, ModelError> {
        let body = build_request_body(&request);
        tracing::debug!(
            model = %self.config.model,
            with_image = request.image.is_some(),
            prompt_chars = request.prompt.len(),
            "Gemini: sending generateContent request"
        );

        let http_response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = http_response.status();
        if !status.is_success() {
            let body = http_response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Gemini: non-success response");
            return Err(ModelError::Api { status: status.as_u16(), body });
        }

        let raw = http_response.text().await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&raw).map_err(|e| ModelError::Decode(e.to_string()))?;
        let text = parsed.into_text().ok_or(ModelError::EmptyResponse)?;
        tracing::debug!(response_chars = text.len(), "Gemini: response received");
        Ok(text)
    }
}

fn build_request_body(request: &ModelRequest) -> serde_json::Value {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = &request.image {
        parts.push(serde_json::json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": STANDARD.encode(&image.data),
            }
        }));
    }
    parts.push(serde_json::json!({ "text": request.prompt }));

    serde_json::json!({ "contents": [{ "parts": parts }] })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InlineImage;

    #[test]
    fn image_part_precedes_prompt() {
        let body = build_request_body(&ModelRequest {
            prompt: "describe".into(),
            image: Some(InlineImage { mime_type: "image/png".into(), data: vec![1, 2, 3] }),
        });
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[0]["inline_data"]["data"], "AQID");
        assert_eq!(parts[1]["text"], "describe");
    }

    #[test]
    fn text_only_request_has_single_part() {
        let body = build_request_body(&ModelRequest { prompt: "hi".into(), image: None });
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn first_candidate_parts_are_joined() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"```json\n"},{"text":"{}\n```"}]}},{"content":{"parts":[{"text":"ignored"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("```json\n{}\n```"));
    }

    #[test]
    fn blocked_prompt_yields_no_text() {
        let raw = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.into_text().is_none());
    }
}
