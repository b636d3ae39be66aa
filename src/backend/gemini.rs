use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::{join_url, send_json, BackendError, ModelBackend};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Google Gemini `generateContent` endpoint.
pub struct GeminiBackend {
    api_key: String,
    endpoint: Url,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(base_url: &Url, model: &str, api_key: String) -> Result<Self, BackendError> {
        let endpoint = join_url(base_url, &format!("{}:generateContent", model))?;

        Ok(Self {
            api_key,
            endpoint,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let request_body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        {
                            "text": prompt
                        }
                    ]
                }
            ],
            "generationConfig": {
                "temperature": 0.2,
                "topP": 0.8,
                "topK": 40,
                "maxOutputTokens": 8192
            }
        });

        // The key travels in the query string, so only the path is logged.
        debug!(path = self.endpoint.path(), "sending request to Gemini API");

        let request = self
            .client
            .post(self.endpoint.clone())
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body);

        let response = send_json(request).await?;
        extract_text(&response)
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text(response: &Value) -> Result<String, BackendError> {
    let first_candidate = response
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first());

    let Some(candidate) = first_candidate else {
        if let Some(reason) = response.pointer("/promptFeedback/blockReason") {
            info!(%reason, "Gemini blocked the prompt");
            return Err(BackendError::MalformedResponse(format!(
                "prompt blocked: {}",
                reason
            )));
        }
        return Err(BackendError::MalformedResponse(
            "response has no candidates".to_string(),
        ));
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        let finish_reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown");
        return Err(BackendError::MalformedResponse(format!(
            "candidate has no text (finish reason {})",
            finish_reason
        )));
    }

    Ok(text)
}
