use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{join_url, normalize_reply, send_json, BackendError, ModelBackend};

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Model served by a local Ollama daemon, called through `/api/generate`.
pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
}

impl OllamaBackend {
    pub fn new(host: &Url, model: &str) -> Result<Self, BackendError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: join_url(host, "api/generate")?,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let request_body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        debug!(endpoint = %self.endpoint, model = %self.model, "sending request to Ollama");

        let response = send_json(self.client.post(self.endpoint.clone()).json(&request_body)).await?;
        normalize_reply(&response)
    }
}
