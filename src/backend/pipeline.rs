use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{join_url, normalize_reply, send_json, BackendError, ModelBackend};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";

const MAX_NEW_TOKENS: u32 = 512;

/// Hugging Face text-generation pipeline exposed over HTTP.
///
/// Works with the hosted inference API as well as a self-hosted endpoint
/// serving the same `{"inputs": ...}` contract.
pub struct PipelineBackend {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl PipelineBackend {
    pub fn new(base_url: &Url, model: &str, token: Option<String>) -> Result<Self, BackendError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: join_url(base_url, model)?,
            token,
        })
    }
}

#[async_trait]
impl ModelBackend for PipelineBackend {
    fn name(&self) -> &str {
        "pipeline"
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let request_body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": MAX_NEW_TOKENS,
                "return_full_text": false
            }
        });

        debug!(endpoint = %self.endpoint, "sending request to text-generation pipeline");

        let mut request = self.client.post(self.endpoint.clone()).json(&request_body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = send_json(request).await?;
        normalize_reply(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;

    #[tokio::test]
    async fn posts_inputs_with_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/acme/crm-7b")
                    .header("Authorization", "Bearer hf_test")
                    .json_body_partial(r#"{"inputs": "Create a report"}"#);
                then.status(200)
                    .json_body(json!([{"generated_text": "Report created successfully."}]));
            })
            .await;

        let base = Url::parse(&server.url("/models")).unwrap();
        let backend = PipelineBackend::new(&base, "acme/crm-7b", Some("hf_test".to_string())).unwrap();
        let reply = backend.generate("Create a report").await.unwrap();

        assert_eq!(reply, "Report created successfully.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_generation_list_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/gpt2");
                then.status(200).json_body(json!([]));
            })
            .await;

        let base = Url::parse(&server.url("/models")).unwrap();
        let backend = PipelineBackend::new(&base, "gpt2", None).unwrap();
        let err = backend.generate("hi").await.unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn loading_model_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/gpt2");
                then.status(503)
                    .json_body(json!({"error": "Model gpt2 is currently loading"}));
            })
            .await;

        let base = Url::parse(&server.url("/models")).unwrap();
        let backend = PipelineBackend::new(&base, "gpt2", None).unwrap();
        let err = backend.generate("hi").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(msg) if msg.contains("currently loading")));
    }
}
