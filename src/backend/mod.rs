pub mod gemini;
pub mod ollama;
pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use pipeline::PipelineBackend;

/// Fields checked, in order, when reducing a JSON reply to text.
const TEXT_FIELDS: [&str; 5] = ["response", "generated_text", "text", "content", "data"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

/// Chunks of reply text in arrival order.
pub type ReplyStream = BoxStream<'static, Result<String, BackendError>>;

/// A text-generation service that turns a fully formed prompt into a reply.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Human readable name used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;

    /// Streams the reply. Backends that only answer atomically yield a single chunk.
    async fn generate_stream(&self, prompt: &str) -> Result<ReplyStream, BackendError> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// Drains a backend reply stream into one string.
pub async fn collect_reply(
    backend: &dyn ModelBackend,
    prompt: &str,
) -> Result<String, BackendError> {
    let mut chunks = backend.generate_stream(prompt).await?;
    let mut reply = String::new();
    while let Some(chunk) = chunks.next().await {
        reply.push_str(&chunk?);
    }
    debug!(backend = backend.name(), len = reply.len(), "collected reply");
    Ok(reply)
}

/// Reduces a backend payload to its textual reply.
///
/// Strings are taken as is, arrays contribute their first element and objects
/// the first of [`TEXT_FIELDS`] they hold. Anything else is malformed.
pub fn normalize_reply(value: &Value) -> Result<String, BackendError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Array(items) => match items.first() {
            Some(first) => normalize_reply(first),
            None => Err(BackendError::MalformedResponse("empty array".to_string())),
        },
        Value::Object(map) => TEXT_FIELDS
            .iter()
            .find_map(|field| map.get(*field))
            .map(normalize_reply)
            .unwrap_or_else(|| {
                Err(BackendError::MalformedResponse(format!(
                    "no text field in {}",
                    value
                )))
            }),
        other => Err(BackendError::MalformedResponse(format!(
            "expected text, got {}",
            other
        ))),
    }
}

/// Posts a request and decodes the JSON body, mapping failures onto [`BackendError`].
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;

    if !status.is_success() {
        error!(%status, "backend request failed with response: {}", body);
        return Err(BackendError::Unavailable(format!("HTTP {}: {}", status, body)));
    }

    debug!("received backend response: {}", body);

    serde_json::from_str(&body)
        .map_err(|e| BackendError::MalformedResponse(format!("{}: {}", e, body)))
}

/// Appends `path` below `base`, treating `base` as a directory.
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url, BackendError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    // The "./" keeps a leading `name:` segment from parsing as a URL scheme.
    base.join(&format!("./{}", path))
        .map_err(|e| BackendError::Unavailable(format!("invalid endpoint {}{}: {}", base, path, e)))
}

/// Deployment-time backend selection. Exactly one is active per run.
#[derive(Clone)]
pub enum BackendConfig {
    Ollama {
        host: Url,
        model: String,
    },
    Pipeline {
        base_url: Url,
        model: String,
        token: Option<String>,
    },
    Gemini {
        base_url: Url,
        model: String,
        api_key: Option<String>,
    },
}

impl BackendConfig {
    /// Short description without credentials, for logs and the banner.
    pub fn describe(&self) -> String {
        match self {
            BackendConfig::Ollama { host, model } => format!("ollama {} at {}", model, host),
            BackendConfig::Pipeline { base_url, model, .. } => {
                format!("pipeline {} at {}", model, base_url)
            }
            BackendConfig::Gemini { model, .. } => format!("gemini {}", model),
        }
    }
}

/// Opens backend connections for a session.
pub trait BackendFactory: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ModelBackend>, BackendError>;
}

impl BackendFactory for BackendConfig {
    fn connect(&self) -> Result<Arc<dyn ModelBackend>, BackendError> {
        info!("Connecting to {}", self.describe());
        let backend: Arc<dyn ModelBackend> = match self {
            BackendConfig::Ollama { host, model } => Arc::new(OllamaBackend::new(host, model)?),
            BackendConfig::Pipeline {
                base_url,
                model,
                token,
            } => Arc::new(PipelineBackend::new(base_url, model, token.clone())?),
            BackendConfig::Gemini {
                base_url,
                model,
                api_key,
            } => {
                let api_key = api_key.clone().ok_or_else(|| {
                    BackendError::Unavailable(
                        "GEMINI_API_KEY environment variable not set".to_string(),
                    )
                })?;
                Arc::new(GeminiBackend::new(base_url, model, api_key)?)
            }
        };
        Ok(backend)
    }
}
