use std::time::Duration;

use clap::{Args, ValueEnum};
use eyre::{Result, WrapErr};
use url::Url;

use crate::backend::{gemini, ollama, pipeline, BackendConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Model served by a local Ollama daemon
    Ollama,
    /// Hugging Face text-generation pipeline endpoint
    Pipeline,
    /// Google Gemini API
    Gemini,
}

/// Backend and pacing options, each with an environment fallback.
#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    /// Which model backend answers messages
    #[arg(long, global = true, env = "CRM_BACKEND", value_enum, default_value_t = BackendKind::Ollama)]
    pub backend: BackendKind,

    /// Model identifier; defaults depend on the backend
    #[arg(long, global = true, env = "CRM_MODEL")]
    pub model: Option<String>,

    /// Address of the Ollama server
    #[arg(long, global = true, env = "OLLAMA_HOST", default_value = ollama::DEFAULT_HOST)]
    pub ollama_host: String,

    /// Base URL of the text-generation pipeline
    #[arg(long, global = true, env = "HF_API_URL", default_value = pipeline::DEFAULT_BASE_URL)]
    pub pipeline_url: String,

    /// Access token for the pipeline endpoint
    #[arg(long, global = true, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Gemini API key
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Delay between revealed words, in milliseconds
    #[arg(long, global = true, env = "CRM_DELAY_MS", default_value_t = 50)]
    pub delay_ms: u64,

    /// How long to wait for the backend, in seconds
    #[arg(long, global = true, env = "CRM_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

/// Resolved settings for one run.
#[derive(Clone)]
pub struct Settings {
    pub backend: BackendConfig,
    pub delay: Duration,
    pub deadline: Duration,
}

impl Settings {
    pub fn from_args(args: &ChatArgs) -> Result<Self> {
        let backend = match args.backend {
            BackendKind::Ollama => BackendConfig::Ollama {
                host: parse_host(&args.ollama_host)?,
                model: model_or(&args.model, ollama::DEFAULT_MODEL),
            },
            BackendKind::Pipeline => BackendConfig::Pipeline {
                base_url: parse_host(&args.pipeline_url)?,
                model: model_or(&args.model, pipeline::DEFAULT_MODEL),
                token: args.hf_token.clone(),
            },
            BackendKind::Gemini => BackendConfig::Gemini {
                base_url: parse_host(gemini::DEFAULT_BASE_URL)?,
                model: model_or(&args.model, gemini::DEFAULT_MODEL),
                api_key: args.gemini_api_key.clone(),
            },
        };

        Ok(Self {
            backend,
            delay: Duration::from_millis(args.delay_ms),
            deadline: Duration::from_secs(args.timeout_secs),
        })
    }
}

fn model_or(model: &Option<String>, default: &str) -> String {
    model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Parses a server address, accepting bare `host:port` as Ollama does.
pub fn parse_host(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    Url::parse(&with_scheme).wrap_err_with(|| format!("invalid server address '{}'", raw))
}
