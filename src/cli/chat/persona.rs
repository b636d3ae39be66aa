use serde::Serialize;
use thiserror::Error;
use tinytemplate::TinyTemplate;

/// Instruction wrapped around every user message before it reaches the backend.
pub const CRM_PERSONA: &str = r"<SYS>
You are a helpful assistant who is the backend of a prompt-based interface which simplifies CRM (Customer Relationship Management) tasks. Your tasks include creating a marketing campaign for an audience, integrating other services like email to notify, creating reports, etc. Take suitable prompts as Input.
</SYS>
User: {input_str}
You:";

#[derive(Debug, Error)]
#[error("failed to render prompt template: {0}")]
pub struct PromptError(#[from] tinytemplate::error::Error);

#[derive(Serialize)]
struct PromptInput<'a> {
    input_str: &'a str,
}

/// A fixed template with a single `{input_str}` slot.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    source: &'static str,
}

impl PromptTemplate {
    pub const fn new(source: &'static str) -> Self {
        Self { source }
    }

    pub const fn crm() -> Self {
        Self::new(CRM_PERSONA)
    }

    /// Substitutes `input` verbatim; user text is never HTML-escaped.
    pub fn render(&self, input: &str) -> Result<String, PromptError> {
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&tinytemplate::format_unescaped);
        tt.add_template("prompt", self.source)?;
        Ok(tt.render("prompt", &PromptInput { input_str: input })?)
    }
}
