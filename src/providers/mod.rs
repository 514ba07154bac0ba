mod gemini;

pub use gemini::{Gemini, GeminiChat, GeminiModel};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AskError;

/// Per-request options forwarded verbatim from the handler to the
/// provider. A provider applies what it understands and falls back to
/// its own defaults for the rest.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub system_instructions: Option<String>,
    pub max_output_tokens: Option<u32>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.system_instructions = Some(instructions.into());
        self
    }

    pub fn with_max_output_tokens(mut self, limit: u32) -> Self {
        self.max_output_tokens = Some(limit);
        self
    }
}

/// A multi-turn conversation held by a provider, keyed by an opaque id.
#[async_trait]
pub trait ChatContext: Send + Sync + std::fmt::Debug {
    /// Unique identifier used to retrieve or continue this chat.
    fn chat_id(&self) -> &str;

    /// Send a prompt within this chat's accumulated context.
    async fn ask(&self, prompt: &str) -> Result<String, AskError>;
}

/// External capability that turns a prompt into a raw response string.
///
/// This is the only contract the handler needs. Chat contexts are
/// optional; a provider that does not support them signals so through
/// the default implementations rather than returning an empty registry.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send a prompt to the model and return the raw response text.
    async fn ask(&self, prompt: &str, options: &ProviderOptions) -> Result<String, AskError>;

    fn name(&self) -> &str;

    /// Look up a previously created chat context by id.
    fn chat(&self, chat_id: &str) -> Result<Arc<dyn ChatContext>, AskError> {
        let _ = chat_id;
        Err(AskError::client(format!(
            "provider {} does not support chat contexts",
            self.name()
        )))
    }

    /// Open a new chat context.
    async fn create_chat(
        &self,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ChatContext>, AskError> {
        let _ = options;
        Err(AskError::client(format!(
            "provider {} does not support chat contexts",
            self.name()
        )))
    }
}
