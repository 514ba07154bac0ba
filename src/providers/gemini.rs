use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{ChatContext, ProviderClient, ProviderOptions};
use crate::error::AskError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Generative Language API models usable for text generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeminiModel {
    Gemini25Pro,
    Gemini25Flash,
    Gemini25FlashLite,
    Gemini20Flash,
    Gemini20FlashLite,
    Gemini15Pro,
    Gemini15Flash,
    Gemini15Flash8b,
}

impl GeminiModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini25Pro => "gemini-2.5-pro",
            Self::Gemini25Flash => "gemini-2.5-flash",
            Self::Gemini25FlashLite => "gemini-2.5-flash-lite",
            Self::Gemini20Flash => "gemini-2.0-flash",
            Self::Gemini20FlashLite => "gemini-2.0-flash-lite",
            Self::Gemini15Pro => "gemini-1.5-pro",
            Self::Gemini15Flash => "gemini-1.5-flash",
            Self::Gemini15Flash8b => "gemini-1.5-flash-8b",
        }
    }
}

impl std::fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeminiModel {
    type Err = AskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini-2.5-pro" => Ok(Self::Gemini25Pro),
            "gemini-2.5-flash" => Ok(Self::Gemini25Flash),
            "gemini-2.5-flash-lite" => Ok(Self::Gemini25FlashLite),
            "gemini-2.0-flash" => Ok(Self::Gemini20Flash),
            "gemini-2.0-flash-lite" => Ok(Self::Gemini20FlashLite),
            "gemini-1.5-pro" => Ok(Self::Gemini15Pro),
            "gemini-1.5-flash" => Ok(Self::Gemini15Flash),
            "gemini-1.5-flash-8b" => Ok(Self::Gemini15Flash8b),
            other => Err(AskError::client(format!("unknown Gemini model: {other}"))),
        }
    }
}

/// Outcome of one generateContent call against one model.
enum ModelAttempt {
    /// 503 from upstream: this model is down, a backup may still answer.
    Unavailable,
    /// Anything else: surface immediately, no fallback.
    Failed(AskError),
}

/// Provider client for the Google Generative Language REST API.
///
/// Single-shot asks fall back through the configured backup models when a
/// model reports itself unavailable (HTTP 503). All other failures are
/// reclassified into a provider error and surfaced immediately.
pub struct Gemini {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: GeminiModel,
    backup_models: Vec<GeminiModel>,
    default_temperature: f32,
    default_system_instructions: Option<String>,
    default_max_output_tokens: Option<u32>,
    chats: RwLock<HashMap<String, Arc<GeminiChat>>>,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, default_model: GeminiModel) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model,
            backup_models: Vec::new(),
            default_temperature: DEFAULT_TEMPERATURE,
            default_system_instructions: None,
            default_max_output_tokens: None,
            chats: RwLock::new(HashMap::new()),
        }
    }

    /// Models to try, in order, when the requested model is unavailable.
    pub fn with_backup_models(mut self, models: impl IntoIterator<Item = GeminiModel>) -> Self {
        self.backup_models = models.into_iter().collect();
        self
    }

    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn with_default_system_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.default_system_instructions = Some(instructions.into());
        self
    }

    pub fn with_default_max_output_tokens(mut self, limit: u32) -> Self {
        self.default_max_output_tokens = Some(limit);
        self
    }

    /// Point the client at a different API endpoint, e.g. a local mock
    /// server in tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request settings after merging per-call options with the client
    /// defaults.
    fn request_config(&self, options: &ProviderOptions) -> RequestConfig {
        RequestConfig {
            temperature: options.temperature.unwrap_or(self.default_temperature),
            system_instructions: options
                .system_instructions
                .clone()
                .or_else(|| self.default_system_instructions.clone()),
            max_output_tokens: options.max_output_tokens.or(self.default_max_output_tokens),
        }
    }

    fn resolve_model(&self, options: &ProviderOptions) -> Result<GeminiModel, AskError> {
        match &options.model {
            Some(name) => name.parse(),
            None => Ok(self.default_model),
        }
    }

    /// The requested model followed by each backup not equal to it.
    fn model_order(&self, requested: GeminiModel) -> Vec<GeminiModel> {
        let mut models = vec![requested];
        models.extend(self.backup_models.iter().copied().filter(|m| *m != requested));
        models
    }

    async fn generate(
        &self,
        model: GeminiModel,
        contents: &[Value],
        config: &RequestConfig,
    ) -> Result<String, ModelAttempt> {
        generate(
            &self.http,
            &self.base_url,
            &self.api_key,
            model,
            contents,
            config,
        )
        .await
    }
}

#[async_trait]
impl ProviderClient for Gemini {
    async fn ask(&self, prompt: &str, options: &ProviderOptions) -> Result<String, AskError> {
        let requested = self.resolve_model(options)?;
        let config = self.request_config(options);
        let contents = vec![user_turn(prompt)];

        for model in self.model_order(requested) {
            tracing::debug!(model = %model, "asking Gemini");
            match self.generate(model, &contents, &config).await {
                Ok(text) => return Ok(text),
                Err(ModelAttempt::Unavailable) => {
                    tracing::warn!(model = %model, "model unavailable, trying next model");
                    continue;
                }
                Err(ModelAttempt::Failed(err)) => return Err(err),
            }
        }
        Err(AskError::provider(
            "all models are unavailable or failed to respond",
        ))
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn chat(&self, chat_id: &str) -> Result<Arc<dyn ChatContext>, AskError> {
        let chats = self
            .chats
            .read()
            .map_err(|_| AskError::client("chat registry poisoned"))?;
        chats
            .get(chat_id)
            .cloned()
            .map(|chat| chat as Arc<dyn ChatContext>)
            .ok_or_else(|| AskError::client(format!("unknown chat id: {chat_id}")))
    }

    async fn create_chat(
        &self,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ChatContext>, AskError> {
        let model = self.resolve_model(options)?;
        let config = self.request_config(options);
        let chat = Arc::new(GeminiChat {
            chat_id: uuid::Uuid::new_v4().to_string(),
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model,
            config,
            history: Mutex::new(Vec::new()),
        });
        tracing::debug!(chat_id = %chat.chat_id, model = %model, "created Gemini chat");
        let mut chats = self
            .chats
            .write()
            .map_err(|_| AskError::client("chat registry poisoned"))?;
        chats.insert(chat.chat_id.clone(), chat.clone());
        Ok(chat)
    }
}

/// Multi-turn Gemini conversation. The REST API is stateless, so the
/// chat holds the transcript and replays it on every turn. A chat is
/// pinned to the model and settings it was opened with; there is no
/// model fallback mid-conversation.
#[derive(Debug)]
pub struct GeminiChat {
    chat_id: String,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: GeminiModel,
    config: RequestConfig,
    history: Mutex<Vec<Value>>,
}

#[async_trait]
impl ChatContext for GeminiChat {
    fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn ask(&self, prompt: &str) -> Result<String, AskError> {
        let mut history = self.history.lock().await;
        history.push(user_turn(prompt));

        let attempt = generate(
            &self.http,
            &self.base_url,
            &self.api_key,
            self.model,
            &history,
            &self.config,
        )
        .await;

        match attempt {
            Ok(text) => {
                history.push(model_turn(&text));
                Ok(text)
            }
            Err(failure) => {
                // Keep the transcript consistent with what the model has
                // actually seen.
                history.pop();
                Err(match failure {
                    ModelAttempt::Unavailable => AskError::provider(format!(
                        "model {} is unavailable",
                        self.model
                    )),
                    ModelAttempt::Failed(err) => err,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
struct RequestConfig {
    temperature: f32,
    system_instructions: Option<String>,
    max_output_tokens: Option<u32>,
}

fn user_turn(text: &str) -> Value {
    json!({ "role": "user", "parts": [{ "text": text }] })
}

fn model_turn(text: &str) -> Value {
    json!({ "role": "model", "parts": [{ "text": text }] })
}

fn request_body(contents: &[Value], config: &RequestConfig) -> Value {
    let mut generation = json!({ "temperature": config.temperature });
    if let Some(limit) = config.max_output_tokens {
        generation["maxOutputTokens"] = json!(limit);
    }
    let mut body = json!({
        "contents": contents,
        "generationConfig": generation,
    });
    if let Some(instructions) = config.system_instructions.as_deref() {
        if !instructions.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": instructions }] });
        }
    }
    body
}

fn extract_text(response: &Value) -> Option<String> {
    response
        .get("candidates")
        .and_then(|candidates| candidates.get(0))
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.get(0))
        .and_then(|part| part.get("text"))
        .and_then(|text| text.as_str())
        .map(str::to_string)
}

async fn generate(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: GeminiModel,
    contents: &[Value],
    config: &RequestConfig,
) -> Result<String, ModelAttempt> {
    let url = format!(
        "{}/v1beta/models/{}:generateContent?key={}",
        base_url,
        model.as_str(),
        api_key
    );
    let body = request_body(contents, config);

    let response = http
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            ModelAttempt::Failed(AskError::provider(format!(
                "request to {model} failed: {e}"
            )))
        })?;

    let status = response.status();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(ModelAttempt::Unavailable);
    }
    if !status.is_success() {
        return Err(ModelAttempt::Failed(AskError::provider(format!(
            "{model} returned {status}"
        ))));
    }

    let json: Value = response.json().await.map_err(|e| {
        ModelAttempt::Failed(AskError::provider(format!(
            "unreadable response from {model}: {e}"
        )))
    })?;

    extract_text(&json).ok_or_else(|| {
        ModelAttempt::Failed(AskError::provider(format!("no content in {model} response")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_round_trip() {
        for model in [
            GeminiModel::Gemini25Pro,
            GeminiModel::Gemini25Flash,
            GeminiModel::Gemini15Flash8b,
        ] {
            assert_eq!(model.as_str().parse::<GeminiModel>().unwrap(), model);
        }
        assert!("gpt-4o".parse::<GeminiModel>().is_err());
    }

    #[test]
    fn test_model_order_skips_duplicate_backup() {
        let client = Gemini::new("key", GeminiModel::Gemini25Flash).with_backup_models([
            GeminiModel::Gemini25Flash,
            GeminiModel::Gemini20Flash,
        ]);
        assert_eq!(
            client.model_order(GeminiModel::Gemini25Flash),
            vec![GeminiModel::Gemini25Flash, GeminiModel::Gemini20Flash]
        );
    }

    #[test]
    fn test_request_body_shape() {
        let config = RequestConfig {
            temperature: 0.5,
            system_instructions: Some("be terse".into()),
            max_output_tokens: Some(128),
        };
        let body = request_body(&[user_turn("hello")], &config);

        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 128);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
    }

    #[test]
    fn test_request_body_omits_unset_fields() {
        let config = RequestConfig {
            temperature: 0.2,
            system_instructions: None,
            max_output_tokens: None,
        };
        let body = request_body(&[user_turn("hi")], &config);

        assert!(body.get("systemInstruction").is_none());
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_extract_text_from_candidates() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "answer text" }], "role": "model" },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_text(&response), Some("answer text".to_string()));
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn test_options_merge_prefers_call_site() {
        let client = Gemini::new("key", GeminiModel::Gemini25Flash)
            .with_default_temperature(0.9)
            .with_default_max_output_tokens(64);
        let options = ProviderOptions::new().with_temperature(0.1);
        let config = client.request_config(&options);

        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.max_output_tokens, Some(64));
    }
}
