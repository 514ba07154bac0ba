use std::sync::Arc;

use crate::answer::{Answer, SimpleAnswer};
use crate::cache::{Cache, InMemoryCache};
use crate::error::{AskError, ParseError};
use crate::providers::{ProviderClient, ProviderOptions};
use crate::question::Question;

/// Per-call options for [`AiHandler::ask_with`].
#[derive(Debug, Clone)]
pub struct AskOptions {
    /// Consult and populate the response cache. On by default.
    pub use_cache: bool,
    /// Forwarded verbatim to the provider client.
    pub provider: ProviderOptions,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            provider: ProviderOptions::default(),
        }
    }
}

impl AskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_provider(mut self, provider: ProviderOptions) -> Self {
        self.provider = provider;
        self
    }
}

/// Orchestrates cache lookup, provider invocation, answer parsing, and
/// retry on parse failure.
pub struct AiHandler {
    client: Arc<dyn ProviderClient>,
    cache: Arc<dyn Cache>,
}

impl AiHandler {
    /// Handler backed by an in-memory response cache.
    pub fn new(client: Arc<dyn ProviderClient>) -> Self {
        Self::with_cache(client, Arc::new(InMemoryCache::new()))
    }

    pub fn with_cache(client: Arc<dyn ProviderClient>, cache: Arc<dyn Cache>) -> Self {
        Self { client, cache }
    }

    /// Ask with the default pass-through answer and caching enabled.
    pub async fn ask(&self, question: impl Into<Question>) -> Result<SimpleAnswer, AskError> {
        self.ask_with(question, SimpleAnswer::from_raw, AskOptions::default())
            .await
    }

    /// Ask with a typed answer factory and caching enabled.
    pub async fn ask_as<A, F>(
        &self,
        question: impl Into<Question>,
        answer_factory: F,
    ) -> Result<A, AskError>
    where
        A: Answer,
        F: Fn(&str) -> Result<A, ParseError>,
    {
        self.ask_with(question, answer_factory, AskOptions::default())
            .await
    }

    /// Full ask surface: typed factory, cache toggle, provider options.
    ///
    /// On a cache hit the stored raw string is parsed once and returned;
    /// no retry logic runs, and a parse failure on cached data propagates
    /// as [`AskError::Parse`]. On a miss, the provider is invoked and
    /// parse failures of the question's declared kinds are retried per
    /// its policy, bounded by its `max_retries`.
    pub async fn ask_with<A, F>(
        &self,
        question: impl Into<Question>,
        answer_factory: F,
        options: AskOptions,
    ) -> Result<A, AskError>
    where
        A: Answer,
        F: Fn(&str) -> Result<A, ParseError>,
    {
        let question = question.into();

        if options.use_cache {
            if let Some(raw) = self.cache.get(&question) {
                tracing::debug!(key = question.cache_key(), "cache hit");
                return answer_factory(&raw).map_err(AskError::from);
            }
        }

        let answer = self
            .ask_provider(&question, &answer_factory, &options.provider)
            .await?;

        if options.use_cache {
            // Keyed by the original question, never a retry rewrite.
            self.cache.set(&question, answer.raw());
        }
        Ok(answer)
    }

    /// The retry loop: invoke the provider, parse, and on a retriable
    /// failure let the question's policy produce the next attempt.
    async fn ask_provider<A, F>(
        &self,
        question: &Question,
        answer_factory: &F,
        provider_options: &ProviderOptions,
    ) -> Result<A, AskError>
    where
        A: Answer,
        F: Fn(&str) -> Result<A, ParseError>,
    {
        let mut attempts: u32 = 0;
        let mut current = question.clone();

        loop {
            let raw = self.client.ask(&current.prompt(), provider_options).await?;

            let err = match reclassify(answer_factory(&raw), &current) {
                Ok(answer) => return Ok(answer),
                Err(err) => err,
            };
            if !err.is_invalid_response() {
                return Err(err);
            }

            tracing::warn!(attempt = attempts, error = %err, "failed to parse model response");
            tracing::debug!(
                prompt = %current.prompt(),
                response = %raw,
                "unparseable model response"
            );

            let Some(policy) = current.retry_policy().cloned() else {
                return Err(err);
            };
            if attempts >= current.max_retries() {
                return Err(err);
            }
            match policy.retry(&current, &err, attempts) {
                Some(next) => {
                    attempts += 1;
                    current = next;
                }
                // Policy veto: surface the underlying failure, not the
                // retriable classification.
                None => return Err(err.into_cause()),
            }
        }
    }
}

/// Converts a factory failure into the retriable invalid-model-response
/// kind when the question declares its kind; other failures pass through
/// untouched.
fn reclassify<A>(result: Result<A, ParseError>, question: &Question) -> Result<A, AskError> {
    result.map_err(|err| {
        if question.retries_on(err.kind()) {
            AskError::InvalidModelResponse { source: err }
        } else {
            AskError::Parse(err)
        }
    })
}
