use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{AskError, ParseErrorKind};

/// Decides whether and how to reattempt after a parse failure.
///
/// Returning `Some` yields the question to use for the next attempt; the
/// input question is never modified. Returning `None` vetoes the retry
/// and the handler surfaces the underlying failure to the caller.
pub trait RetryPolicy: Send + Sync {
    fn retry(&self, question: &Question, error: &AskError, attempts: u32) -> Option<Question>;
}

impl<F> RetryPolicy for F
where
    F: Fn(&Question, &AskError, u32) -> Option<Question> + Send + Sync,
{
    fn retry(&self, question: &Question, error: &AskError, attempts: u32) -> Option<Question> {
        self(question, error, attempts)
    }
}

/// A prompt to send to a provider, plus the policy for retrying when the
/// response cannot be parsed.
///
/// Identity (equality, hashing, the cache key) is the rendered prompt.
#[derive(Clone)]
pub struct Question {
    question: String,
    context: String,
    response_format: String,
    prompt_override: Option<String>,
    max_retries: u32,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    retry_on: HashSet<ParseErrorKind>,
}

impl Question {
    /// A bare question: no retries, no policy, no retriable parse kinds.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: String::new(),
            response_format: String::new(),
            prompt_override: None,
            max_retries: 0,
            retry_policy: None,
            retry_on: HashSet::new(),
        }
    }

    /// The easy default: up to 3 retries driven by [`FeedbackRetry`],
    /// with every parse-failure kind declared retriable. This is what a
    /// plain string converts into.
    pub fn simple(question: impl Into<String>) -> Self {
        Self::new(question)
            .with_max_retries(3)
            .with_retry_policy(FeedbackRetry)
            .retry_on(ParseErrorKind::ALL)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_response_format(mut self, response_format: impl Into<String>) -> Self {
        self.response_format = response_format.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Some(Arc::new(policy));
        self
    }

    pub fn without_retry_policy(mut self) -> Self {
        self.retry_policy = None;
        self
    }

    /// Declares which parse-failure kinds convert into a retriable
    /// invalid-model-response. Replaces any previous declaration.
    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = ParseErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    /// Replaces the derived prompt with an explicit one.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_override = Some(prompt.into());
        self
    }

    /// Clears an explicit prompt, restoring the derived form.
    pub fn without_prompt(mut self) -> Self {
        self.prompt_override = None;
        self
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn response_format(&self) -> &str {
        &self.response_format
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_policy(&self) -> Option<&Arc<dyn RetryPolicy>> {
        self.retry_policy.as_ref()
    }

    pub fn retries_on(&self, kind: ParseErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// The text sent to the provider: the explicit override if present,
    /// otherwise the derived form.
    pub fn prompt(&self) -> String {
        match &self.prompt_override {
            Some(prompt) => prompt.clone(),
            None => self.derived_prompt(),
        }
    }

    /// The prompt assembled from context, question text, and response
    /// format, ignoring any override.
    pub fn derived_prompt(&self) -> String {
        let mut sections = Vec::new();
        if !self.context.is_empty() {
            sections.push(format!("Context:\n{}", self.context));
        }
        if !self.question.is_empty() {
            sections.push(format!("Question:\n{}", self.question));
        }
        if !self.response_format.is_empty() {
            sections.push(format!("Response Format:\n{}", self.response_format));
        }
        sections.join("\n\n")
    }

    /// Deterministic key for caching: a hash of the rendered prompt.
    pub fn cache_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.prompt().hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for Question {
    fn eq(&self, other: &Self) -> bool {
        self.prompt() == other.prompt()
    }
}

impl Eq for Question {}

impl Hash for Question {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.prompt().hash(state);
    }
}

impl fmt::Debug for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Question")
            .field("question", &self.question)
            .field("context", &self.context)
            .field("response_format", &self.response_format)
            .field("prompt_override", &self.prompt_override)
            .field("max_retries", &self.max_retries)
            .field("retry_on", &self.retry_on)
            .field("has_retry_policy", &self.retry_policy.is_some())
            .finish()
    }
}

impl From<&str> for Question {
    fn from(question: &str) -> Self {
        Question::simple(question)
    }
}

impl From<String> for Question {
    fn from(question: String) -> Self {
        Question::simple(question)
    }
}

/// Built-in retry policy: turns the parse failure into feedback for the
/// model.
///
/// Only invalid-model-response errors are retried; everything else is
/// vetoed. The replacement question carries a rewritten prompt naming the
/// failure kind, the formatted error, how many times the transformation
/// has already failed, and the original prompt text, so the model can
/// correct itself on the next attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedbackRetry;

impl RetryPolicy for FeedbackRetry {
    fn retry(&self, question: &Question, error: &AskError, attempts: u32) -> Option<Question> {
        let source = match error {
            AskError::InvalidModelResponse { source } => source,
            _ => return None,
        };
        // Read the prompt with any earlier feedback cleared, so repeated
        // retries never nest feedback inside feedback.
        let original_prompt = question.derived_prompt();
        let mut parts = vec![
            format!(
                "A {} error was raised during transformation of your response:",
                source.kind()
            ),
            format_chain(source),
        ];
        if attempts > 0 {
            parts.push(format!(
                "this transformation has previously failed {} times.",
                attempts
            ));
        }
        parts.push("Review this conversation and try again.".to_string());
        if !original_prompt.is_empty() {
            parts.push(format!("Original question: {}", original_prompt));
        }
        Some(question.clone().with_prompt(parts.join("\n")))
    }
}

/// Formats an error with its full source chain, one cause per line.
fn format_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut cause = error.source();
    while let Some(err) = cause {
        out.push_str("\ncaused by: ");
        out.push_str(&err.to_string());
        cause = err.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn invalid_response(message: &str) -> AskError {
        AskError::InvalidModelResponse {
            source: ParseError::InvalidValue(message.into()),
        }
    }

    #[test]
    fn test_simple_question_basic_properties() {
        let q = Question::simple("test prompt?");
        assert_eq!(q.question(), "test prompt?");
        assert!(!q.prompt().is_empty());
        assert_eq!(q.max_retries(), 3);
        assert!(q.retries_on(ParseErrorKind::InvalidValue));
        assert!(q.retry_policy().is_some());
    }

    #[test]
    fn test_bare_question_has_no_retry_surface() {
        let q = Question::new("test?");
        assert_eq!(q.max_retries(), 0);
        assert!(q.retry_policy().is_none());
        assert!(!q.retries_on(ParseErrorKind::InvalidValue));
    }

    #[test]
    fn test_derived_prompt_sections() {
        let q = Question::new("what?")
            .with_context("some background")
            .with_response_format("json");
        let prompt = q.prompt();
        assert!(prompt.contains("Context:\nsome background"));
        assert!(prompt.contains("Question:\nwhat?"));
        assert!(prompt.contains("Response Format:\njson"));
    }

    #[test]
    fn test_prompt_override_and_clear() {
        let q = Question::new("original").with_prompt("replaced");
        assert_eq!(q.prompt(), "replaced");
        assert_eq!(q.derived_prompt(), "Question:\noriginal");
        let q = q.without_prompt();
        assert_eq!(q.prompt(), "Question:\noriginal");
    }

    #[test]
    fn test_cache_key_tracks_prompt() {
        let a = Question::new("same");
        let b = Question::new("same");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a, b);

        let c = Question::new("same").with_context("different");
        assert_ne!(a.cache_key(), c.cache_key());
        let d = Question::new("same").with_response_format("different");
        assert_ne!(a.cache_key(), d.cache_key());
    }

    #[test]
    fn test_feedback_retry_builds_review_prompt() {
        let q = Question::simple("test?");
        let next = FeedbackRetry
            .retry(&q, &invalid_response("empty response"), 1)
            .expect("should retry");
        let prompt = next.prompt();
        assert!(prompt.contains("InvalidValue"));
        assert!(prompt.contains("Review this conversation and try again."));
        assert!(prompt.contains("previously failed 1 times"));
        assert!(prompt.contains("Original question: Question:\ntest?"));
    }

    #[test]
    fn test_feedback_retry_first_attempt_omits_failure_count() {
        let q = Question::simple("test?");
        let next = FeedbackRetry
            .retry(&q, &invalid_response("bad"), 0)
            .expect("should retry");
        assert!(!next.prompt().contains("previously failed"));
    }

    #[test]
    fn test_feedback_retry_does_not_mutate_input() {
        let q = Question::simple("stay put");
        let before = q.prompt();
        let _ = FeedbackRetry.retry(&q, &invalid_response("bad"), 0);
        assert_eq!(q.prompt(), before);
    }

    #[test]
    fn test_feedback_retry_does_not_nest_feedback() {
        let q = Question::simple("base");
        let first = FeedbackRetry
            .retry(&q, &invalid_response("bad"), 0)
            .unwrap();
        let second = FeedbackRetry
            .retry(&first, &invalid_response("still bad"), 1)
            .unwrap();
        // The second rewrite quotes the derived prompt, not the first
        // rewrite's feedback text.
        assert_eq!(
            second.prompt().matches("Review this conversation").count(),
            1
        );
    }

    #[test]
    fn test_feedback_retry_vetoes_other_errors() {
        let q = Question::simple("test?");
        let err = AskError::provider("503 upstream");
        assert!(FeedbackRetry.retry(&q, &err, 0).is_none());
    }

    #[test]
    fn test_closure_retry_policy() {
        let q = Question::new("test?")
            .with_max_retries(1)
            .with_retry_policy(|question: &Question, _: &AskError, _: u32| {
                Some(question.clone().with_prompt("try harder"))
            });
        let policy = q.retry_policy().unwrap();
        let next = policy
            .retry(&q, &invalid_response("bad"), 0)
            .expect("closure should retry");
        assert_eq!(next.prompt(), "try harder");
    }
}
