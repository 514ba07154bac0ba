//! Ask/answer orchestration for LLM providers.
//!
//! [`AiHandler`] wraps a [`ProviderClient`], applies an optional response
//! cache, parses raw text into typed answers, and retries when parsing
//! fails. A [`Question`] carries the prompt and the retry policy; an
//! [`Answer`] is whatever your factory parses out of the raw response.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ai_handler::{AiHandler, Answer, Gemini, GeminiModel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ai_handler::AskError> {
//!     let gemini = Gemini::new("api-key", GeminiModel::Gemini25Flash)
//!         .with_backup_models([GeminiModel::Gemini20Flash]);
//!     let handler = AiHandler::new(Arc::new(gemini));
//!
//!     let answer = handler.ask("What is the capital of France?").await?;
//!     println!("{}", answer.raw());
//!     Ok(())
//! }
//! ```

mod answer;
mod cache;
mod error;
mod handler;
pub mod providers;
mod question;

pub use answer::{Answer, SimpleAnswer};
pub use cache::{Cache, InMemoryCache, NullCache};
pub use error::{AskError, ParseError, ParseErrorKind};
pub use handler::{AiHandler, AskOptions};
pub use providers::{ChatContext, Gemini, GeminiChat, GeminiModel, ProviderClient, ProviderOptions};
pub use question::{FeedbackRetry, Question, RetryPolicy};
