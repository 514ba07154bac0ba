use thiserror::Error;

/// Errors surfaced to callers of the handler and provider clients.
#[derive(Error, Debug)]
pub enum AskError {
    /// Client-side failure: misconfiguration, unsupported capability,
    /// unknown chat id, unknown model name.
    #[error("client error: {message}")]
    Client { message: String },

    /// Failure originating from the remote vendor: transport error, API
    /// error status, malformed success body, all models unavailable.
    #[error("provider error: {message}")]
    Provider { message: String },

    /// The model returned a response the answer factory could not parse,
    /// and the question declared the failure kind as retriable.
    #[error("the model returned an invalid response")]
    InvalidModelResponse {
        #[source]
        source: ParseError,
    },

    /// A parse failure that was not declared retriable, surfaced on the
    /// cache-hit path, or unwrapped by a retry-policy veto.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl AskError {
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Every variant is a client-side failure from the caller's point of
    /// view; provider and parse errors are refinements of it.
    pub fn is_client_error(&self) -> bool {
        true
    }

    pub fn is_invalid_response(&self) -> bool {
        matches!(self, Self::InvalidModelResponse { .. })
    }

    /// The parse failure behind an invalid-model-response, if any.
    pub fn parse_source(&self) -> Option<&ParseError> {
        match self {
            Self::InvalidModelResponse { source } => Some(source),
            Self::Parse(source) => Some(source),
            _ => None,
        }
    }

    /// Strips the invalid-model-response wrapper back to its cause.
    /// Used when a retry policy vetoes: the caller gets the original
    /// failure, not the retriable classification.
    pub(crate) fn into_cause(self) -> Self {
        match self {
            Self::InvalidModelResponse { source } => Self::Parse(source),
            other => other,
        }
    }
}

/// Data-validation failures raised by answer factories.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("missing key: {0}")]
    MissingKey(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            Self::MissingKey(_) => ParseErrorKind::MissingKey,
            Self::InvalidValue(_) | Self::Json(_) => ParseErrorKind::InvalidValue,
            Self::TypeMismatch(_) => ParseErrorKind::TypeMismatch,
            Self::MissingField(_) => ParseErrorKind::MissingField,
            Self::Assertion(_) => ParseErrorKind::Assertion,
        }
    }
}

/// Failure kinds a question can declare as retriable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    MissingKey,
    InvalidValue,
    TypeMismatch,
    MissingField,
    Assertion,
}

impl ParseErrorKind {
    pub const ALL: [ParseErrorKind; 5] = [
        ParseErrorKind::MissingKey,
        ParseErrorKind::InvalidValue,
        ParseErrorKind::TypeMismatch,
        ParseErrorKind::MissingField,
        ParseErrorKind::Assertion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MissingKey => "MissingKey",
            Self::InvalidValue => "InvalidValue",
            Self::TypeMismatch => "TypeMismatch",
            Self::MissingField => "MissingField",
            Self::Assertion => "Assertion",
        }
    }
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
