use crate::error::ParseError;

/// A structured result parsed from a raw model response.
///
/// Implementations always retain the raw string they were built from, so
/// the handler can cache it and callers can re-parse with a different
/// factory later.
pub trait Answer {
    /// The unmodified response text this answer was parsed from.
    fn raw(&self) -> &str;
}

/// Answer that just wraps the raw string, trimmed of surrounding
/// whitespace. Its factory cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleAnswer {
    raw: String,
}

impl SimpleAnswer {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Default answer factory: trims and passes the text through.
    pub fn from_raw(raw: &str) -> Result<Self, ParseError> {
        Ok(Self::new(raw.trim()))
    }
}

impl Answer for SimpleAnswer {
    fn raw(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_trims_whitespace() {
        let answer = SimpleAnswer::from_raw(" Hello! ").unwrap();
        assert_eq!(answer.raw(), "Hello!");
    }

    #[test]
    fn test_direct_construction_keeps_raw() {
        let answer = SimpleAnswer::new("hi");
        assert_eq!(answer.raw(), "hi");
    }
}
