use forge_sdk::LanguageModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GENERIC_SYNTHESIS_MESSAGE: &str = "Failed to generate the data shape. Please try again.";
const GENERIC_DERIVATION_MESSAGE: &str = "Failed to derive a schema from the example.";

/// Either stage of artifact synthesis failed. No partial artifact exists when
/// this is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SynthesisError {
    message: String,
}

impl SynthesisError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self {
                message: GENERIC_SYNTHESIS_MESSAGE.to_string(),
            }
        } else {
            Self { message }
        }
    }

    /// The synthesis reply could not be read as a JSON object.
    pub fn malformed_output() -> Self {
        Self::new("malformed synthesis output")
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<LanguageModelError> for SynthesisError {
    fn from(error: LanguageModelError) -> Self {
        Self::new(error.to_string())
    }
}

/// Reverse-deriving a schema from an example payload failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DerivationError {
    message: String,
}

impl DerivationError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self {
                message: GENERIC_DERIVATION_MESSAGE.to_string(),
            }
        } else {
            Self { message }
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<LanguageModelError> for DerivationError {
    fn from(error: LanguageModelError) -> Self {
        Self::new(error.to_string())
    }
}

/// Category of an initial feed fetch failure, used to pick a short hint for
/// the person retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchFailureHint {
    /// The reply was not a readable JSON object.
    Malformed,
    /// The reply parsed but carried no usable price data.
    EmptyDataset,
    Generic,
}

impl FetchFailureHint {
    /// Classify an error message by the failure category it mentions.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if ["json", "parse", "malformed", "unexpected token"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            Self::Malformed
        } else if ["empty", "no data", "not found", "no price"]
            .iter()
            .any(|needle| message.contains(needle))
        {
            Self::EmptyDataset
        } else {
            Self::Generic
        }
    }

    #[must_use]
    pub fn hint(self) -> &'static str {
        match self {
            Self::Malformed => {
                "The feed returned data in an unexpected format. Retrying usually helps."
            }
            Self::EmptyDataset => {
                "No market data was found. Check that the symbol is a valid listed ticker."
            }
            Self::Generic => "The market feed is unavailable right now. Please retry shortly.",
        }
    }
}

/// The first fetch for a feed subject failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PollFetchError {
    message: String,
    hint: FetchFailureHint,
}

impl PollFetchError {
    /// Build an error whose hint is classified from the message text.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let hint = FetchFailureHint::classify(&message);
        Self { message, hint }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn hint(&self) -> FetchFailureHint {
        self.hint
    }
}

impl From<LanguageModelError> for PollFetchError {
    fn from(error: LanguageModelError) -> Self {
        Self::new(error.to_string())
    }
}

/// A chat stream broke off. Never returned to callers; the conversation turns
/// it into a terminal assistant turn.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Chat stream failed: {0}")]
pub struct StreamError(pub String);

impl From<LanguageModelError> for StreamError {
    fn from(error: LanguageModelError) -> Self {
        Self(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_failure_categories() {
        assert_eq!(
            FetchFailureHint::classify("Malformed feed response: expected a JSON object"),
            FetchFailureHint::Malformed
        );
        assert_eq!(
            FetchFailureHint::classify("Empty dataset: price history is empty"),
            FetchFailureHint::EmptyDataset
        );
        assert_eq!(
            FetchFailureHint::classify("Status error: quota exceeded (Status 429)"),
            FetchFailureHint::Generic
        );
    }

    #[test]
    fn blank_messages_fall_back_to_generic_text() {
        assert_eq!(SynthesisError::new("  ").message(), GENERIC_SYNTHESIS_MESSAGE);
        assert_eq!(DerivationError::new("").message(), GENERIC_DERIVATION_MESSAGE);
    }
}
