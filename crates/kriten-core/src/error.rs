//! Error types and result aliases shared across Kriten crates.

/// The result type used throughout `kriten-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by shared primitives.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A resource name failed validation.
    #[error(
        "invalid name '{name}', should be lowercase alphanumeric characters or '-' and '.'"
    )]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new invalid name error.
    #[must_use]
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_name_message_names_the_rules() {
        let err = Error::invalid_name("Bad_Name");
        assert_eq!(
            err.to_string(),
            "invalid name 'Bad_Name', should be lowercase alphanumeric characters or '-' and '.'"
        );
    }

    #[test]
    fn serde_errors_convert() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .map_err(Error::from)
            .unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
