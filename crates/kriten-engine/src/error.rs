//! Error types for the execution engine.
//!
//! Variants follow the caller-visible taxonomy: validation failures happen
//! before any mutation, not-found and conflict come from the stores or the
//! orchestrator, dependency errors block deletes, and infrastructure errors
//! wrap orchestrator failures that are surfaced without retry.

/// The result type used throughout kriten-engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input or a definition was rejected before any side effect.
    #[error("validation failed: {message}")]
    Validation {
        /// Summary of what was rejected.
        message: String,
        /// Individual validation findings, if any.
        details: Vec<String>,
    },

    /// The requested object does not exist.
    #[error("{resource_type} not found: {name}")]
    NotFound {
        /// Kind of object looked up.
        resource_type: &'static str,
        /// The name that was looked up.
        name: String,
    },

    /// An object with the same name already exists.
    #[error("{resource_type} already exists: {name}")]
    Conflict {
        /// Kind of object being created.
        resource_type: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// A delete was blocked because another object references the target.
    #[error("{resource_type} is bound with {dependent_type}: {dependent} , please delete that first")]
    Dependency {
        /// Kind of object being deleted.
        resource_type: &'static str,
        /// Kind of the referencing object.
        dependent_type: &'static str,
        /// Name of the referencing object.
        dependent: String,
    },

    /// The orchestrator or a backing store failed.
    #[error("infrastructure error: {message}")]
    Infrastructure {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stored record could not be decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A shared-primitive error.
    #[error(transparent)]
    Core(#[from] kriten_core::Error),
}

impl Error {
    /// Creates a validation error without details.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Creates a validation error carrying individual findings.
    #[must_use]
    pub fn validation_with_details(message: impl Into<String>, details: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            name: name.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(resource_type: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type,
            name: name.into(),
        }
    }

    /// Creates a dependency error.
    #[must_use]
    pub fn dependency(
        resource_type: &'static str,
        dependent_type: &'static str,
        dependent: impl Into<String>,
    ) -> Self {
        Self::Dependency {
            resource_type,
            dependent_type,
            dependent: dependent.into(),
        }
    }

    /// Creates an infrastructure error with no source.
    #[must_use]
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an infrastructure error with a source cause.
    #[must_use]
    pub fn infrastructure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Infrastructure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for validation failures, including invalid names.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::Core(kriten_core::Error::InvalidName { .. } | kriten_core::Error::InvalidInput(_))
        )
    }

    /// Returns true for conflicts, including blocked deletes.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Dependency { .. })
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
    fn dependency_message_names_the_blocker() {
        let err = Error::dependency("runner", "task", "hello");
        assert_eq!(
            err.to_string(),
            "runner is bound with task: hello , please delete that first"
        );
        assert!(err.is_conflict());
    }

    #[test]
    fn not_found_display() {
        let err = Error::not_found("task", "missing");
        assert_eq!(err.to_string(), "task not found: missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn invalid_names_count_as_validation() {
        let err: Error = kriten_core::Error::invalid_name("Bad").into();
        assert!(err.is_validation());
        assert!(Error::validation("nope").is_validation());
    }

    #[test]
    fn infrastructure_keeps_source() {
        let io = std::io::Error::other("connection reset");
        let err = Error::infrastructure_with_source("list pods", io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
