//! Unified error types for Shelve.
//!
//! Errors below the organization engine are recovered internally: schema
//! violations trigger a retry, exhausted retries trigger the fallback, and
//! the fallback degrades to emergency storage. Only checkpoint failures are
//! surfaced to callers, and they travel inside an `ExecutionReport` rather
//! than as errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::schema::ValidationError;
use crate::providers::ai::AttemptRecord;

/// The main error type for Shelve operations.
#[derive(Error, Debug)]
pub enum ShelveError {
    /// I/O errors from vault, registry or log file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or YAML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// A decision payload failed schema or business-rule validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The AI path used up every attempt without an accepted decision.
    #[error("max retries exceeded after {} attempts", attempts.len())]
    MaxRetriesExceeded { attempts: Vec<AttemptRecord> },

    /// A template placeholder had no value in the template context.
    #[error("template '{template}' is missing context key '{key}'")]
    TemplateContext { template: String, key: String },

    /// Template lookup failed.
    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    /// Template registration would replace an existing template.
    #[error("template already registered: {name}")]
    TemplateExists { name: String },

    /// The execution collaborator failed to apply a decision.
    #[error("execution error: {message}")]
    Execution { message: String },

    /// A checkpoint raised instead of returning a result.
    #[error("checkpoint '{checkpoint}' failed to execute: {message}")]
    CheckpointExecution { checkpoint: String, message: String },

    /// The generation capability failed or timed out.
    #[error("generation error: {message}")]
    Generation { message: String },

    /// Registry persistence errors.
    #[error("registry error: {message}")]
    Registry { message: String },

    /// The caller cancelled the decision cycle.
    #[error("decision cycle cancelled")]
    Cancelled,
}

/// A specialized Result type for Shelve operations.
pub type Result<T> = std::result::Result<T, ShelveError>;

impl ShelveError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a template context error.
    pub fn template_context(template: impl Into<String>, key: impl Into<String>) -> Self {
        Self::TemplateContext {
            template: template.into(),
            key: key.into(),
        }
    }

    /// Create a template not found error.
    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound { name: name.into() }
    }

    /// Create a template exists error.
    pub fn template_exists(name: impl Into<String>) -> Self {
        Self::TemplateExists { name: name.into() }
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a checkpoint execution error.
    pub fn checkpoint_execution(checkpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CheckpointExecution {
            checkpoint: checkpoint.into(),
            message: message.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a registry error.
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Whether the engine recovers from this error without caller involvement.
    ///
    /// Execution and checkpoint errors are reported to the caller; cancellation
    /// is the caller's own signal. Everything else degrades to a safer strategy.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Execution { .. } | Self::CheckpointExecution { .. } | Self::Cancelled
        )
    }
}

impl From<io::Error> for ShelveError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ShelveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ShelveError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Infrastructure concerns (stats logging, config and registry loading) must
/// never stop a decision cycle: log the error and carry on with a default.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}

/// Exit codes for the Shelve CLI.
pub mod exit_codes {
    /// The content was organized and every critical checkpoint passed.
    pub const SUCCESS: i32 = 0;

    /// A critical checkpoint failed; the report says which.
    pub const CHECKPOINT_FAILURE: i32 = 1;

    /// Invalid invocation or unreadable input.
    pub const USAGE: i32 = 2;

    /// The process panicked.
    pub const CRASH: i32 = 3;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ReasonCode;

    #[test]
    fn test_storage_error_display() {
        let err = ShelveError::storage(
            "/tmp/vault/notes.md",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("/tmp/vault/notes.md"));
    }

    #[test]
    fn test_template_context_error_display() {
        let err = ShelveError::template_context("coding_development", "task");
        assert_eq!(
            err.to_string(),
            "template 'coding_development' is missing context key 'task'"
        );
    }

    #[test]
    fn test_validation_error_wraps_reason() {
        let err: ShelveError =
            ValidationError::new(ReasonCode::SchemaViolation("confidence".into()), "too low")
                .into();
        assert!(err.to_string().contains("schema_violation:confidence"));
    }

    #[test]
    fn test_max_retries_display_counts_attempts() {
        let err = ShelveError::MaxRetriesExceeded {
            attempts: Vec::new(),
        };
        assert_eq!(err.to_string(), "max retries exceeded after 0 attempts");
    }

    #[test]
    fn test_is_recoverable() {
        assert!(ShelveError::template_context("t", "k").is_recoverable());
        assert!(ShelveError::generation("timeout").is_recoverable());
        assert!(ShelveError::MaxRetriesExceeded { attempts: vec![] }.is_recoverable());
        assert!(!ShelveError::execution("disk full").is_recoverable());
        assert!(!ShelveError::checkpoint_execution("front_matter", "boom").is_recoverable());
        assert!(!ShelveError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: ShelveError = io_err.into();
        assert!(matches!(err, ShelveError::Storage { .. }));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ShelveError = json_err.into();
        assert!(matches!(err, ShelveError::Serde { .. }));
    }

    #[test]
    fn test_fail_open_default() {
        let result: Result<Vec<String>> = Err(ShelveError::registry("unreadable"));
        let value = result.fail_open_default("loading registry");
        assert!(value.is_empty());
    }

    #[test]
    fn test_fail_open_with() {
        let result: Result<u32> = Err(ShelveError::config("bad"));
        assert_eq!(result.fail_open_with("loading config", 7), 7);
    }

    #[test]
    fn test_fail_open_success() {
        let result: Result<u32> = Ok(100);
        assert_eq!(result.fail_open_default("anything"), 100);
    }
}
