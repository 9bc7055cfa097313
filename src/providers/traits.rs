//! Generation capability boundary.
//!
//! The language model is a black box: prompt in, text out. Implementations
//! must respect the request timeout or report a timeout error themselves.

use std::time::Duration;

use thiserror::Error;

use crate::config::AiConfig;

/// One call to the generation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Caller-supplied deadline for this call.
    pub timeout: Duration,
}

impl GenerationRequest {
    /// Build a request using the budgets from configuration.
    pub fn new(prompt: impl Into<String>, config: &AiConfig) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Why a generation call produced no text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The call did not finish within the request timeout.
    #[error("generation timed out after {0} ms")]
    Timeout(u64),

    /// The transport failed (process exited non-zero, connection dropped, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The capability is not available at all.
    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

/// A text generation capability.
///
/// Implementations must be thread-safe; independent engines may share one.
pub trait Generator: Send + Sync {
    /// Name used in logs and stats.
    fn name(&self) -> &str;

    /// Produce text for the prompt.
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
