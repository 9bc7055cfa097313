//! Decision providers for Shelve.
//!
//! The AI provider wraps a [`Generator`] with prompt-refinement retries;
//! the fallback provider classifies by keyword and never fails.

pub mod ai;
pub mod command;
pub mod fallback;
pub mod scripted;
pub mod traits;

pub use ai::{AiDecisionProvider, AttemptOutcome, AttemptRecord, PromptVariant, Proposal};
pub use command::CommandGenerator;
pub use fallback::{emergency_decision, FallbackProvider, EMERGENCY_FOLDER};
pub use scripted::{ScriptedGenerator, ScriptedReply};
pub use traits::{GenerationError, GenerationRequest, Generator};
