//! Shelve - hybrid organization engine for knowledge vaults
//!
//! Shelve decides where a piece of generated content belongs. Known content
//! types are filed by template; novel content goes to a language model whose
//! answer must pass a strict schema, with retries and a rule-based fallback
//! so a usable decision always comes back. Executed placements are then
//! checked by an ordered set of checkpoints.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod providers;
pub mod registry;
pub mod stats;
pub mod util;
pub mod vault;

pub use checkpoint::{
    Checkpoint, CheckpointContext, CheckpointResult, CheckpointRunner, ExecutionReport,
};
pub use config::Config;
pub use core::{
    CancelToken, ContentUnit, Decision, Detection, EngineState, OrganizationEngine, Organized,
    Origin, ResponseValidator, Template, TemplateRegistry, TypeDetector,
};
pub use error::{Result, ShelveError};
pub use providers::{AiDecisionProvider, FallbackProvider, Generator};
pub use registry::{RegistryDocument, RegistryStore, YamlRegistryStore};
pub use stats::{StatsEvent, StatsEventType, StatsLogger, StatsSummary};
pub use vault::{ExecutionOutcome, Executor, FsVault, MemoryVault};

// CLI commands
pub use cli::{DetectCommand, OrganizeCommand, StatsCommand, TemplatesCommand, ValidateCommand};
