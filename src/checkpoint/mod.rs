//! Checkpoint validation for Shelve.
//!
//! Checkpoints inspect an executed decision and produce an
//! `ExecutionReport`. Built-ins cover compatibility, front matter,
//! cross-reference integrity, workflow compliance and diagram syntax.

pub mod builtin;
pub mod runner;
pub mod traits;

pub use builtin::{builtin_checkpoints, default_runner};
pub use runner::{CheckpointRunner, ExecutionReport, EXECUTION_CHECK};
pub use traits::{Checkpoint, CheckpointContext, CheckpointMeta, CheckpointResult};
