//! Vaults for Shelve.
//!
//! A vault is the execution collaborator: it applies accepted decisions
//! and reports what it did. Filesystem and in-memory implementations.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FsVault;
pub use memory::MemoryVault;
pub use traits::{ExecutionOutcome, Executor};
