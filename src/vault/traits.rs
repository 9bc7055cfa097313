//! Execution collaborator traits for Shelve.
//!
//! A vault applies an accepted decision: it creates the planned folders and
//! writes the content. Checkpoints then inspect what the vault holds.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::decision::Decision;
use crate::error::Result;

/// What happened when a decision was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Folders that did not exist before, vault-relative.
    pub folders_created: Vec<String>,
    /// Vault-relative path of the written file.
    pub file_path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// A successful outcome.
    pub fn succeeded(folders_created: Vec<String>, file_path: impl Into<String>) -> Self {
        Self {
            folders_created,
            file_path: file_path.into(),
            success: true,
            error: None,
        }
    }

    /// A failed outcome.
    pub fn failed(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            folders_created: Vec::new(),
            file_path: file_path.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Trait for vaults that execute decisions.
///
/// Implementations must be thread-safe.
pub trait Executor: Send + Sync {
    /// Vault name for logging.
    fn name(&self) -> &'static str;

    /// Apply a decision, writing `content` to the placement.
    ///
    /// Never overwrites an existing file; the returned outcome names the
    /// path actually written.
    fn try_execute(&self, decision: &Decision, content: &str) -> Result<ExecutionOutcome>;

    /// Apply a decision, reporting failure in the outcome instead of an error.
    fn execute(&self, decision: &Decision, content: &str) -> ExecutionOutcome {
        match self.try_execute(decision, content) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("{} vault failed to execute decision: {}", self.name(), e);
                ExecutionOutcome::failed(decision.target_path(), e.to_string())
            }
        }
    }

    /// Every file in the vault, vault-relative with `/` separators.
    fn list_files(&self) -> Result<BTreeSet<String>>;

    /// Read a file, `Ok(None)` when it does not exist.
    fn read_file(&self, relative: &str) -> Result<Option<String>>;
}

/// Blanket implementation of Executor for Arc-wrapped vaults.
impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn try_execute(&self, decision: &Decision, content: &str) -> Result<ExecutionOutcome> {
        (**self).try_execute(decision, content)
    }

    fn list_files(&self) -> Result<BTreeSet<String>> {
        (**self).list_files()
    }

    fn read_file(&self, relative: &str) -> Result<Option<String>> {
        (**self).read_file(relative)
    }
}

/// Next free name for `filename` given a predicate for taken names.
///
/// `notes.md`, `notes-1.md`, `notes-2.md`, ...
pub fn unique_filename(filename: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(filename) {
        return filename.to_string();
    }
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| filename.to_string())
}

/// Join a folder path and a filename with `/`.
pub fn join_relative(folder: &str, filename: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", folder, filename)
    }
}
