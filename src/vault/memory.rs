//! In-memory vault for testing.
//!
//! Thread-safe implementation of the Executor trait, primarily for unit
//! tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::core::decision::Decision;
use crate::error::{Result, ShelveError};
use crate::vault::traits::{join_relative, unique_filename, ExecutionOutcome, Executor};

/// In-memory vault.
///
/// Files and folders are lost when the vault is dropped.
#[derive(Debug, Default)]
pub struct MemoryVault {
    files: RwLock<BTreeMap<String, String>>,
    folders: RwLock<BTreeSet<String>>,
    /// When set, every execution fails with this message.
    failure: Option<String>,
}

impl MemoryVault {
    /// Create an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vault whose executions always fail.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Seed a file (and its parent folders).
    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        if let Ok(mut folders) = self.folders.write() {
            let mut parent = String::new();
            let segments: Vec<&str> = path.split('/').collect();
            for segment in &segments[..segments.len().saturating_sub(1)] {
                parent = join_relative(&parent, segment);
                folders.insert(parent.clone());
            }
        }
        if let Ok(mut files) = self.files.write() {
            files.insert(path, content.into());
        }
        self
    }

    /// Number of files in the vault.
    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    /// Check if the vault holds no files.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folders created so far.
    pub fn folders(&self) -> BTreeSet<String> {
        self.folders.read().map(|f| f.clone()).unwrap_or_default()
    }
}

fn poisoned() -> ShelveError {
    ShelveError::execution("memory vault lock poisoned")
}

impl Executor for MemoryVault {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn try_execute(&self, decision: &Decision, content: &str) -> Result<ExecutionOutcome> {
        if let Some(message) = &self.failure {
            return Err(ShelveError::execution(message.clone()));
        }

        let mut folders = self.folders.write().map_err(|_| poisoned())?;
        let mut files = self.files.write().map_err(|_| poisoned())?;

        let mut planned = decision.planned_paths();
        planned.push(decision.file_placement.folder_path.trim_matches('/').to_string());

        let mut folders_created = Vec::new();
        for folder in planned {
            if !folder.is_empty() && folders.insert(folder.clone()) {
                folders_created.push(folder);
            }
        }

        let folder = decision.file_placement.folder_path.trim_matches('/');
        let filename = unique_filename(&decision.file_placement.filename, |candidate| {
            files.contains_key(&join_relative(folder, candidate))
        });
        let relative = join_relative(folder, &filename);
        files.insert(relative.clone(), content.to_string());

        Ok(ExecutionOutcome::succeeded(folders_created, relative))
    }

    fn list_files(&self) -> Result<BTreeSet<String>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.keys().cloned().collect())
    }

    fn read_file(&self, relative: &str) -> Result<Option<String>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.get(relative.trim_start_matches('/')).cloned())
    }
}
