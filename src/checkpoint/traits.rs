//! Checkpoint trait and result types.
//!
//! A checkpoint inspects the executed result of a decision and reports
//! pass or fail. Critical failures block; the rest are warnings.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::decision::Decision;
use crate::error::Result;
use crate::vault::{ExecutionOutcome, Executor};

/// Static metadata a checkpoint is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub enabled: bool,
    pub critical: bool,
    /// Ascending execution order.
    pub order: i32,
}

impl CheckpointMeta {
    pub fn new(critical: bool, order: i32) -> Self {
        Self {
            enabled: true,
            critical,
            order,
        }
    }
}

/// Everything a checkpoint may look at.
#[derive(Debug, Clone)]
pub struct CheckpointContext {
    pub decision: Decision,
    pub outcome: ExecutionOutcome,
    /// Content of the written file, when it could be read back.
    pub content: Option<String>,
    /// Every file in the vault after execution.
    pub known_files: BTreeSet<String>,
    /// Documents the owning template or workflow requires.
    pub required_files: Vec<String>,
}

impl CheckpointContext {
    /// Build a context without reading a vault.
    pub fn new(decision: Decision, outcome: ExecutionOutcome) -> Self {
        Self {
            decision,
            outcome,
            content: None,
            known_files: BTreeSet::new(),
            required_files: Vec::new(),
        }
    }

    /// Build a context from the executed state of a vault.
    pub fn from_vault(
        decision: Decision,
        outcome: ExecutionOutcome,
        vault: &dyn Executor,
    ) -> Result<Self> {
        let content = if outcome.success {
            vault.read_file(&outcome.file_path)?
        } else {
            None
        };
        let known_files = vault.list_files()?;
        Ok(Self {
            decision,
            outcome,
            content,
            known_files,
            required_files: Vec::new(),
        })
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_known_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required_files(mut self, files: Vec<String>) -> Self {
        self.required_files = files;
        self
    }

    /// Lowercase extension of the written file.
    pub fn extension(&self) -> Option<String> {
        let name = self.outcome.file_path.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Outcome of one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    pub critical: bool,
    pub timestamp: DateTime<Utc>,
}

impl CheckpointResult {
    /// A passing result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            details: Vec::new(),
            critical,
            timestamp: Utc::now(),
        }
    }

    /// A failing result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            passed: false,
            ..Self::pass(name, message, critical)
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Failed and blocking.
    pub fn is_critical_failure(&self) -> bool {
        !self.passed && self.critical
    }
}

/// A post-execution check.
pub trait Checkpoint: Send + Sync {
    /// Unique name, used in reports and registry overrides.
    fn name(&self) -> &str;

    /// Metadata used when the checkpoint is registered without overrides.
    fn default_meta(&self) -> CheckpointMeta;

    /// Inspect the context. Errors are recorded as critical failures.
    fn validate(&self, ctx: &CheckpointContext) -> Result<CheckpointResult>;
}
