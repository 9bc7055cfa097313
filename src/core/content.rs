//! Input content for a decision cycle.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Well-known context keys.
pub mod keys {
    /// Session that produced the content.
    pub const SESSION_ID: &str = "session_id";
    /// Comma-separated list of files produced earlier in the session.
    pub const PRIOR_FILES: &str = "prior_files";
    /// Project the content probably belongs to.
    pub const PROJECT: &str = "project";
    /// Task name used by templates.
    pub const TASK: &str = "task";
    /// Topic used by templates.
    pub const TOPIC: &str = "topic";
    /// Date used by templates (`YYYY-MM-DD`).
    pub const DATE: &str = "date";
}

/// One piece of content plus the context it was produced in.
///
/// A unit is consumed by exactly one decision cycle and never mutated by it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Raw content.
    pub content: String,
    /// Suggested filename, if the producer had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_hint: Option<String>,
    /// Free-form context (session id, prior files, project hint, ...).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ContentUnit {
    /// Create a unit with no filename hint and an empty context.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Set the filename hint.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename_hint = Some(filename.into());
        self
    }

    /// Add a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Look up a non-empty context value.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Project hint from the context.
    pub fn project_hint(&self) -> Option<&str> {
        self.context_value(keys::PROJECT)
    }

    /// Files produced earlier in the same session.
    pub fn prior_files(&self) -> Vec<String> {
        self.context_value(keys::PRIOR_FILES)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lowercase extension of the filename hint, without the dot.
    pub fn extension(&self) -> Option<String> {
        self.filename_hint
            .as_deref()
            .and_then(|f| Path::new(f).extension())
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Filename hint without its extension.
    pub fn filename_stem(&self) -> Option<String> {
        self.filename_hint
            .as_deref()
            .and_then(|f| Path::new(f).file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
    }

    /// All context values joined into one searchable string.
    pub fn context_text(&self) -> String {
        self.context
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
