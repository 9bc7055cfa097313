//! CLI commands for Shelve.
//!
//! - **organize**: detect, decide, execute and check one file
//! - **detect**: show type scores for a file
//! - **templates**: list registered templates
//! - **validate**: check a raw model response against the decision schema
//! - **stats**: summarise the stats log

pub mod detect;
pub mod organize;
pub mod stats;
pub mod templates;
pub mod validate;

pub use detect::DetectCommand;
pub use organize::OrganizeCommand;
pub use stats::StatsCommand;
pub use templates::TemplatesCommand;
pub use validate::ValidateCommand;

use std::path::Path;
use std::sync::Arc;

use crate::checkpoint::{default_runner, CheckpointRunner};
use crate::config::Config;
use crate::core::content::ContentUnit;
use crate::core::template::TemplateRegistry;
use crate::error::{FailOpen, Result, ShelveError};
use crate::registry::{RegistryStore, YamlRegistryStore};

/// Parse `key=value` pairs given on the command line.
pub fn parse_context(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ShelveError::config(format!(
                "invalid context '{}': expected key=value",
                pair
            ))),
        })
        .collect()
}

/// Build a content unit from CLI input.
pub fn build_unit(
    content: impl Into<String>,
    filename: Option<String>,
    context: &[(String, String)],
) -> ContentUnit {
    let mut unit = ContentUnit::new(content);
    if let Some(filename) = filename {
        unit = unit.with_filename(filename);
    }
    for (key, value) in context {
        unit = unit.with_context(key.clone(), value.clone());
    }
    unit
}

/// Built-in templates and checkpoints plus the project's registry document.
///
/// A registry that cannot be read is reported and ignored.
pub fn load_registries(config: &Config, cwd: &Path) -> (Arc<TemplateRegistry>, CheckpointRunner) {
    let templates = TemplateRegistry::with_builtins();
    let mut runner = default_runner(&config.checkpoints);

    let store = YamlRegistryStore::new(config.registry_path(cwd));
    let document = store
        .load()
        .fail_open_default("failed to load template registry");
    document.apply(&templates, &mut runner);

    (Arc::new(templates), runner)
}
