//! Registry persistence.
//!
//! Templates and checkpoint overrides can be kept in a YAML document and
//! loaded at startup. Mutation goes through `save()`; nothing here is
//! touched while a decision cycle is running.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointRunner;
use crate::core::template::{Template, TemplateRegistry};
use crate::error::{Result, ShelveError};

/// Overrides for a registered checkpoint, matched by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

/// The persisted registry: `{templates, checkpoints}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointSettings>,
}

impl RegistryDocument {
    /// Register the document's templates and apply checkpoint overrides.
    ///
    /// A template that clashes with an existing name is skipped with a
    /// warning. Returns how many templates were registered.
    pub fn apply(&self, templates: &TemplateRegistry, runner: &mut CheckpointRunner) -> usize {
        let mut registered = 0;
        for template in &self.templates {
            match templates.register_template(template.clone()) {
                Ok(()) => registered += 1,
                Err(e) => tracing::warn!("skipping registry template '{}': {}", template.name, e),
            }
        }
        runner.apply_settings(&self.checkpoints);
        registered
    }

    /// Capture the current checkpoint metadata as overrides.
    pub fn capture_checkpoints(&mut self, runner: &CheckpointRunner) {
        self.checkpoints = runner
            .list()
            .into_iter()
            .map(|(name, meta)| CheckpointSettings {
                name,
                enabled: Some(meta.enabled),
                critical: Some(meta.critical),
                order: Some(meta.order),
            })
            .collect();
    }
}

/// Storage for the registry document.
pub trait RegistryStore: Send + Sync {
    /// Load the document; a store with nothing saved yields the default.
    fn load(&self) -> Result<RegistryDocument>;

    /// Replace the stored document.
    fn save(&self, document: &RegistryDocument) -> Result<()>;
}

/// YAML file store.
#[derive(Debug, Clone)]
pub struct YamlRegistryStore {
    path: PathBuf,
}

impl YamlRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for YamlRegistryStore {
    fn load(&self) -> Result<RegistryDocument> {
        if !self.path.exists() {
            return Ok(RegistryDocument::default());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| ShelveError::storage(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(RegistryDocument::default());
        }
        serde_yaml::from_str(&content).map_err(|e| {
            ShelveError::registry(format!("invalid registry {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, document: &RegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ShelveError::storage(parent, e))?;
            }
        }

        let content = serde_yaml::to_string(document).map_err(|e| ShelveError::serde(e.to_string()))?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "registry.yaml".to_string());
        let temp_path = self.path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&temp_path, content).map_err(|e| ShelveError::storage(&temp_path, e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| ShelveError::storage(&self.path, e))?;
        Ok(())
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    document: RwLock<Option<RegistryDocument>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn load(&self) -> Result<RegistryDocument> {
        let document = self
            .document
            .read()
            .map_err(|_| ShelveError::registry("registry lock poisoned"))?;
        Ok(document.clone().unwrap_or_default())
    }

    fn save(&self, document: &RegistryDocument) -> Result<()> {
        let mut stored = self
            .document
            .write()
            .map_err(|_| ShelveError::registry("registry lock poisoned"))?;
        *stored = Some(document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::default_runner;
    use crate::config::CheckpointsConfig;
    use crate::core::template::FolderDef;
    use tempfile::TempDir;

    fn sketch_template() -> Template {
        Template {
            name: "sketches".to_string(),
            version: 2,
            description: "Loose design sketches".to_string(),
            folders: vec![FolderDef {
                name: "sketches".to_string(),
                description: "Sketches for {topic}".to_string(),
                purpose: "Hold rough drawings".to_string(),
                parent: None,
            }],
            placement_folder: "sketches".to_string(),
            default_filename: "{date}-{topic}.md".to_string(),
            required_documents: Vec::new(),
            workflow: None,
            detection: None,
        }
    }

    #[test]
    fn test_missing_file_loads_default() {
        let temp = TempDir::new().unwrap();
        let store = YamlRegistryStore::new(temp.path().join("nope.yaml"));
        assert_eq!(store.load().unwrap(), RegistryDocument::default());
    }

    #[test]
    fn test_yaml_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = YamlRegistryStore::new(temp.path().join(".shelve/registry.yaml"));

        let document = RegistryDocument {
            templates: vec![sketch_template()],
            checkpoints: vec![CheckpointSettings {
                name: "front_matter".to_string(),
                enabled: Some(false),
                critical: None,
                order: None,
            }],
        };
        store.save(&document).unwrap();

        assert!(store.path().exists());
        assert!(!temp.path().join(".shelve/.registry.yaml.tmp").exists());
        assert_eq!(store.load().unwrap(), document);
    }

    #[test]
    fn test_hand_written_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.yaml");
        fs::write(
            &path,
            r#"
templates:
  - name: sketches
    folders:
      - name: sketches
        description: Sketches
        purpose: Drawings
    placement_folder: sketches
checkpoints:
  - name: diagram_syntax
    critical: true
    order: 5
"#,
        )
        .unwrap();

        let document = YamlRegistryStore::new(&path).load().unwrap();
        assert_eq!(document.templates[0].version, 1);
        assert_eq!(document.templates[0].default_filename, "{date}-{task}.md");
        assert_eq!(document.checkpoints[0].order, Some(5));
        assert_eq!(document.checkpoints[0].enabled, None);
    }

    #[test]
    fn test_invalid_yaml_is_registry_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.yaml");
        fs::write(&path, "templates: [unclosed").unwrap();

        let err = YamlRegistryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ShelveError::Registry { .. }));
    }

    #[test]
    fn test_apply_registers_and_overrides() {
        let templates = TemplateRegistry::with_builtins();
        let before = templates.len();
        let mut runner = default_runner(&CheckpointsConfig::default());

        let mut clash = sketch_template();
        clash.name = "documentation".to_string();
        let document = RegistryDocument {
            templates: vec![sketch_template(), clash],
            checkpoints: vec![CheckpointSettings {
                name: "diagram_syntax".to_string(),
                enabled: None,
                critical: Some(true),
                order: Some(5),
            }],
        };

        assert_eq!(document.apply(&templates, &mut runner), 1);
        assert_eq!(templates.len(), before + 1);
        assert!(templates.get("sketches").is_some());

        let (first, meta) = runner.list().into_iter().next().unwrap();
        assert_eq!(first, "diagram_syntax");
        assert!(meta.critical);
    }

    #[test]
    fn test_capture_checkpoints_round_trip() {
        let mut runner = default_runner(&CheckpointsConfig::default());
        runner.set_enabled("front_matter", false).unwrap();

        let store = MemoryRegistryStore::new();
        let mut document = store.load().unwrap();
        document.capture_checkpoints(&runner);
        store.save(&document).unwrap();

        let mut fresh = default_runner(&CheckpointsConfig::default());
        store
            .load()
            .unwrap()
            .apply(&TemplateRegistry::new(), &mut fresh);
        assert!(!fresh.get_meta("front_matter").unwrap().enabled);
        assert_eq!(fresh.list(), runner.list());
    }
}
