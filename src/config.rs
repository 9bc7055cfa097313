//! Configuration loading for Shelve.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.shelve/config.toml`)
//! 3. User config (`~/.shelve/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The confidence thresholds are defaults that
//! deployments are expected to tune, so every one of them is exposed here.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ShelveError, Result};

/// Main configuration struct for Shelve.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Type detection configuration.
    pub detection: DetectionConfig,
    /// Decision validation configuration.
    pub validation: ValidationConfig,
    /// AI provider configuration.
    pub ai: AiConfig,
    /// Checkpoint runner configuration.
    pub checkpoints: CheckpointsConfig,
    /// Registry persistence configuration.
    pub registry: RegistryConfig,
}

/// Type detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Score at or above which the template path is taken.
    pub template_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            template_threshold: 0.7,
        }
    }
}

/// Decision validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum decision confidence to be accepted.
    pub confidence_floor: f64,
    /// Minimum promotion confidence when promotion is suggested.
    pub promotion_threshold: f64,
    /// Maximum number of cross references per decision.
    pub max_cross_references: usize,
    /// Top-level folders a file may be placed in without being planned.
    pub always_allowed_folders: Vec<String>,
    /// Minimum length of the decision reasoning.
    pub min_reasoning_length: usize,
    /// Maximum filename length (in characters, extension included).
    pub max_filename_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.3,
            promotion_threshold: 0.7,
            max_cross_references: 10,
            always_allowed_folders: vec![
                "artifacts".to_string(),
                "docs".to_string(),
                "temp".to_string(),
            ],
            min_reasoning_length: 10,
            max_filename_length: 100,
        }
    }
}

/// AI provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    /// Total generation attempts before falling back.
    pub max_retries: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Token budget passed to the generation capability.
    pub max_tokens: u32,
    /// Sampling temperature passed to the generation capability.
    pub temperature: f32,
    /// External command used as the generation capability (prompt on stdin).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Minimum valid max_retries value.
pub const MIN_MAX_RETRIES: u32 = 1;

impl AiConfig {
    /// Check if max_retries is valid (at least one attempt).
    pub fn is_valid_max_retries(value: u32) -> bool {
        value >= MIN_MAX_RETRIES
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_ms: 30_000,
            max_tokens: 2000,
            temperature: 0.2,
            command: None,
        }
    }
}

/// Checkpoint runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckpointsConfig {
    /// Stop running checkpoints after the first critical failure.
    pub stop_on_critical_failure: bool,
    /// Front-matter keys every markdown artifact must carry.
    pub required_front_matter: Vec<String>,
}

impl Default for CheckpointsConfig {
    fn default() -> Self {
        Self {
            stop_on_critical_failure: true,
            required_front_matter: vec!["title".to_string()],
        }
    }
}

/// Registry persistence configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the YAML registry document (relative to the project root).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Check that a threshold is finite and within [0.0, 1.0].
pub fn is_valid_threshold(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Load user config from `~/.shelve/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = shelve_home()?;
        Self::load_from_file(&home.join("config.toml")).ok()
    }

    /// Load project config from `.shelve/config.toml` in the given directory.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        let config_path = cwd.join(".shelve").join("config.toml");
        Self::load_from_file(&config_path).ok()
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| ShelveError::storage(path, e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ShelveError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("detection.template_threshold", self.detection.template_threshold),
            ("validation.confidence_floor", self.validation.confidence_floor),
            (
                "validation.promotion_threshold",
                self.validation.promotion_threshold,
            ),
        ];
        for (key, value) in thresholds {
            if !is_valid_threshold(value) {
                return Err(ShelveError::config(format!(
                    "{} must be in [0.0, 1.0], got {}",
                    key, value
                )));
            }
        }

        if !AiConfig::is_valid_max_retries(self.ai.max_retries) {
            return Err(ShelveError::config(format!(
                "ai.max_retries must be >= {}",
                MIN_MAX_RETRIES
            )));
        }

        if self.validation.max_filename_length < 5 {
            return Err(ShelveError::config(
                "validation.max_filename_length must be >= 5",
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_threshold("SHELVE_TEMPLATE_THRESHOLD") {
            self.detection.template_threshold = v;
        }
        if let Some(v) = env_threshold("SHELVE_CONFIDENCE_FLOOR") {
            self.validation.confidence_floor = v;
        }
        if let Some(v) = env_threshold("SHELVE_PROMOTION_THRESHOLD") {
            self.validation.promotion_threshold = v;
        }

        // SHELVE_MAX_RETRIES
        if let Ok(val) = env::var("SHELVE_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) if AiConfig::is_valid_max_retries(n) => self.ai.max_retries = n,
                _ => eprintln!(
                    "Warning: Invalid SHELVE_MAX_RETRIES value '{}'. \
                    Expected an integer >= {}. Using '{}'.",
                    val, MIN_MAX_RETRIES, self.ai.max_retries
                ),
            }
        }

        // SHELVE_TIMEOUT_MS
        if let Ok(val) = env::var("SHELVE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(n) => self.ai.timeout_ms = n,
                Err(_) => eprintln!(
                    "Warning: Invalid SHELVE_TIMEOUT_MS value '{}'. \
                    Expected a positive integer. Using '{}'.",
                    val, self.ai.timeout_ms
                ),
            }
        }

        // SHELVE_STOP_ON_CRITICAL
        if let Ok(val) = env::var("SHELVE_STOP_ON_CRITICAL") {
            self.checkpoints.stop_on_critical_failure = val == "true" || val == "1";
        }

        // SHELVE_GENERATOR_COMMAND
        if let Ok(val) = env::var("SHELVE_GENERATOR_COMMAND") {
            if val.trim().is_empty() {
                self.ai.command = None;
            } else {
                self.ai.command = Some(val);
            }
        }
    }

    /// Merge another config into this one.
    ///
    /// Field-by-field: every non-default value in `other` wins. A layer cannot
    /// set a value back to its default to undo a lower layer's customization.
    fn merge(mut self, other: Config) -> Self {
        let default_detection = DetectionConfig::default();
        if other.detection.template_threshold != default_detection.template_threshold {
            self.detection.template_threshold = other.detection.template_threshold;
        }

        let dv = ValidationConfig::default();
        if other.validation.confidence_floor != dv.confidence_floor {
            self.validation.confidence_floor = other.validation.confidence_floor;
        }
        if other.validation.promotion_threshold != dv.promotion_threshold {
            self.validation.promotion_threshold = other.validation.promotion_threshold;
        }
        if other.validation.max_cross_references != dv.max_cross_references {
            self.validation.max_cross_references = other.validation.max_cross_references;
        }
        if other.validation.always_allowed_folders != dv.always_allowed_folders {
            self.validation.always_allowed_folders = other.validation.always_allowed_folders;
        }
        if other.validation.min_reasoning_length != dv.min_reasoning_length {
            self.validation.min_reasoning_length = other.validation.min_reasoning_length;
        }
        if other.validation.max_filename_length != dv.max_filename_length {
            self.validation.max_filename_length = other.validation.max_filename_length;
        }

        let da = AiConfig::default();
        if other.ai.max_retries != da.max_retries {
            self.ai.max_retries = other.ai.max_retries;
        }
        if other.ai.timeout_ms != da.timeout_ms {
            self.ai.timeout_ms = other.ai.timeout_ms;
        }
        if other.ai.max_tokens != da.max_tokens {
            self.ai.max_tokens = other.ai.max_tokens;
        }
        if other.ai.temperature != da.temperature {
            self.ai.temperature = other.ai.temperature;
        }
        if other.ai.command.is_some() {
            self.ai.command = other.ai.command;
        }

        let dc = CheckpointsConfig::default();
        if other.checkpoints.stop_on_critical_failure != dc.stop_on_critical_failure {
            self.checkpoints.stop_on_critical_failure = other.checkpoints.stop_on_critical_failure;
        }
        if other.checkpoints.required_front_matter != dc.required_front_matter {
            self.checkpoints.required_front_matter = other.checkpoints.required_front_matter;
        }

        if other.registry.path.is_some() {
            self.registry.path = other.registry.path;
        }

        self
    }

    /// Save configuration to the project config file.
    ///
    /// Writes `.shelve/config.toml` via temp file + rename.
    pub fn save_project(&self, cwd: &Path) -> Result<()> {
        let shelve_dir = cwd.join(".shelve");

        if !shelve_dir.exists() {
            fs::create_dir_all(&shelve_dir).map_err(|e| ShelveError::storage(&shelve_dir, e))?;
        }

        let config_path = shelve_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| ShelveError::config(e.to_string()))?;

        let temp_path = shelve_dir.join(".config.toml.tmp");
        fs::write(&temp_path, &content).map_err(|e| ShelveError::storage(&temp_path, e))?;
        fs::rename(&temp_path, &config_path).map_err(|e| ShelveError::storage(&config_path, e))?;

        Ok(())
    }

    /// Resolve the registry document path for a project directory.
    ///
    /// An explicit `registry.path` wins; otherwise `.shelve/registry.yaml`.
    pub fn registry_path(&self, cwd: &Path) -> PathBuf {
        match &self.registry.path {
            Some(path) => {
                let path = PathBuf::from(path);
                if path.is_absolute() {
                    path
                } else {
                    cwd.join(path)
                }
            }
            None => cwd.join(".shelve").join("registry.yaml"),
        }
    }
}

/// Read a threshold from the environment, warning about invalid values.
fn env_threshold(key: &str) -> Option<f64> {
    let val = env::var(key).ok()?;
    match val.parse::<f64>() {
        Ok(n) if is_valid_threshold(n) => Some(n),
        _ => {
            eprintln!(
                "Warning: Invalid {} value '{}'. Must be a number in [0.0, 1.0]. Ignoring.",
                key, val
            );
            None
        }
    }
}

/// Get the Shelve home directory.
///
/// Checks `SHELVE_HOME` first, then falls back to `~/.shelve`.
pub fn shelve_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("SHELVE_HOME") {
        if home.is_empty() {
            tracing::warn!("SHELVE_HOME is empty, using default");
        } else {
            return Some(PathBuf::from(home));
        }
    }

    dirs::home_dir().map(|home| home.join(".shelve"))
}

/// Get the project stats log path.
///
/// Returns `<cwd>/.shelve/stats.log`.
pub fn project_stats_log_path(cwd: &Path) -> PathBuf {
    cwd.join(".shelve").join("stats.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!((config.detection.template_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.validation.confidence_floor - 0.3).abs() < f64::EPSILON);
        assert!((config.validation.promotion_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.validation.max_cross_references, 10);
        assert_eq!(
            config.validation.always_allowed_folders,
            vec!["artifacts", "docs", "temp"]
        );
        assert_eq!(config.ai.max_retries, 3);
        assert_eq!(config.ai.timeout_ms, 30_000);
        assert!(config.ai.command.is_none());
        assert!(config.checkpoints.stop_on_critical_failure);
        assert_eq!(config.checkpoints.required_front_matter, vec!["title"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let toml_content = r#"
[detection]
template_threshold = 0.8

[ai]
max_retries = 5
command = "llm -m local"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();

        assert!((config.detection.template_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.ai.max_retries, 5);
        assert_eq!(config.ai.command.as_deref(), Some("llm -m local"));
        // Untouched sections keep defaults
        assert_eq!(config.validation.max_cross_references, 10);
    }

    #[test]
    fn test_load_from_file_rejects_out_of_range_threshold() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[validation]\nconfidence_floor = 1.5\n").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("validation.confidence_floor"));
    }

    #[test]
    fn test_load_from_file_rejects_zero_retries() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[ai]\nmax_retries = 0\n").unwrap();

        assert!(Config::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "this is not valid toml [[[").unwrap();

        assert!(Config::load_from_file(&config_path).is_err());
    }

    #[test]
    #[serial]
    fn test_project_config_precedence() {
        let dir = TempDir::new().unwrap();
        let shelve_dir = dir.path().join(".shelve");
        fs::create_dir_all(&shelve_dir).unwrap();
        fs::write(
            shelve_dir.join("config.toml"),
            "[checkpoints]\nstop_on_critical_failure = false\n",
        )
        .unwrap();

        let config = Config::load_from_cwd(dir.path());

        assert!(!config.checkpoints.stop_on_critical_failure);
        assert_eq!(config.ai.max_retries, 3);
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        env::set_var("SHELVE_TEMPLATE_THRESHOLD", "0.55");
        env::set_var("SHELVE_CONFIDENCE_FLOOR", "0.4");
        env::set_var("SHELVE_MAX_RETRIES", "6");
        env::set_var("SHELVE_TIMEOUT_MS", "1500");
        env::set_var("SHELVE_STOP_ON_CRITICAL", "false");
        env::set_var("SHELVE_GENERATOR_COMMAND", "cat");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert!((config.detection.template_threshold - 0.55).abs() < f64::EPSILON);
        assert!((config.validation.confidence_floor - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.ai.max_retries, 6);
        assert_eq!(config.ai.timeout_ms, 1500);
        assert!(!config.checkpoints.stop_on_critical_failure);
        assert_eq!(config.ai.command.as_deref(), Some("cat"));

        env::remove_var("SHELVE_TEMPLATE_THRESHOLD");
        env::remove_var("SHELVE_CONFIDENCE_FLOOR");
        env::remove_var("SHELVE_MAX_RETRIES");
        env::remove_var("SHELVE_TIMEOUT_MS");
        env::remove_var("SHELVE_STOP_ON_CRITICAL");
        env::remove_var("SHELVE_GENERATOR_COMMAND");
    }

    #[test]
    #[serial]
    fn test_env_var_invalid_values_ignored() {
        env::set_var("SHELVE_PROMOTION_THRESHOLD", "2.0");
        env::set_var("SHELVE_MAX_RETRIES", "0");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert!((config.validation.promotion_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.ai.max_retries, 3);

        env::remove_var("SHELVE_PROMOTION_THRESHOLD");
        env::remove_var("SHELVE_MAX_RETRIES");
    }

    #[test]
    fn test_merge_configs() {
        let override_config = Config {
            ai: AiConfig {
                max_retries: 4,
                ..AiConfig::default()
            },
            ..Config::default()
        };

        let merged = Config::default().merge(override_config);

        assert_eq!(merged.ai.max_retries, 4);
        assert_eq!(merged.ai.timeout_ms, 30_000);
    }

    #[test]
    fn test_save_project_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.validation.max_cross_references = 4;

        config.save_project(dir.path()).unwrap();
        let loaded = Config::load_from_file(&dir.path().join(".shelve/config.toml")).unwrap();

        assert_eq!(loaded.validation.max_cross_references, 4);
    }

    #[test]
    fn test_registry_path_resolution() {
        let cwd = Path::new("/work/project");
        let mut config = Config::default();
        assert_eq!(
            config.registry_path(cwd),
            PathBuf::from("/work/project/.shelve/registry.yaml")
        );

        config.registry.path = Some("conf/registry.yaml".to_string());
        assert_eq!(
            config.registry_path(cwd),
            PathBuf::from("/work/project/conf/registry.yaml")
        );

        config.registry.path = Some("/etc/shelve/registry.yaml".to_string());
        assert_eq!(
            config.registry_path(cwd),
            PathBuf::from("/etc/shelve/registry.yaml")
        );
    }

    #[test]
    #[serial]
    fn test_shelve_home_with_env() {
        let dir = TempDir::new().unwrap();
        env::set_var("SHELVE_HOME", dir.path().to_str().unwrap());

        assert_eq!(shelve_home().unwrap(), dir.path());

        env::remove_var("SHELVE_HOME");
    }
}
