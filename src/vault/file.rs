//! Filesystem vault for Shelve.
//!
//! Folders and files live under a root directory. Files are written via
//! temp file + rename and never replace an existing file.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::core::decision::Decision;
use crate::error::{Result, ShelveError};
use crate::util::read_to_string_limited;
use crate::vault::traits::{join_relative, unique_filename, ExecutionOutcome, Executor};

/// Vault rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    /// Open a vault, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| ShelveError::storage(&root, e))?;
        }
        Ok(Self { root })
    }

    /// The vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a vault-relative path, refusing anything that escapes the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ShelveError::execution(format!(
                "path '{}' escapes the vault",
                relative
            )));
        }
        Ok(self.root.join(rel))
    }

    /// Write a file atomically using temp file + rename.
    fn atomic_write(&self, final_path: &Path, content: &str) -> Result<()> {
        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = final_path.with_file_name(format!(".{}.tmp", file_name));

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| ShelveError::storage(&temp_path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| ShelveError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| ShelveError::storage(&temp_path, e))?;
        }

        fs::rename(&temp_path, final_path).map_err(|e| ShelveError::storage(final_path, e))?;
        Ok(())
    }

    fn collect_files(&self, dir: &Path, prefix: &str, out: &mut BTreeSet<String>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| ShelveError::storage(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ShelveError::storage(dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            // Hidden entries hold tool state (.shelve, .obsidian, temp files).
            if name.starts_with('.') {
                continue;
            }
            let relative = join_relative(prefix, &name);
            let file_type = entry
                .file_type()
                .map_err(|e| ShelveError::storage(entry.path(), e))?;
            if file_type.is_dir() {
                self.collect_files(&entry.path(), &relative, out)?;
            } else if file_type.is_file() {
                out.insert(relative);
            }
        }
        Ok(())
    }
}

impl Executor for FsVault {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn try_execute(&self, decision: &Decision, content: &str) -> Result<ExecutionOutcome> {
        let folder_rel = decision.file_placement.folder_path.trim_matches('/');
        let folder_path = self.resolve(folder_rel)?;

        let mut folders = decision.planned_paths();
        folders.push(folder_rel.to_string());

        // Resolve everything before touching the disk.
        let resolved: Vec<(String, PathBuf)> = folders
            .into_iter()
            .filter(|f| !f.is_empty())
            .map(|f| self.resolve(&f).map(|p| (f, p)))
            .collect::<Result<_>>()?;

        let mut folders_created = Vec::new();
        for (folder, path) in resolved {
            if !path.exists() {
                fs::create_dir_all(&path).map_err(|e| ShelveError::storage(&path, e))?;
                folders_created.push(folder);
            }
        }

        let filename = unique_filename(&decision.file_placement.filename, |candidate| {
            folder_path.join(candidate).exists()
        });
        let relative = join_relative(folder_rel, &filename);
        let final_path = self.resolve(&relative)?;

        self.atomic_write(&final_path, content)?;
        tracing::debug!("wrote {}", final_path.display());

        Ok(ExecutionOutcome::succeeded(folders_created, relative))
    }

    fn list_files(&self) -> Result<BTreeSet<String>> {
        let mut files = BTreeSet::new();
        if self.root.exists() {
            self.collect_files(&self.root, "", &mut files)?;
        }
        Ok(files)
    }

    fn read_file(&self, relative: &str) -> Result<Option<String>> {
        let path = self.resolve(relative)?;
        if !path.is_file() {
            return Ok(None);
        }
        read_to_string_limited(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decision::tests::sample_decision;
    use tempfile::TempDir;

    fn create_vault() -> (FsVault, TempDir) {
        let temp = TempDir::new().unwrap();
        let vault = FsVault::open(temp.path().join("vault")).unwrap();
        (vault, temp)
    }

    #[test]
    fn test_open_creates_root() {
        let (vault, _temp) = create_vault();
        assert!(vault.root().is_dir());
    }

    #[test]
    fn test_execute_creates_folders_and_file() {
        let (vault, _temp) = create_vault();
        let outcome = vault.execute(&sample_decision(), "# Survey");

        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.file_path, "research/sources/caching-survey.md");
        assert_eq!(outcome.folders_created, vec!["research", "research/sources"]);
        assert_eq!(
            fs::read_to_string(vault.root().join("research/sources/caching-survey.md")).unwrap(),
            "# Survey"
        );
    }

    #[test]
    fn test_execute_never_overwrites() {
        let (vault, _temp) = create_vault();
        let first = vault.execute(&sample_decision(), "one");
        let second = vault.execute(&sample_decision(), "two");
        let third = vault.execute(&sample_decision(), "three");

        assert_eq!(first.file_path, "research/sources/caching-survey.md");
        assert_eq!(second.file_path, "research/sources/caching-survey-1.md");
        assert_eq!(third.file_path, "research/sources/caching-survey-2.md");
        assert!(second.folders_created.is_empty());
        assert_eq!(vault.read_file(&first.file_path).unwrap().as_deref(), Some("one"));
    }

    #[test]
    fn test_execute_refuses_escape() {
        let (vault, _temp) = create_vault();
        let mut decision = sample_decision();
        decision.file_placement.folder_path = "../outside".to_string();

        let outcome = vault.execute(&decision, "x");
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("escapes"));
    }

    #[test]
    fn test_list_files_skips_hidden() {
        let (vault, _temp) = create_vault();
        vault.execute(&sample_decision(), "x");
        fs::create_dir_all(vault.root().join(".shelve")).unwrap();
        fs::write(vault.root().join(".shelve/stats.log"), "").unwrap();

        let files = vault.list_files().unwrap();
        assert_eq!(
            files.into_iter().collect::<Vec<_>>(),
            vec!["research/sources/caching-survey.md"]
        );
    }

    #[test]
    fn test_read_missing_file() {
        let (vault, _temp) = create_vault();
        assert!(vault.read_file("nope.md").unwrap().is_none());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (vault, _temp) = create_vault();
        vault.execute(&sample_decision(), "x");
        let names: Vec<String> = fs::read_dir(vault.root().join("research/sources"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["caching-survey.md"]);
    }
}
