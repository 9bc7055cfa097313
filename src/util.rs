//! Utility functions for Shelve.
//!
//! Name sanitization shared by templates, the fallback provider and the
//! validator, plus bounded file reads for checkpoints.

use std::fs;
use std::path::Path;

use crate::error::{Result, ShelveError};

/// Characters that may not appear in folder names or filenames.
pub const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Extension forced onto filenames that lack one.
pub const DEFAULT_EXTENSION: &str = "md";

/// Maximum file size that can be read into memory (10 MB).
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Whether `c` is reserved or a control character.
pub fn is_reserved_char(c: char) -> bool {
    RESERVED_CHARS.contains(&c) || c.is_control()
}

/// Whether `name` ends in a non-empty alphanumeric extension after a non-empty stem.
pub fn has_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Turn an arbitrary string into a lowercase, hyphenated path segment.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Make a filename safe for the vault.
///
/// Keeps only the last path component, strips reserved characters, turns
/// whitespace runs into `-`, forces an extension and caps the length at
/// `max_len` characters while preserving the extension.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mut cleaned = String::with_capacity(base.len());
    let mut in_space = false;
    for c in base.chars() {
        if c.is_whitespace() {
            in_space = true;
            continue;
        }
        if is_reserved_char(c) {
            continue;
        }
        if in_space && !cleaned.is_empty() {
            cleaned.push('-');
        }
        in_space = false;
        cleaned.push(c);
    }

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '-');
    let mut result = if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    };

    if !has_extension(&result) {
        result = format!("{}.{}", result, DEFAULT_EXTENSION);
    }

    cap_length(&result, max_len)
}

/// Truncate the stem so the whole name fits in `max_len` characters.
fn cap_length(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }

    let (stem, mut ext) = name.rsplit_once('.').unwrap_or((name, DEFAULT_EXTENSION));
    if ext.chars().count() + 2 > max_len {
        ext = DEFAULT_EXTENSION;
    }
    let ext_len = ext.chars().count() + 1;
    let keep = max_len.saturating_sub(ext_len).max(1);
    let stem: String = stem.chars().take(keep).collect();
    let stem = stem.trim_end_matches(['.', '-']);
    let stem = if stem.is_empty() { "x" } else { stem };

    format!("{}.{}", stem, ext)
}

/// Read a file into a string, refusing files over `MAX_FILE_SIZE`.
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}

/// Read a file into a string, refusing files over `max_size` bytes.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| ShelveError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(ShelveError::execution(format!(
            "File {} is too large ({} bytes, max {} bytes)",
            path.display(),
            size,
            max_size
        )));
    }

    fs::read_to_string(path).map_err(|e| ShelveError::storage(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_has_extension() {
        assert!(has_extension("util.py"));
        assert!(has_extension("archive.tar.gz"));
        assert!(!has_extension("README"));
        assert!(!has_extension(".bashrc"));
        assert!(!has_extension("notes."));
        assert!(!has_extension("weird.e x"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Login Flow"), "login-flow");
        assert_eq!(slugify("  API: v2 / beta  "), "api-v2-beta");
        assert_eq!(slugify("2026-01-02"), "2026-01-02");
        assert_eq!(slugify("!!!"), "untitled");
    }

    #[test]
    fn test_sanitize_keeps_clean_names() {
        assert_eq!(sanitize_filename("util.py", 100), "util.py");
    }

    #[test]
    fn test_sanitize_strips_reserved_and_paths() {
        assert_eq!(sanitize_filename("../etc/pa*ss?wd.txt", 100), "passwd.txt");
        assert_eq!(sanitize_filename("C:\\tmp\\a<b>.md", 100), "ab.md");
    }

    #[test]
    fn test_sanitize_whitespace_and_extension() {
        assert_eq!(sanitize_filename("meeting notes  today", 100), "meeting-notes-today.md");
        assert_eq!(sanitize_filename("", 100), "untitled.md");
        assert_eq!(sanitize_filename("...", 100), "untitled.md");
    }

    #[test]
    fn test_sanitize_caps_length_preserving_extension() {
        let long = format!("{}.py", "a".repeat(300));
        let capped = sanitize_filename(&long, 20);
        assert_eq!(capped.chars().count(), 20);
        assert!(capped.ends_with(".py"));
    }

    #[test]
    fn test_read_to_string_limited_success() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("note.md");
        fs::write(&path, "# Title").unwrap();

        assert_eq!(read_to_string_limited(&path).unwrap(), "# Title");
    }

    #[test]
    fn test_read_to_string_limited_nonexistent() {
        let temp = TempDir::new().unwrap();
        let result = read_to_string_limited(&temp.path().join("missing.md"));
        assert!(matches!(result, Err(ShelveError::Storage { .. })));
    }

    #[test]
    fn test_read_to_string_with_limit_exceeds() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("large.txt");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&[b'x'; 1000]).unwrap();

        let err = read_to_string_with_limit(&path, 500).unwrap_err().to_string();
        assert!(err.contains("too large"));
        assert!(err.contains("max 500 bytes"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_sanitized_names_are_valid(name in ".{0,300}", max in 5usize..120) {
                let clean = sanitize_filename(&name, max);
                prop_assert!(clean.chars().count() <= max);
                prop_assert!(has_extension(&clean));
                prop_assert!(!clean.chars().any(is_reserved_char));
            }

            #[test]
            fn prop_sanitize_is_idempotent(name in "[a-zA-Z0-9 ._-]{0,60}") {
                let once = sanitize_filename(&name, 80);
                prop_assert_eq!(sanitize_filename(&once, 80), once.clone());
            }
        }
    }
}
