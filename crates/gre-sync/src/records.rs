//! File-level helpers shared by the object and ref record directories.

use std::path::{Path, PathBuf};

use crate::error::SyncResult;

/// Record files in `dir` as `(file name, path)`, sorted by name.
///
/// A missing directory is empty. Dotfiles (including in-flight temp files)
/// are not records.
pub fn list_records(dir: &Path) -> SyncResult<Vec<(String, PathBuf)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        records.push((name, entry.path()));
    }
    records.sort();
    Ok(records)
}

/// Write `bytes` to `path` through a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> SyncResult<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_missing_dir_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(list_records(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_list_skips_dotfiles_and_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("bb"), b"2").unwrap();
        std::fs::write(tmp.path().join("aa"), b"1").unwrap();
        std::fs::write(tmp.path().join(".aa.tmp"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("cc")).unwrap();

        let names: Vec<String> = list_records(tmp.path())
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["aa", "bb"]);
    }

    #[test]
    fn test_write_atomic_replaces() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("record");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(list_records(tmp.path()).unwrap().len(), 1);
    }
}
