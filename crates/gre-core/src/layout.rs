//! On-disk layout of the encrypted mirror and the local key store.
//!
//! ```text
//! <gitdir>/encrypted/                  mirror working tree (+ its own .git)
//! <gitdir>/encrypted/objects/<hex>     one encrypted object record per file
//! <gitdir>/encrypted/refs/<hex>        one encrypted ref record per file
//! <gitdir>/encrypted/encrypted.json    key derivation parameters
//! <gitdir>/encrypted-keys/keys.json    base64-encoded keys (never pushed)
//! ```

use std::path::{Path, PathBuf};

pub const ENCRYPTED_DIR: &str = "encrypted";
pub const OBJECTS_DIR: &str = "objects";
pub const REFS_DIR: &str = "refs";
pub const META_FILENAME: &str = "encrypted.json";
pub const ENCRYPTED_KEYS_DIR: &str = "encrypted-keys";
pub const KEYS_FILENAME: &str = "keys.json";
pub const CONFIG_FILENAME: &str = "config.toml";

/// Paths inside the encrypted mirror repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    root: PathBuf,
}

impl MirrorLayout {
    /// Layout for the mirror that lives inside a plaintext repository's git dir.
    pub fn for_git_dir(git_dir: &Path) -> Self {
        Self::at(git_dir.join(ENCRYPTED_DIR))
    }

    /// Layout rooted at an arbitrary mirror working tree.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> PathBuf {
        self.root.join(".git")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join(OBJECTS_DIR)
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.root.join(REFS_DIR)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILENAME)
    }

    pub fn object_path(&self, encrypted_filename: &str) -> PathBuf {
        self.objects_dir().join(encrypted_filename)
    }

    pub fn ref_path(&self, encrypted_filename: &str) -> PathBuf {
        self.refs_dir().join(encrypted_filename)
    }

    /// Create the object and ref directories if they are missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.objects_dir())?;
        std::fs::create_dir_all(self.refs_dir())?;
        Ok(())
    }
}

/// Paths of the local (never synchronized) key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    dir: PathBuf,
}

impl KeyLayout {
    pub fn for_git_dir(git_dir: &Path) -> Self {
        Self {
            dir: git_dir.join(ENCRYPTED_KEYS_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn keys_path(&self) -> PathBuf {
        self.dir.join(KEYS_FILENAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_layout_paths() {
        let layout = MirrorLayout::for_git_dir(Path::new("/repo/.git"));
        assert_eq!(layout.root(), Path::new("/repo/.git/encrypted"));
        assert_eq!(layout.objects_dir(), PathBuf::from("/repo/.git/encrypted/objects"));
        assert_eq!(layout.refs_dir(), PathBuf::from("/repo/.git/encrypted/refs"));
        assert_eq!(
            layout.meta_path(),
            PathBuf::from("/repo/.git/encrypted/encrypted.json")
        );
        assert_eq!(layout.git_dir(), PathBuf::from("/repo/.git/encrypted/.git"));
        assert_eq!(
            layout.object_path("abcd"),
            PathBuf::from("/repo/.git/encrypted/objects/abcd")
        );
    }

    #[test]
    fn test_key_layout_paths() {
        let keys = KeyLayout::for_git_dir(Path::new("/repo/.git"));
        assert_eq!(
            keys.keys_path(),
            PathBuf::from("/repo/.git/encrypted-keys/keys.json")
        );
        assert_eq!(
            keys.config_path(),
            PathBuf::from("/repo/.git/encrypted-keys/config.toml")
        );
    }

    #[test]
    fn test_ensure_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = MirrorLayout::at(tmp.path().join("mirror"));
        layout.ensure_dirs().unwrap();
        assert!(layout.objects_dir().is_dir());
        assert!(layout.refs_dir().is_dir());
        // idempotent
        layout.ensure_dirs().unwrap();
    }
}
