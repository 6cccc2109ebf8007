use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::GreResult;
use crate::layout::KeyLayout;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "GIT_ENCRYPTED_CONFIG";

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GreConfig {
    pub log: LogConfig,
    pub sync: SyncConfig,
    pub kdf: KdfConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (default: warn). `RUST_LOG` takes precedence.
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Object copy worker threads (0 = one per CPU)
    pub workers: usize,
    /// Branch of the mirror repository that is pulled from / pushed to
    pub mirror_branch: String,
    /// Author name recorded on mirror commits
    pub commit_author: String,
    /// Author email recorded on mirror commits
    pub commit_email: String,
    /// Message recorded on mirror commits
    pub commit_message: String,
    /// Check every imported object id against the id sealed in its record
    pub verify_ids: bool,
    /// Reject non-forced pushes that would rewind a ref
    pub enforce_fast_forward: bool,
}

/// Defaults for newly created mirrors. Existing mirrors keep the parameters
/// stored in their `encrypted.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// scrypt N (must be a power of two)
    pub cpu_cost: u32,
    /// scrypt r
    pub block_size: u32,
    /// scrypt p
    pub parallelization_cost: u32,
    /// Random salt length in bytes before base64 encoding
    pub salt_bytes: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            mirror_branch: "main".into(),
            commit_author: "Encryption".into(),
            commit_email: "encryption@localhost".into(),
            commit_message: "Encrypted push".into(),
            verify_ids: true,
            enforce_fast_forward: false,
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            cpu_cost: 1024,
            block_size: 8,
            parallelization_cost: 1,
            salt_bytes: 32,
        }
    }
}

impl GreConfig {
    /// Parse a config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> GreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Resolve the config for a plaintext repository.
    ///
    /// Order: `$GIT_ENCRYPTED_CONFIG`, then `<gitdir>/encrypted-keys/config.toml`,
    /// then built-in defaults.
    pub fn load(git_dir: &Path) -> GreResult<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(explicit.as_deref(), git_dir)
    }

    fn load_from(explicit: Option<&Path>, git_dir: &Path) -> GreResult<Self> {
        if let Some(path) = explicit {
            tracing::debug!(path = %path.display(), "loading config from environment");
            return Self::from_file(path);
        }
        let default_path = KeyLayout::for_git_dir(git_dir).config_path();
        if default_path.is_file() {
            tracing::debug!(path = %default_path.display(), "loading config");
            return Self::from_file(&default_path);
        }
        Ok(Self::default())
    }
}
