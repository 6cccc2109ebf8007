//! The content / filename / salt key triple and its on-disk form (`keys.json`).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::{DERIVED_BLOCK_SIZE, KEY_SIZE};

/// The three independent 256-bit keys protecting one mirror.
///
/// Immutable once created and zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Keys {
    content: [u8; KEY_SIZE],
    filename: [u8; KEY_SIZE],
    salt: [u8; KEY_SIZE],
}

impl Keys {
    pub fn from_parts(
        content: [u8; KEY_SIZE],
        filename: [u8; KEY_SIZE],
        salt: [u8; KEY_SIZE],
    ) -> Self {
        Self {
            content,
            filename,
            salt,
        }
    }

    /// Split a 96-byte KDF output into `content | filename | salt`.
    pub fn from_derived_block(block: &[u8; DERIVED_BLOCK_SIZE]) -> Self {
        let mut content = [0u8; KEY_SIZE];
        let mut filename = [0u8; KEY_SIZE];
        let mut salt = [0u8; KEY_SIZE];
        content.copy_from_slice(&block[..KEY_SIZE]);
        filename.copy_from_slice(&block[KEY_SIZE..2 * KEY_SIZE]);
        salt.copy_from_slice(&block[2 * KEY_SIZE..]);
        Self::from_parts(content, filename, salt)
    }

    /// Generate three random keys.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut content = [0u8; KEY_SIZE];
        let mut filename = [0u8; KEY_SIZE];
        let mut salt = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut content);
        rng.fill_bytes(&mut filename);
        rng.fill_bytes(&mut salt);
        Self::from_parts(content, filename, salt)
    }

    pub fn content(&self) -> &[u8; KEY_SIZE] {
        &self.content
    }

    pub fn filename(&self) -> &[u8; KEY_SIZE] {
        &self.filename
    }

    pub fn salt(&self) -> &[u8; KEY_SIZE] {
        &self.salt
    }

    fn to_file(&self) -> KeysFile {
        KeysFile {
            content: STANDARD.encode(self.content),
            filename: STANDARD.encode(self.filename),
            salt: STANDARD.encode(self.salt),
        }
    }

    fn from_file(file: &KeysFile) -> CryptoResult<Self> {
        Ok(Self::from_parts(
            decode_key("content", &file.content)?,
            decode_key("filename", &file.filename)?,
            decode_key("salt", &file.salt)?,
        ))
    }
}

impl Drop for Keys {
    fn drop(&mut self) {
        self.content.zeroize();
        self.filename.zeroize();
        self.salt.zeroize();
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("content", &"[REDACTED]")
            .field("filename", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

/// JSON shape of `keys.json`: each key base64 encoded.
#[derive(Serialize, Deserialize)]
struct KeysFile {
    content: String,
    filename: String,
    salt: String,
}

impl Drop for KeysFile {
    fn drop(&mut self) {
        self.content.zeroize();
        self.filename.zeroize();
        self.salt.zeroize();
    }
}

fn decode_key(name: &str, encoded: &str) -> CryptoResult<[u8; KEY_SIZE]> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyFile(format!("{name} key is not base64: {e}")))?,
    );
    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::KeyFile(format!(
            "{name} key has wrong size: {} bytes (expected {KEY_SIZE})",
            bytes.len()
        )));
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Write keys to `path` as JSON, atomically (temp + rename).
///
/// The parent directory is created if needed; on unix the file is 0600.
pub fn save_keys(path: &Path, keys: &Keys) -> CryptoResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = Zeroizing::new(
        serde_json::to_string(&keys.to_file())
            .map_err(|e| CryptoError::KeyFile(format!("serializing keys: {e}")))?,
    );

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp, path)?;

    tracing::debug!(path = %path.display(), "saved keys");
    Ok(())
}

/// Read keys written by [`save_keys`].
pub fn load_keys(path: &Path) -> CryptoResult<Keys> {
    let json = Zeroizing::new(std::fs::read_to_string(path)?);
    let file: KeysFile = serde_json::from_str(&json)
        .map_err(|e| CryptoError::KeyFile(format!("{}: {e}", path.display())))?;
    Keys::from_file(&file)
}
