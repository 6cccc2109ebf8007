//! `encrypted.json`: per-mirror key derivation parameters, written once.

use gre_core::config::KdfConfig;
use gre_core::{GreError, MirrorLayout};
use gre_crypto::KdfParams;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SyncResult;
use crate::records::write_atomic;

pub const META_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMeta {
    pub version: u32,
    pub derivation_params: KdfParams,
}

impl EncryptedMeta {
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R, kdf: &KdfConfig) -> Self {
        Self {
            version: META_VERSION,
            derivation_params: KdfParams::generate(
                rng,
                kdf.salt_bytes,
                kdf.cpu_cost,
                kdf.block_size,
                kdf.parallelization_cost,
            ),
        }
    }
}

/// Read the mirror's metadata, if it has any.
pub fn read_meta(layout: &MirrorLayout) -> SyncResult<Option<EncryptedMeta>> {
    let raw = match std::fs::read(layout.meta_path()) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta: EncryptedMeta = serde_json::from_slice(&raw)?;
    if meta.version != META_VERSION {
        return Err(GreError::Config(format!(
            "unsupported {} version {}",
            gre_core::layout::META_FILENAME,
            meta.version
        ))
        .into());
    }
    Ok(Some(meta))
}

/// Existing metadata, or freshly generated metadata written to the mirror.
pub fn ensure_meta(layout: &MirrorLayout, kdf: &KdfConfig) -> SyncResult<EncryptedMeta> {
    if let Some(meta) = read_meta(layout)? {
        return Ok(meta);
    }
    let meta = EncryptedMeta::generate(&mut rand::rngs::OsRng, kdf);
    std::fs::create_dir_all(layout.root())?;
    write_atomic(&layout.meta_path(), &serde_json::to_vec_pretty(&meta)?)?;
    info!(path = %layout.meta_path().display(), "created mirror metadata");
    Ok(meta)
}
