//! The encrypted ref store: one record per ref under `refs/`.
//!
//! A ref record is keyed by `"<REF_OID> <ref name>"`. The key fixes the file
//! name, so updating a ref overwrites the same file. The body nonce also
//! covers the target id, so two different targets of one ref are never
//! sealed under the same nonce.
//!
//! ```text
//! filename = hex(seal(key, derive_nonce(key), filename_key))
//! body     = nonce || seal({"ref": ..., "object_id": ...}, nonce, content_key)
//! nonce    = derive_nonce(key + "\n" + object_id)
//! ```

use gre_core::{MirrorLayout, ObjectId, RefPair, REF_OID};
use gre_crypto::{
    decrypt_content_only, derive_nonce, filename_for, seal, split_body, CryptoError, Keys,
};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::records::{list_records, write_atomic};

pub struct RefStore {
    layout: MirrorLayout,
    keys: Keys,
}

fn record_key(name: &str) -> String {
    format!("{REF_OID} {name}")
}

fn body_nonce_input(name: &str, id: &ObjectId) -> String {
    format!("{}\n{id}", record_key(name))
}

impl RefStore {
    pub fn new(layout: MirrorLayout, keys: Keys) -> Self {
        Self { layout, keys }
    }

    fn filename(&self, name: &str) -> SyncResult<String> {
        Ok(filename_for(&record_key(name), &self.keys)?)
    }

    /// Decrypt and cross-check one record.
    fn open_record(&self, filename: &str, body: &[u8]) -> SyncResult<RefPair> {
        let json = decrypt_content_only(body, &self.keys)?;
        let pair: RefPair = serde_json::from_slice(&json)?;

        if self.filename(&pair.name)? != filename {
            return Err(CryptoError::CorruptedRecord(format!(
                "ref record {filename} holds {}, which belongs elsewhere",
                pair.name
            ))
            .into());
        }
        let (nonce, _) = split_body(body)?;
        if nonce != derive_nonce(&body_nonce_input(&pair.name, &pair.object_id), self.keys.salt()) {
            return Err(CryptoError::CorruptedRecord(format!(
                "ref record for {} has a foreign nonce",
                pair.name
            ))
            .into());
        }
        Ok(pair)
    }

    /// Every ref in the store, sorted by name.
    pub fn read(&self) -> SyncResult<Vec<RefPair>> {
        let mut pairs = Vec::new();
        for (filename, path) in list_records(&self.layout.refs_dir())? {
            let body = std::fs::read(&path)?;
            pairs.push(self.open_record(&filename, &body)?);
        }
        pairs.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(refs = pairs.len(), "read ref store");
        Ok(pairs)
    }

    /// The id `name` points at, if the ref exists.
    pub fn lookup(&self, name: &str) -> SyncResult<Option<ObjectId>> {
        let filename = self.filename(name)?;
        let body = match std::fs::read(self.layout.ref_path(&filename)) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let pair = self.open_record(&filename, &body)?;
        if pair.name != name {
            return Err(SyncError::Crypto(CryptoError::CorruptedRecord(format!(
                "lookup of {name} found {}",
                pair.name
            ))));
        }
        Ok(Some(pair.object_id))
    }

    /// Point `name` at `id`. Returns `false` if it already did.
    pub fn write(&self, name: &str, id: &ObjectId) -> SyncResult<bool> {
        if self.lookup(name)?.as_ref() == Some(id) {
            debug!(refname = name, id = %id.short(), "ref unchanged");
            return Ok(false);
        }

        let pair = RefPair::new(name, id.clone());
        let json = serde_json::to_vec(&pair)?;
        let nonce = derive_nonce(&body_nonce_input(name, id), self.keys.salt());
        let sealed = seal(&json, &nonce, self.keys.content())?;
        let mut body = Vec::with_capacity(nonce.len() + sealed.len());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&sealed);

        std::fs::create_dir_all(self.layout.refs_dir())?;
        write_atomic(&self.layout.ref_path(&self.filename(name)?), &body)?;
        info!(refname = name, id = %id.short(), "updated ref");
        Ok(true)
    }
}
