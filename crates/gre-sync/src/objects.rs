//! Copying objects between a plaintext repository and the encrypted mirror.
//!
//! Each object becomes one record under `objects/`. Records are append-only:
//! an existing record is never rewritten, and since encryption is
//! deterministic an existing record is already the one we would write.

use std::collections::BTreeSet;

use gre_core::{MirrorLayout, ObjectId};
use gre_crypto::{decrypt_content_only, decrypt_file, encrypt_file, filename_for, CryptoError, Keys};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::codec;
use crate::error::{SyncError, SyncResult};
use crate::git::GitRepository;
use crate::records::{list_records, write_atomic};

/// Counts from one copy pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Objects written to the destination
    pub written: usize,
    /// Objects the destination already had
    pub skipped: usize,
}

impl CopyStats {
    fn from_flags(flags: &[bool]) -> Self {
        let written = flags.iter().filter(|w| **w).count();
        Self {
            written,
            skipped: flags.len() - written,
        }
    }
}

pub struct ObjectSync {
    layout: MirrorLayout,
    keys: Keys,
    pool: ThreadPool,
    verify_ids: bool,
}

impl ObjectSync {
    /// `workers` bounds concurrent object copies; 0 picks rayon's default.
    pub fn new(layout: MirrorLayout, keys: Keys, workers: usize) -> SyncResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("gre-copy-{i}"))
            .build()
            .map_err(|e| SyncError::ThreadPool(e.to_string()))?;
        Ok(Self {
            layout,
            keys,
            pool,
            verify_ids: true,
        })
    }

    /// Check imported records against the id sealed in their file name.
    pub fn verify_ids(mut self, verify: bool) -> Self {
        self.verify_ids = verify;
        self
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    /// Encrypt `ids` from `repo` into the mirror's object directory.
    pub fn copy_to_mirror<R: GitRepository + ?Sized>(
        &self,
        ids: &BTreeSet<ObjectId>,
        repo: &R,
    ) -> SyncResult<CopyStats> {
        self.layout.ensure_dirs()?;
        let flags: Vec<bool> = self.pool.install(|| {
            ids.par_iter()
                .map(|id| self.export_one(id, repo))
                .collect::<SyncResult<Vec<bool>>>()
        })?;

        let stats = CopyStats::from_flags(&flags);
        info!(written = stats.written, skipped = stats.skipped, "copied objects to mirror");
        Ok(stats)
    }

    fn export_one<R: GitRepository + ?Sized>(&self, id: &ObjectId, repo: &R) -> SyncResult<bool> {
        let path = self.layout.object_path(&filename_for(id.as_str(), &self.keys)?);
        if path.exists() {
            debug!(id = %id.short(), "record exists");
            return Ok(false);
        }

        let deflated = repo.read_object(id)?.into_deflated()?;
        let record = encrypt_file(id.as_str(), &deflated, &self.keys)?;
        write_atomic(&path, &record.body)?;
        debug!(id = %id.short(), bytes = record.body.len(), "encrypted object");
        Ok(true)
    }

    /// Decrypt every object record in the mirror into `repo`.
    pub fn copy_from_mirror<R: GitRepository + ?Sized>(&self, repo: &R) -> SyncResult<CopyStats> {
        let records = list_records(&self.layout.objects_dir())?;
        let flags: Vec<bool> = self.pool.install(|| {
            records
                .par_iter()
                .map(|(name, path)| {
                    let body = std::fs::read(path)?;
                    self.import_one(name, &body, repo)
                })
                .collect::<SyncResult<Vec<bool>>>()
        })?;

        let stats = CopyStats::from_flags(&flags);
        info!(written = stats.written, skipped = stats.skipped, "copied objects from mirror");
        Ok(stats)
    }

    fn import_one<R: GitRepository + ?Sized>(
        &self,
        filename: &str,
        body: &[u8],
        repo: &R,
    ) -> SyncResult<bool> {
        if !self.verify_ids {
            let wrapped = codec::inflate(&decrypt_content_only(body, &self.keys)?)?;
            repo.write_object(&wrapped)?;
            return Ok(true);
        }

        let (sealed_id, deflated) = decrypt_file(filename, body, &self.keys)?;
        let id: ObjectId = sealed_id.parse()?;
        if repo.has_object(&id)? {
            return Ok(false);
        }

        let wrapped = codec::inflate(&deflated)?;
        let written = repo.write_object(&wrapped)?;
        if written != id {
            return Err(CryptoError::CorruptedRecord(format!(
                "record for {id} holds content hashing to {written}"
            ))
            .into());
        }
        debug!(id = %id.short(), "imported object");
        Ok(true)
    }

    /// Whether the mirror holds a record for `id`.
    pub fn has_record(&self, id: &ObjectId) -> SyncResult<bool> {
        let path = self.layout.object_path(&filename_for(id.as_str(), &self.keys)?);
        Ok(path.is_file())
    }

    /// Decrypt the single record for `id`, returning the wrapped object.
    pub fn read_encrypted_object(&self, id: &ObjectId) -> SyncResult<Vec<u8>> {
        let filename = filename_for(id.as_str(), &self.keys)?;
        let body = match std::fs::read(self.layout.object_path(&filename)) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::NotFound(format!("encrypted object {id}")));
            }
            Err(e) => return Err(e.into()),
        };

        let (sealed_id, deflated) = decrypt_file(&filename, &body, &self.keys)?;
        if sealed_id != id.as_str() {
            return Err(CryptoError::CorruptedRecord(format!(
                "record for {id} carries id {sealed_id}"
            ))
            .into());
        }
        codec::inflate(&deflated)
    }
}
