//! Fetch: pull the mirror, then decrypt every object record into the
//! plaintext repository. Refs are left for the caller to apply.

use tracing::info;

use crate::error::SyncResult;
use crate::git::GitRepository;
use crate::objects::{CopyStats, ObjectSync};
use crate::transport::MirrorTransport;

pub struct FetchOrchestrator<'a> {
    pub repo: &'a dyn GitRepository,
    pub objects: &'a ObjectSync,
    pub transport: &'a dyn MirrorTransport,
    pub url: &'a str,
}

impl FetchOrchestrator<'_> {
    pub fn fetch(&self) -> SyncResult<CopyStats> {
        self.transport
            .pull(self.url, self.objects.layout().root(), true)?;
        let stats = self.objects.copy_from_mirror(self.repo)?;
        info!(written = stats.written, skipped = stats.skipped, "fetch complete");
        Ok(stats)
    }
}
