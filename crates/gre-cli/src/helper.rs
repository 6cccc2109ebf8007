//! The remote-helper command loop.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use gre_core::PushRef;
use gre_sync::{CopyStats, EncryptedRemote, PushReport, RefListing, SyncResult};
use tracing::{debug, error, info};

use crate::protocol::{self, Command, CommandReader, FetchRequest};

/// What the loop needs from the encrypted remote.
pub trait HelperBackend {
    fn list(&self, for_push: bool) -> SyncResult<RefListing>;
    fn push(&self, refs: &[PushRef]) -> SyncResult<PushReport>;
    fn fetch(&self, requests: &[FetchRequest]) -> SyncResult<CopyStats>;
}

impl HelperBackend for EncryptedRemote {
    fn list(&self, for_push: bool) -> SyncResult<RefListing> {
        EncryptedRemote::list(self, for_push)
    }

    fn push(&self, refs: &[PushRef]) -> SyncResult<PushReport> {
        EncryptedRemote::push(self, refs)
    }

    /// Every record in the mirror is imported; `requests` only matters for
    /// logging.
    fn fetch(&self, requests: &[FetchRequest]) -> SyncResult<CopyStats> {
        debug!(requested = requests.len(), "fetching all mirror objects");
        EncryptedRemote::fetch(self)
    }
}

/// Answer commands from `input` until git ends the session.
pub fn serve<B, R, W>(backend: &B, input: R, mut out: W) -> Result<()>
where
    B: HelperBackend + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut reader = CommandReader::new(input);
    while let Some(command) = reader.next_command().context("reading helper command")? {
        debug!(?command, "helper command");
        match command {
            Command::Capabilities => protocol::write_capabilities(&mut out)?,
            Command::Option { name, .. } => {
                debug!(option = %name, "option not supported");
                protocol::write_option_reply(&mut out)?;
            }
            Command::List { for_push } => {
                let listing = backend.list(for_push).context("listing encrypted refs")?;
                protocol::write_listing(&mut out, &listing)?;
            }
            Command::Push(refs) => match backend.push(&refs) {
                Ok(report) => {
                    info!(
                        refs = report.refs_updated,
                        objects = report.objects_written,
                        aborted = report.aborted,
                        "push finished"
                    );
                    protocol::write_push_report(&mut out, &report)?;
                }
                Err(e) => {
                    error!(error = %e, "push failed");
                    protocol::write_push_failure(&mut out, &refs, &e.to_string())?;
                }
            },
            Command::Fetch(requests) => {
                let stats = backend.fetch(&requests).context("fetching from encrypted mirror")?;
                info!(written = stats.written, skipped = stats.skipped, "fetch finished");
                protocol::write_fetch_done(&mut out)?;
            }
        }
    }
    debug!("helper session closed");
    Ok(())
}
