//! Whether a ref may move from its stored target to a new one.

use gre_core::ObjectId;

use crate::error::SyncResult;
use crate::git::GitRepository;
use crate::walker::is_ancestor;

/// A proposed ref update.
#[derive(Debug, Clone, Copy)]
pub struct RefUpdate<'a> {
    pub dst: &'a str,
    pub old: Option<&'a ObjectId>,
    pub new: &'a ObjectId,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Reject(String),
}

pub trait RefUpdatePolicy: Send + Sync {
    fn check(&self, update: &RefUpdate<'_>, repo: &dyn GitRepository) -> SyncResult<Verdict>;
}

/// Accept every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RefUpdatePolicy for AllowAll {
    fn check(&self, _update: &RefUpdate<'_>, _repo: &dyn GitRepository) -> SyncResult<Verdict> {
        Ok(Verdict::Allow)
    }
}

/// Reject non-forced updates that drop the old target from history.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastForwardOnly;

impl RefUpdatePolicy for FastForwardOnly {
    fn check(&self, update: &RefUpdate<'_>, repo: &dyn GitRepository) -> SyncResult<Verdict> {
        let Some(old) = update.old else {
            return Ok(Verdict::Allow);
        };
        if update.force || is_ancestor(repo, old, update.new)? {
            return Ok(Verdict::Allow);
        }
        Ok(Verdict::Reject(format!(
            "non-fast-forward: {} is not an ancestor of {}",
            old.short(),
            update.new.short()
        )))
    }
}

/// The policy selected by `sync.enforce_fast_forward`.
pub fn from_config(enforce_fast_forward: bool) -> Box<dyn RefUpdatePolicy> {
    if enforce_fast_forward {
        Box::new(FastForwardOnly)
    } else {
        Box::new(AllowAll)
    }
}
