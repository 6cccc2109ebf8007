//! Push: resolve every requested ref, then copy, record, commit, push.
//!
//! Nothing in the mirror changes until every ref has an outcome. One failed
//! ref aborts the whole push.

use std::collections::BTreeSet;

use gre_core::{ObjectId, PushRef};
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::git::GitRepository;
use crate::objects::ObjectSync;
use crate::policy::{RefUpdate, RefUpdatePolicy, Verdict};
use crate::refs::RefStore;
use crate::transport::MirrorTransport;
use crate::walker::ObjectWalker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefOutcome {
    /// The mirror already points `dst` at this commit.
    NoChange(ObjectId),
    /// `dst` will be moved to this commit.
    Success(ObjectId),
    Error(String),
}

impl RefOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, RefOutcome::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefResult {
    pub push: PushRef,
    pub outcome: RefOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// One entry per requested ref, in request order.
    pub results: Vec<RefResult>,
    /// Some ref failed, so the mirror was left untouched.
    pub aborted: bool,
    pub objects_written: usize,
    pub refs_updated: usize,
    pub committed: bool,
}

pub struct PushOrchestrator<'a> {
    pub repo: &'a dyn GitRepository,
    pub objects: &'a ObjectSync,
    pub refs: &'a RefStore,
    pub transport: &'a dyn MirrorTransport,
    pub policy: &'a dyn RefUpdatePolicy,
    pub url: &'a str,
}

impl PushOrchestrator<'_> {
    pub fn push(&self, requested: &[PushRef]) -> SyncResult<PushReport> {
        let mirror_dir = self.objects.layout().root();
        // an empty upstream has nothing to pull
        self.transport.pull(self.url, mirror_dir, false)?;

        let mut walker = ObjectWalker::new(self.repo);
        let mut to_copy = BTreeSet::new();
        let mut report = PushReport::default();

        for push in requested {
            let outcome = match self.evaluate(push, &mut walker, &mut to_copy) {
                Ok(outcome) => outcome,
                Err(e) => RefOutcome::Error(e.to_string()),
            };
            match &outcome {
                RefOutcome::Error(reason) => warn!(dst = %push.dst, reason = %reason, "ref rejected"),
                other => debug!(dst = %push.dst, outcome = ?other, "ref evaluated"),
            }
            report.results.push(RefResult {
                push: push.clone(),
                outcome,
            });
        }

        if report.results.iter().any(|r| r.outcome.is_error()) {
            warn!("push aborted; mirror unchanged");
            report.aborted = true;
            return Ok(report);
        }

        let updating = report
            .results
            .iter()
            .any(|r| matches!(r.outcome, RefOutcome::Success(_)));
        if updating && to_copy.is_empty() {
            warn!("push updates refs but queued no objects");
        }

        report.objects_written = self.objects.copy_to_mirror(&to_copy, self.repo)?.written;
        for result in &report.results {
            if let RefOutcome::Success(id) = &result.outcome {
                if self.refs.write(&result.push.dst, id)? {
                    report.refs_updated += 1;
                }
            }
        }

        report.committed = self.transport.commit_all(mirror_dir)?;
        // Only a new mirror commit must reach the upstream. Failing to push an
        // unchanged mirror is logged and ignored.
        self.transport.push(self.url, mirror_dir, report.committed)?;

        info!(
            refs = report.results.len(),
            refs_updated = report.refs_updated,
            objects = report.objects_written,
            committed = report.committed,
            "push complete"
        );
        Ok(report)
    }

    fn evaluate(
        &self,
        push: &PushRef,
        walker: &mut ObjectWalker<'_, dyn GitRepository + '_>,
        to_copy: &mut BTreeSet<ObjectId>,
    ) -> SyncResult<RefOutcome> {
        if push.is_delete() {
            return Ok(RefOutcome::Error("deleting refs is not supported".into()));
        }

        let src_ref = self.repo.expand_ref(&push.src)?;
        let src = self.repo.resolve_ref(&src_ref)?;
        let dst = self.refs.lookup(&push.dst)?;

        if dst.as_ref() == Some(&src) {
            return Ok(RefOutcome::NoChange(src));
        }

        let update = RefUpdate {
            dst: &push.dst,
            old: dst.as_ref(),
            new: &src,
            force: push.force,
        };
        if let Verdict::Reject(reason) = self.policy.check(&update, self.repo)? {
            return Ok(RefOutcome::Error(reason));
        }

        to_copy.extend(walker.closure(&src, dst.as_ref())?);
        Ok(RefOutcome::Success(src))
    }
}
