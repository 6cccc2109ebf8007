//! Object graph walk: which objects does the receiver still need?
//!
//! The walker keeps one visited set for its whole lifetime. An id in the set
//! is either already held by the receiver or already queued for sending, so
//! reusing one walker across the refs of a push yields each object once.
//!
//! New commits are found the way `git rev-list <start> ^<stop>` finds them:
//! both tips go into one queue ordered newest first, reachability from each
//! side is painted onto the commits as they are popped, and the walk ends as
//! soon as every queued commit is reachable from `stop`. Only the history
//! between the two tips is read.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use gre_core::ObjectId;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::git::{Commit, EntryKind, GitRepository};

const FROM_START: u8 = 1;
const FROM_STOP: u8 = 2;

pub struct ObjectWalker<'r, R: ?Sized> {
    repo: &'r R,
    visited: HashSet<ObjectId>,
}

impl<'r, R: GitRepository + ?Sized> ObjectWalker<'r, R> {
    pub fn new(repo: &'r R) -> Self {
        Self {
            repo,
            visited: HashSet::new(),
        }
    }

    /// Objects reachable from `start` that are not reachable from `stop`.
    ///
    /// The tree of `stop` is marked as known up front, so unchanged subtrees
    /// and blobs of the new commits are not sent again.
    pub fn closure(
        &mut self,
        start: &ObjectId,
        stop: Option<&ObjectId>,
    ) -> SyncResult<BTreeSet<ObjectId>> {
        let mut found = BTreeSet::new();
        if stop == Some(start) {
            return Ok(found);
        }

        let mut history = History::new(self.repo);
        let stop_commit = match stop {
            Some(stop) => {
                let commit = history.mark(stop, FROM_STOP)?;
                if commit.is_none() {
                    warn!(stop = %stop.short(), "stop commit not in local repository; sending full history");
                }
                commit
            }
            None => None,
        };
        history.mark(start, FROM_START)?;

        let new_commits = history.paint(&mut self.visited)?;

        if let (Some(stop), Some(commit)) = (stop, stop_commit) {
            self.visited.insert(stop.clone());
            let mut ignored = BTreeSet::new();
            self.walk_tree(&commit.tree, &mut ignored)?;
        }
        for (id, commit) in new_commits {
            self.visited.insert(id.clone());
            found.insert(id);
            self.walk_tree(&commit.tree, &mut found)?;
        }

        debug!(
            start = %start.short(),
            stop = stop.map(|s| s.short()).unwrap_or("-"),
            commits_read = history.commits_read(),
            objects = found.len(),
            "computed closure"
        );
        Ok(found)
    }

    fn walk_tree(&mut self, root: &ObjectId, found: &mut BTreeSet<ObjectId>) -> SyncResult<()> {
        if !self.visited.insert(root.clone()) {
            return Ok(());
        }
        found.insert(root.clone());

        let mut pending = vec![root.clone()];
        while let Some(requested) = pending.pop() {
            let tree = self.repo.read_tree(&requested)?;
            if tree.id != requested {
                return Err(SyncError::CorruptedTree {
                    requested,
                    actual: tree.id,
                });
            }

            for entry in tree.entries {
                match entry.kind {
                    EntryKind::Gitlink => {
                        debug!(id = %entry.object_id.short(), "skipping submodule commit");
                    }
                    EntryKind::Tree => {
                        if self.visited.insert(entry.object_id.clone()) {
                            found.insert(entry.object_id.clone());
                            pending.push(entry.object_id);
                        }
                    }
                    EntryKind::Blob => {
                        if self.visited.insert(entry.object_id.clone()) {
                            found.insert(entry.object_id);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Queue entry: newest commit first, ties in insertion order.
#[derive(PartialEq, Eq)]
struct Queued {
    time: i64,
    seq: Reverse<u64>,
    id: ObjectId,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Painted {
    flags: u8,
    queued: bool,
    commit: Option<Commit>,
}

/// Commits between the two tips, painted with the side(s) they are
/// reachable from.
struct History<'r, R: ?Sized> {
    repo: &'r R,
    queue: BinaryHeap<Queued>,
    painted: HashMap<ObjectId, Painted>,
    /// Queued commits reachable from `start` only.
    undecided: usize,
    seq: u64,
}

impl<'r, R: GitRepository + ?Sized> History<'r, R> {
    fn new(repo: &'r R) -> Self {
        Self {
            repo,
            queue: BinaryHeap::new(),
            painted: HashMap::new(),
            undecided: 0,
            seq: 0,
        }
    }

    fn commits_read(&self) -> usize {
        self.painted.values().filter(|p| p.commit.is_some()).count()
    }

    /// Paint `id` with `flag`, reading and queueing it the first time.
    ///
    /// A commit missing from the repository is fine on the stop side
    /// (shallow history) and an error on the start side.
    fn mark(&mut self, id: &ObjectId, flag: u8) -> SyncResult<Option<Commit>> {
        if let Some(painted) = self.painted.get_mut(id) {
            let before = painted.flags;
            painted.flags |= flag;
            if painted.queued && before == FROM_START && painted.flags != before {
                self.undecided -= 1;
            }
            return Ok(painted.commit.clone());
        }

        let commit = match self.repo.read_commit(id) {
            Ok(commit) => Some(commit),
            Err(SyncError::NotFound(_)) if flag == FROM_STOP => None,
            Err(e) => return Err(e),
        };
        if let Some(commit) = &commit {
            self.seq += 1;
            self.queue.push(Queued {
                time: commit.time,
                seq: Reverse(self.seq),
                id: id.clone(),
            });
            if flag == FROM_START {
                self.undecided += 1;
            }
        }
        self.painted.insert(
            id.clone(),
            Painted {
                flags: flag,
                queued: commit.is_some(),
                commit: commit.clone(),
            },
        );
        Ok(commit)
    }

    /// Pop commits until none reachable only from `start` remain queued.
    /// Returns the new commits, newest first.
    ///
    /// Commits in `visited` were handled by an earlier closure; they and
    /// their history are skipped. Commits reached from `stop` join `visited`.
    fn paint(&mut self, visited: &mut HashSet<ObjectId>) -> SyncResult<Vec<(ObjectId, Commit)>> {
        let mut new_commits = Vec::new();

        while self.undecided > 0 {
            let Some(Queued { id, .. }) = self.queue.pop() else {
                break;
            };
            let Some(painted) = self.painted.get_mut(&id) else {
                continue;
            };
            painted.queued = false;
            let flags = painted.flags;
            let Some(commit) = painted.commit.clone() else {
                continue;
            };

            if flags == FROM_START {
                self.undecided -= 1;
                if visited.contains(&id) {
                    continue;
                }
                for parent in &commit.parents {
                    self.mark(parent, FROM_START)?;
                }
                new_commits.push((id, commit));
            } else {
                visited.insert(id);
                for parent in &commit.parents {
                    self.mark(parent, FROM_STOP)?;
                }
            }
        }
        Ok(new_commits)
    }
}

/// One-shot closure with a fresh visited set.
pub fn closure<R: GitRepository + ?Sized>(
    repo: &R,
    start: &ObjectId,
    stop: Option<&ObjectId>,
) -> SyncResult<BTreeSet<ObjectId>> {
    ObjectWalker::new(repo).closure(start, stop)
}

/// Whether `ancestor` is `descendant` or one of its ancestors.
pub fn is_ancestor<R: GitRepository + ?Sized>(
    repo: &R,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> SyncResult<bool> {
    let mut seen = HashSet::new();
    let mut pending = vec![descendant.clone()];
    while let Some(id) = pending.pop() {
        if &id == ancestor {
            return Ok(true);
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        pending.extend(repo.read_commit(&id)?.parents);
    }
    Ok(false)
}
