//! Moving the mirror repository to and from its upstream.

use std::path::Path;
use std::process::{Command, Stdio};

use gre_core::config::SyncConfig;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::git::run_git;

/// Clone, pull, push and commit for the mirror working tree.
///
/// `pull` and `push` report failure as `Ok(false)` unless `throw_on_error`
/// is set, in which case they fail with [`SyncError::Transport`].
pub trait MirrorTransport: Send + Sync {
    fn clone_mirror(&self, url: &str, dir: &Path) -> SyncResult<()>;

    /// Create an empty mirror repository at `dir`.
    fn init(&self, dir: &Path) -> SyncResult<()>;

    fn pull(&self, url: &str, dir: &Path, throw_on_error: bool) -> SyncResult<bool>;

    fn push(&self, url: &str, dir: &Path, throw_on_error: bool) -> SyncResult<bool>;

    /// Stage everything and commit if anything changed.
    fn commit_all(&self, dir: &Path) -> SyncResult<bool>;
}

/// Map a transport result through the `throw_on_error` convention.
pub fn soften(operation: &str, result: SyncResult<()>, throw_on_error: bool) -> SyncResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if throw_on_error => Err(SyncError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        }),
        Err(e) => {
            warn!(operation, error = %e, "mirror transport failed; continuing");
            Ok(false)
        }
    }
}

/// [`MirrorTransport`] that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitCliTransport {
    branch: String,
    author: String,
    email: String,
    message: String,
}

impl GitCliTransport {
    pub fn new(sync: &SyncConfig) -> Self {
        Self {
            branch: sync.mirror_branch.clone(),
            author: sync.commit_author.clone(),
            email: sync.commit_email.clone(),
            message: sync.commit_message.clone(),
        }
    }

    fn command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(dir)
            .arg("-c")
            .arg(format!("user.name={}", self.author))
            .arg("-c")
            .arg(format!("user.email={}", self.email));
        cmd
    }

    fn run(&self, dir: &Path, args: &[&str]) -> SyncResult<()> {
        let mut cmd = self.command(dir);
        cmd.args(args);
        run_git(cmd, args, None).map(|_| ())
    }
}

impl MirrorTransport for GitCliTransport {
    fn clone_mirror(&self, url: &str, dir: &Path) -> SyncResult<()> {
        let target = dir.to_string_lossy();
        let args = ["clone", "--quiet", url, &*target];
        let mut cmd = Command::new("git");
        cmd.args(args);
        run_git(cmd, &args, None)?;
        info!(url, dir = %dir.display(), "cloned mirror");
        Ok(())
    }

    fn init(&self, dir: &Path) -> SyncResult<()> {
        std::fs::create_dir_all(dir)?;
        self.run(dir, &["init", "--quiet", "-b", self.branch.as_str()])?;
        info!(dir = %dir.display(), branch = %self.branch, "initialized mirror");
        Ok(())
    }

    fn pull(&self, url: &str, dir: &Path, throw_on_error: bool) -> SyncResult<bool> {
        let result = self.run(
            dir,
            &["pull", "--quiet", "--no-rebase", "--no-edit", url, self.branch.as_str()],
        );
        soften("pull", result, throw_on_error)
    }

    fn push(&self, url: &str, dir: &Path, throw_on_error: bool) -> SyncResult<bool> {
        let refspec = format!("HEAD:refs/heads/{}", self.branch);
        let result = self.run(dir, &["push", "--quiet", url, refspec.as_str()]);
        soften("push", result, throw_on_error)
    }

    fn commit_all(&self, dir: &Path) -> SyncResult<bool> {
        self.run(dir, &["add", "-A"])?;

        let status = self
            .command(dir)
            .args(["diff", "--cached", "--quiet"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        match status.code() {
            Some(0) => {
                debug!("mirror has nothing to commit");
                return Ok(false);
            }
            Some(1) => {}
            _ => {
                return Err(SyncError::Git {
                    command: "diff".into(),
                    stderr: format!("exited with {status}"),
                })
            }
        }

        self.run(dir, &["commit", "--quiet", "-m", self.message.as_str()])?;
        info!(dir = %dir.display(), "committed mirror");
        Ok(true)
    }
}
