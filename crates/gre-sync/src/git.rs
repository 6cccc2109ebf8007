//! Git repository access: the [`GitRepository`] seam, object parsers, and a
//! backend that drives the `git` command line.
//!
//! Commits and trees are parsed here from raw object bytes, so every backend
//! shares one parser and the walker only ever sees typed values.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Mutex, PoisonError};

use gre_core::{ObjectId, ObjectKind};
use tracing::debug;

use crate::codec;
use crate::error::{SyncError, SyncResult};

/// The parts of a commit the walker needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    /// Committer timestamp in seconds; 0 when the header is missing.
    pub time: i64,
}

/// What a tree entry points at, derived from its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tree,
    Blob,
    /// Submodule commit (mode 160000); lives in another repository.
    Gitlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub name: Vec<u8>,
    pub object_id: ObjectId,
    pub kind: EntryKind,
}

/// A tree as returned by [`GitRepository::read_tree`].
///
/// `id` is the id of the tree actually read. When it differs from the
/// requested id the backend peeled something (a commit) into a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub id: ObjectId,
    pub entries: Vec<TreeEntry>,
}

/// An object in whichever form the store hands it out cheapest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredObject {
    /// Already wrapped and zlib deflated (a loose object file).
    Deflated(Vec<u8>),
    /// Bare content; the caller wraps and deflates it.
    Raw { kind: ObjectKind, content: Vec<u8> },
}

impl StoredObject {
    /// The wrapped, deflated bytes stored in an encrypted record.
    pub fn into_deflated(self) -> SyncResult<Vec<u8>> {
        match self {
            StoredObject::Deflated(bytes) => Ok(bytes),
            StoredObject::Raw { kind, content } => codec::deflate(&codec::wrap(kind, &content)),
        }
    }
}

/// Parse the header block of a commit object.
pub fn parse_commit(content: &[u8]) -> SyncResult<Commit> {
    let mut tree = None;
    let mut parents = Vec::new();
    let mut time = 0;

    for line in content.split(|&b| b == b'\n') {
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix(b"tree ") {
            tree = Some(parse_hex_id(rest)?);
        } else if let Some(rest) = line.strip_prefix(b"parent ") {
            parents.push(parse_hex_id(rest)?);
        } else if let Some(rest) = line.strip_prefix(b"committer ") {
            time = parse_signature_time(rest).unwrap_or(0);
        }
    }

    let tree = tree.ok_or_else(|| SyncError::malformed("commit has no tree header"))?;
    Ok(Commit {
        tree,
        parents,
        time,
    })
}

/// `<name> <email> <seconds> <zone>` -> seconds
fn parse_signature_time(signature: &[u8]) -> Option<i64> {
    let signature = std::str::from_utf8(signature).ok()?;
    let mut fields = signature.rsplitn(3, ' ');
    let _zone = fields.next()?;
    fields.next()?.parse().ok()
}

fn parse_hex_id(bytes: &[u8]) -> SyncResult<ObjectId> {
    let s = std::str::from_utf8(bytes).map_err(|_| SyncError::malformed("object id is not UTF-8"))?;
    Ok(s.parse()?)
}

/// Parse binary tree content: repeated `<mode> <name>\0<20 raw id bytes>`.
pub fn parse_tree(content: &[u8]) -> SyncResult<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| SyncError::malformed("tree entry has no mode separator"))?;
        let mode = std::str::from_utf8(&rest[..space])
            .map_err(|_| SyncError::malformed("tree entry mode is not UTF-8"))?
            .to_string();
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| SyncError::malformed("tree entry name is not terminated"))?;
        let name = rest[..nul].to_vec();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err(SyncError::malformed("tree entry id is truncated"));
        }
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&rest[..20]);
        rest = &rest[20..];

        let kind = match mode.as_str() {
            "40000" | "040000" => EntryKind::Tree,
            "160000" => EntryKind::Gitlink,
            _ => EntryKind::Blob,
        };
        entries.push(TreeEntry {
            mode,
            name,
            object_id: ObjectId::from_raw(&raw),
            kind,
        });
    }

    Ok(entries)
}

/// Read/write access to a repository's refs and object store.
///
/// Implementations only need the primitive methods; commit and tree access
/// are provided on top of [`read_raw`](GitRepository::read_raw).
pub trait GitRepository: Send + Sync {
    /// Expand a short ref name (`main`, `HEAD`) to its full name.
    fn expand_ref(&self, name: &str) -> SyncResult<String>;

    /// Resolve a full ref name to the commit it points at.
    fn resolve_ref(&self, full_ref: &str) -> SyncResult<ObjectId>;

    /// Object kind and bare content.
    fn read_raw(&self, id: &ObjectId) -> SyncResult<(ObjectKind, Vec<u8>)>;

    /// Store a wrapped object and return its id.
    fn write_object(&self, wrapped: &[u8]) -> SyncResult<ObjectId>;

    fn has_object(&self, id: &ObjectId) -> SyncResult<bool>;

    /// The object in its cheapest stored form.
    fn read_object(&self, id: &ObjectId) -> SyncResult<StoredObject> {
        let (kind, content) = self.read_raw(id)?;
        Ok(StoredObject::Raw { kind, content })
    }

    fn read_commit(&self, id: &ObjectId) -> SyncResult<Commit> {
        match self.read_raw(id)? {
            (ObjectKind::Commit, content) => parse_commit(&content),
            (kind, _) => Err(SyncError::malformed(format!("{id} is a {kind}, not a commit"))),
        }
    }

    /// Read a tree. A commit id is peeled to its tree, which the returned
    /// [`Tree::id`] reveals.
    fn read_tree(&self, id: &ObjectId) -> SyncResult<Tree> {
        match self.read_raw(id)? {
            (ObjectKind::Tree, content) => Ok(Tree {
                id: id.clone(),
                entries: parse_tree(&content)?,
            }),
            (ObjectKind::Commit, content) => {
                let commit = parse_commit(&content)?;
                let (kind, tree_content) = self.read_raw(&commit.tree)?;
                if kind != ObjectKind::Tree {
                    return Err(SyncError::malformed(format!(
                        "commit {id} names {} which is a {kind}",
                        commit.tree
                    )));
                }
                Ok(Tree {
                    id: commit.tree,
                    entries: parse_tree(&tree_content)?,
                })
            }
            (kind, _) => Err(SyncError::malformed(format!("{id} is a {kind}, not a tree"))),
        }
    }
}

/// [`GitRepository`] backed by the `git` executable.
///
/// Object reads go through one `git cat-file --batch` process, started on
/// the first read and restarted after an I/O error.
#[derive(Debug)]
pub struct GitCli {
    git_dir: PathBuf,
    batch: Mutex<Option<CatFileBatch>>,
}

impl GitCli {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            batch: Mutex::new(None),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn loose_path(&self, id: &ObjectId) -> PathBuf {
        let (dir, file) = id.as_str().split_at(2);
        self.git_dir.join("objects").join(dir).join(file)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("--git-dir").arg(&self.git_dir).args(args);
        cmd
    }

    fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> SyncResult<Vec<u8>> {
        run_git(self.command(args), args, stdin)
    }
}

/// A running `git cat-file --batch`: one id per request line, answered with
/// `<id> <type> <size>`, the content and a newline, or `<id> missing`.
#[derive(Debug)]
struct CatFileBatch {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl CatFileBatch {
    fn spawn(mut cmd: Command) -> SyncResult<Self> {
        let spawn_error = |stderr: String| SyncError::Git {
            command: "cat-file".into(),
            stderr,
        };
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(format!("spawning git: {e}")))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_error("no pipes to cat-file".into()));
        };
        debug!(pid = child.id(), "started cat-file batch");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn read(&mut self, id: &ObjectId) -> SyncResult<Option<(ObjectKind, Vec<u8>)>> {
        writeln!(self.stdin, "{id}")?;
        self.stdin.flush()?;

        let mut header = String::new();
        if self.stdout.read_line(&mut header)? == 0 {
            return Err(SyncError::Git {
                command: "cat-file".into(),
                stderr: "batch process exited".into(),
            });
        }
        let header = header.trim_end();
        let mut fields = header.split(' ');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(_), Some("missing"), None) => Ok(None),
            (Some(_), Some(kind), Some(size)) => {
                let kind: ObjectKind = kind.parse()?;
                let size: usize = size
                    .parse()
                    .map_err(|_| SyncError::malformed(format!("cat-file header {header:?}")))?;
                let mut content = vec![0; size + 1];
                self.stdout.read_exact(&mut content)?;
                content.pop();
                Ok(Some((kind, content)))
            }
            _ => Err(SyncError::malformed(format!("cat-file header {header:?}"))),
        }
    }
}

impl Drop for CatFileBatch {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Run a prepared git command, feeding `stdin` if given, and return stdout.
pub(crate) fn run_git(mut cmd: Command, args: &[&str], stdin: Option<&[u8]>) -> SyncResult<Vec<u8>> {
    let command = args.first().copied().unwrap_or("git").to_string();
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn().map_err(|e| SyncError::Git {
        command: command.clone(),
        stderr: format!("spawning git: {e}"),
    })?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input)?;
    }
    let output = child.wait_with_output()?;

    if !output.status.success() {
        return Err(SyncError::Git {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

fn stdout_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

impl GitRepository for GitCli {
    fn expand_ref(&self, name: &str) -> SyncResult<String> {
        let out = self.run(&["rev-parse", "--symbolic-full-name", name], None);
        match out.map(|o| stdout_line(&o)) {
            Ok(full) if !full.is_empty() => Ok(full),
            _ if name.starts_with("refs/") => Ok(name.to_string()),
            _ => Err(SyncError::NotFound(format!("ref {name}"))),
        }
    }

    fn resolve_ref(&self, full_ref: &str) -> SyncResult<ObjectId> {
        let spec = format!("{full_ref}^{{commit}}");
        let out = self
            .run(&["rev-parse", "--verify", "--quiet", &spec], None)
            .map_err(|_| SyncError::NotFound(format!("ref {full_ref}")))?;
        Ok(stdout_line(&out).parse()?)
    }

    fn read_raw(&self, id: &ObjectId) -> SyncResult<(ObjectKind, Vec<u8>)> {
        let mut slot = self.batch.lock().unwrap_or_else(PoisonError::into_inner);
        let mut batch = match slot.take() {
            Some(batch) => batch,
            None => CatFileBatch::spawn(self.command(&["cat-file", "--batch"]))?,
        };
        match batch.read(id) {
            Ok(found) => {
                *slot = Some(batch);
                found.ok_or_else(|| SyncError::NotFound(format!("object {id}")))
            }
            Err(e) => {
                debug!(error = %e, "dropping cat-file batch");
                Err(e)
            }
        }
    }

    fn write_object(&self, wrapped: &[u8]) -> SyncResult<ObjectId> {
        let (kind, content) = codec::unwrap(wrapped)?;
        let out = self.run(
            &["hash-object", "-w", "-t", kind.as_str(), "--stdin"],
            Some(content),
        )?;
        let id: ObjectId = stdout_line(&out).parse()?;
        debug!(id = %id.short(), kind = %kind, "wrote object");
        Ok(id)
    }

    fn has_object(&self, id: &ObjectId) -> SyncResult<bool> {
        if self.loose_path(id).is_file() {
            return Ok(true);
        }
        Ok(self.run(&["cat-file", "-e", id.as_str()], None).is_ok())
    }

    fn read_object(&self, id: &ObjectId) -> SyncResult<StoredObject> {
        let loose = self.loose_path(id);
        match std::fs::read(&loose) {
            Ok(bytes) => Ok(StoredObject::Deflated(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let (kind, content) = self.read_raw(id)?;
                Ok(StoredObject::Raw { kind, content })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE_ID: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
    const PARENT_ID: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

    #[test]
    fn test_parse_commit() {
        let content = format!(
            "tree {TREE_ID}\nparent {PARENT_ID}\nparent {TREE_ID}\nauthor A <a@b> 5 +0000\ncommitter C D <c@d> 1700000000 -0700\n\nmessage\ntree {PARENT_ID}\n"
        );
        let commit = parse_commit(content.as_bytes()).unwrap();
        assert_eq!(commit.tree.as_str(), TREE_ID);
        assert_eq!(commit.parents.len(), 2);
        assert_eq!(commit.parents[0].as_str(), PARENT_ID);
        assert_eq!(commit.time, 1_700_000_000);
    }

    #[test]
    fn test_parse_root_commit() {
        let content = format!("tree {TREE_ID}\nauthor A <a@b> 0 +0000\n\nroot\n");
        let commit = parse_commit(content.as_bytes()).unwrap();
        assert!(commit.parents.is_empty());
        assert_eq!(commit.time, 0, "no committer header");
    }

    #[test]
    fn test_parse_commit_without_tree() {
        assert!(matches!(
            parse_commit(b"author A <a@b> 0 +0000\n\nmsg\n"),
            Err(SyncError::MalformedObject(_))
        ));
    }

    fn tree_entry(mode: &str, name: &str, id: [u8; 20]) -> Vec<u8> {
        let mut out = format!("{mode} {name}\0").into_bytes();
        out.extend_from_slice(&id);
        out
    }

    #[test]
    fn test_parse_tree_kinds() {
        let mut content = tree_entry("100644", "README", [0x11; 20]);
        content.extend(tree_entry("40000", "src", [0x22; 20]));
        content.extend(tree_entry("160000", "vendor", [0x33; 20]));
        content.extend(tree_entry("120000", "link", [0x44; 20]));

        let entries = parse_tree(&content).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].kind, EntryKind::Blob);
        assert_eq!(entries[0].name, b"README");
        assert_eq!(entries[0].object_id.as_str(), "11".repeat(20));
        assert_eq!(entries[1].kind, EntryKind::Tree);
        assert_eq!(entries[2].kind, EntryKind::Gitlink);
        assert_eq!(entries[3].kind, EntryKind::Blob);
    }

    #[test]
    fn test_parse_empty_tree() {
        assert!(parse_tree(b"").unwrap().is_empty());
    }

    #[test]
    fn test_parse_truncated_tree() {
        let mut content = tree_entry("100644", "a", [0x11; 20]);
        content.truncate(content.len() - 3);
        assert!(matches!(
            parse_tree(&content),
            Err(SyncError::MalformedObject(_))
        ));
    }

    #[test]
    fn test_raw_object_deflates_to_wrapped_form() {
        let stored = StoredObject::Raw {
            kind: ObjectKind::Blob,
            content: b"hi".to_vec(),
        };
        let deflated = stored.into_deflated().unwrap();
        assert_eq!(codec::inflate(&deflated).unwrap(), b"blob 2\0hi");
    }
}
