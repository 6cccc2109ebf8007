//! Test doubles: an in-memory object store hashed exactly like git, and a
//! transport whose "upstream" is a plain directory.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gre_core::{ObjectId, ObjectKind};
use gre_sync::codec;
use gre_sync::transport::soften;
use gre_sync::{GitRepository, MirrorTransport, SyncError, SyncResult};
use sha1::{Digest, Sha1};

#[derive(Default)]
struct RepoState {
    objects: HashMap<ObjectId, (ObjectKind, Vec<u8>)>,
    refs: HashMap<String, ObjectId>,
    reads: HashMap<ObjectId, usize>,
    clock: i64,
}

/// In-memory [`GitRepository`]. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryRepo {
    state: Arc<Mutex<RepoState>>,
}

pub fn raw_id(id: &ObjectId) -> [u8; 20] {
    let mut raw = [0u8; 20];
    for (i, byte) in raw.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&id.as_str()[2 * i..2 * i + 2], 16).unwrap();
    }
    raw
}

pub fn git_id(kind: ObjectKind, content: &[u8]) -> ObjectId {
    let digest = Sha1::digest(codec::wrap(kind, content));
    let mut raw = [0u8; 20];
    raw.copy_from_slice(&digest);
    ObjectId::from_raw(&raw)
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: ObjectKind, content: &[u8]) -> ObjectId {
        let id = git_id(kind, content);
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(id.clone(), (kind, content.to_vec()));
        id
    }

    pub fn blob(&self, content: &[u8]) -> ObjectId {
        self.insert(ObjectKind::Blob, content)
    }

    /// Tree from `(mode, name, id)` entries.
    pub fn tree(&self, entries: &[(&str, &str, &ObjectId)]) -> ObjectId {
        let mut sorted: Vec<_> = entries.to_vec();
        sorted.sort_by(|a, b| a.1.cmp(b.1));
        let mut content = Vec::new();
        for (mode, name, id) in sorted {
            content.extend_from_slice(format!("{mode} {name}\0").as_bytes());
            content.extend_from_slice(&raw_id(id));
        }
        self.insert(ObjectKind::Tree, &content)
    }

    /// Tree of regular files.
    pub fn files(&self, files: &[(&str, &ObjectId)]) -> ObjectId {
        let entries: Vec<_> = files.iter().map(|(name, id)| ("100644", *name, *id)).collect();
        self.tree(&entries)
    }

    /// Each commit is one second newer than the one before it.
    pub fn commit(&self, tree: &ObjectId, parents: &[&ObjectId], message: &str) -> ObjectId {
        let time = {
            let mut state = self.state.lock().unwrap();
            state.clock += 1;
            1_600_000_000 + state.clock
        };
        let mut content = format!("tree {tree}\n");
        for parent in parents {
            content.push_str(&format!("parent {parent}\n"));
        }
        content.push_str(&format!("author Test <test@example.com> {time} +0000\n"));
        content.push_str(&format!("committer Test <test@example.com> {time} +0000\n\n"));
        content.push_str(message);
        content.push('\n');
        self.insert(ObjectKind::Commit, content.as_bytes())
    }

    pub fn set_ref(&self, name: &str, id: &ObjectId) {
        self.state
            .lock()
            .unwrap()
            .refs
            .insert(name.to_string(), id.clone());
    }

    pub fn object_ids(&self) -> BTreeSet<ObjectId> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn get(&self, id: &ObjectId) -> Option<(ObjectKind, Vec<u8>)> {
        self.state.lock().unwrap().objects.get(id).cloned()
    }

    /// How many times `id` was read through the trait.
    pub fn reads(&self, id: &ObjectId) -> usize {
        self.state.lock().unwrap().reads.get(id).copied().unwrap_or(0)
    }
}

impl GitRepository for MemoryRepo {
    fn expand_ref(&self, name: &str) -> SyncResult<String> {
        let state = self.state.lock().unwrap();
        if state.refs.contains_key(name) {
            return Ok(name.to_string());
        }
        let branch = format!("refs/heads/{name}");
        if state.refs.contains_key(&branch) {
            return Ok(branch);
        }
        Err(SyncError::NotFound(format!("ref {name}")))
    }

    fn resolve_ref(&self, full_ref: &str) -> SyncResult<ObjectId> {
        self.state
            .lock()
            .unwrap()
            .refs
            .get(full_ref)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("ref {full_ref}")))
    }

    fn read_raw(&self, id: &ObjectId) -> SyncResult<(ObjectKind, Vec<u8>)> {
        let mut state = self.state.lock().unwrap();
        *state.reads.entry(id.clone()).or_default() += 1;
        state
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("object {id}")))
    }

    fn write_object(&self, wrapped: &[u8]) -> SyncResult<ObjectId> {
        let (kind, content) = codec::unwrap(wrapped)?;
        Ok(self.insert(kind, content))
    }

    fn has_object(&self, id: &ObjectId) -> SyncResult<bool> {
        Ok(self.state.lock().unwrap().objects.contains_key(id))
    }
}

#[derive(Default)]
struct TransportState {
    calls: Vec<String>,
    committed: Option<BTreeMap<PathBuf, Vec<u8>>>,
    reject_pushes: bool,
}

/// [`MirrorTransport`] whose upstream is a directory. Pull copies the
/// upstream's records into the mirror, push copies them back. Clones share
/// state and call log.
#[derive(Clone)]
pub struct RecordingTransport {
    upstream: PathBuf,
    state: Arc<Mutex<TransportState>>,
}

const SYNCED: [&str; 3] = ["objects", "refs", "encrypted.json"];

fn copy_entry(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            copy_entry(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else if from.is_file() {
        std::fs::copy(from, to)?;
    }
    Ok(())
}

fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    for name in SYNCED {
        let path = dir.join(name);
        if path.is_file() {
            files.insert(PathBuf::from(name), std::fs::read(&path).unwrap());
        } else if path.is_dir() {
            for entry in std::fs::read_dir(&path).unwrap() {
                let entry = entry.unwrap();
                files.insert(
                    PathBuf::from(name).join(entry.file_name()),
                    std::fs::read(entry.path()).unwrap(),
                );
            }
        }
    }
    files
}

impl RecordingTransport {
    pub fn new(upstream: impl Into<PathBuf>) -> Self {
        let upstream = upstream.into();
        std::fs::create_dir_all(&upstream).unwrap();
        Self {
            upstream,
            state: Arc::default(),
        }
    }

    pub fn upstream(&self) -> &Path {
        &self.upstream
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Make every later push fail as if the upstream refused it.
    pub fn reject_pushes(&self, reject: bool) {
        self.state.lock().unwrap().reject_pushes = reject;
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }

    fn upstream_is_empty(&self) -> bool {
        !self.upstream.join("objects").exists()
    }

    fn copy_synced(from: &Path, to: &Path) -> std::io::Result<()> {
        for name in SYNCED {
            copy_entry(&from.join(name), &to.join(name))?;
        }
        Ok(())
    }
}

impl MirrorTransport for RecordingTransport {
    fn clone_mirror(&self, _url: &str, dir: &Path) -> SyncResult<()> {
        self.record("clone");
        if self.upstream_is_empty() {
            return Err(SyncError::NotFound("empty upstream".into()));
        }
        std::fs::create_dir_all(dir.join(".git"))?;
        Self::copy_synced(&self.upstream, dir)?;
        Ok(())
    }

    fn init(&self, dir: &Path) -> SyncResult<()> {
        self.record("init");
        std::fs::create_dir_all(dir.join(".git"))?;
        Ok(())
    }

    fn pull(&self, _url: &str, dir: &Path, throw_on_error: bool) -> SyncResult<bool> {
        self.record("pull");
        let result = if self.upstream_is_empty() {
            Err(SyncError::NotFound("empty upstream".into()))
        } else {
            Self::copy_synced(&self.upstream, dir).map_err(SyncError::from)
        };
        soften("pull", result, throw_on_error)
    }

    fn push(&self, _url: &str, dir: &Path, throw_on_error: bool) -> SyncResult<bool> {
        self.record("push");
        let result = if self.state.lock().unwrap().reject_pushes {
            Err(SyncError::NotFound("upstream rejected the push".into()))
        } else {
            Self::copy_synced(dir, &self.upstream).map_err(SyncError::from)
        };
        soften("push", result, throw_on_error)
    }

    fn commit_all(&self, dir: &Path) -> SyncResult<bool> {
        self.record("commit");
        let current = snapshot(dir);
        let mut state = self.state.lock().unwrap();
        if state.committed.as_ref() == Some(&current) {
            return Ok(false);
        }
        state.committed = Some(current);
        Ok(true)
    }
}

/// A small history: `a` (root) → `b` → `c`.
pub struct Chain {
    pub a: ObjectId,
    pub b: ObjectId,
    pub c: ObjectId,
    pub blob_a: ObjectId,
    pub blob_b: ObjectId,
    pub blob_c: ObjectId,
    pub tree_a: ObjectId,
    pub tree_b: ObjectId,
    pub tree_c: ObjectId,
    pub subtree_c: ObjectId,
}

/// `a` adds a.txt, `b` adds b.txt, `c` adds dir/c.txt.
pub fn chain(repo: &MemoryRepo) -> Chain {
    let blob_a = repo.blob(b"alpha\n");
    let blob_b = repo.blob(b"bravo\n");
    let blob_c = repo.blob(b"charlie\n");

    let tree_a = repo.files(&[("a.txt", &blob_a)]);
    let tree_b = repo.files(&[("a.txt", &blob_a), ("b.txt", &blob_b)]);
    let subtree_c = repo.files(&[("c.txt", &blob_c)]);
    let tree_c = repo.tree(&[
        ("100644", "a.txt", &blob_a),
        ("100644", "b.txt", &blob_b),
        ("40000", "dir", &subtree_c),
    ]);

    let a = repo.commit(&tree_a, &[], "a");
    let b = repo.commit(&tree_b, &[&a], "b");
    let c = repo.commit(&tree_c, &[&b], "c");

    Chain {
        a,
        b,
        c,
        blob_a,
        blob_b,
        blob_c,
        tree_a,
        tree_b,
        tree_c,
        subtree_c,
    }
}

pub fn ids<'a>(items: impl IntoIterator<Item = &'a ObjectId>) -> BTreeSet<ObjectId> {
    items.into_iter().cloned().collect()
}

pub fn record_names(dir: &Path) -> BTreeSet<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.'))
            .collect(),
        Err(_) => BTreeSet::new(),
    }
}
