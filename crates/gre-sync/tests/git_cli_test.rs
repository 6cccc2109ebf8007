//! Push and fetch through the real `git` executable. Skipped when `git` is
//! not installed.

use std::path::Path;
use std::process::Command;

use gre_core::{GreConfig, KeyLayout, ObjectId, ObjectKind, PushRef};
use gre_crypto::{save_keys, Keys};
use gre_sync::walker::closure;
use gre_sync::{EncryptedRemote, GitCli, GitRepository, KeySource, RefOutcome, SyncError};
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn count_records(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            !e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with('.')
        })
        .count()
}

#[test]
fn push_and_fetch_with_git_cli() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream.git");
    let work = tmp.path().join("work");
    let other = tmp.path().join("other");
    let url = upstream.to_string_lossy().to_string();

    git(tmp.path(), &["init", "--quiet", "--bare", "-b", "main", "upstream.git"]);
    git(tmp.path(), &["init", "--quiet", "-b", "main", "work"]);
    git(tmp.path(), &["init", "--quiet", "-b", "main", "other"]);

    std::fs::write(work.join("hello.txt"), "hello from git\n").unwrap();
    git(&work, &["add", "hello.txt"]);
    git(&work, &["commit", "--quiet", "-m", "first"]);
    let commit = git(&work, &["rev-parse", "HEAD"]);
    let blob = git(&work, &["rev-parse", "HEAD:hello.txt"]);

    let keys = Keys::generate(&mut rand::thread_rng());
    for repo in [&work, &other] {
        save_keys(&KeyLayout::for_git_dir(&repo.join(".git")).keys_path(), &keys).unwrap();
    }

    let mut config = GreConfig::default();
    config.sync.workers = 2;
    let no_passphrase = KeySource::passphrase(None);

    let remote = EncryptedRemote::open(&work.join(".git"), &url, &config, &no_passphrase).unwrap();
    let report = remote.push(&[PushRef::new("refs/heads/main", "refs/heads/main")]).unwrap();
    assert!(!report.aborted);
    assert!(matches!(report.results[0].outcome, RefOutcome::Success(_)));
    assert_eq!(count_records(&remote.mirror().objects_dir()), 3);
    assert_eq!(count_records(&remote.mirror().refs_dir()), 1);
    assert!(!git(&upstream, &["rev-parse", "refs/heads/main"]).is_empty());

    let again = remote.push(&[PushRef::new("refs/heads/main", "refs/heads/main")]).unwrap();
    assert!(matches!(again.results[0].outcome, RefOutcome::NoChange(_)));
    assert_eq!(count_records(&remote.mirror().objects_dir()), 3);

    let fetcher = EncryptedRemote::open(&other.join(".git"), &url, &config, &no_passphrase).unwrap();
    let listing = fetcher.list(false).unwrap();
    assert_eq!(listing.refs.len(), 1);
    assert_eq!(
        listing.refs[0].object_id.as_ref().map(|id| id.as_str()),
        Some(commit.as_str())
    );
    fetcher.fetch().unwrap();

    let local = GitCli::new(other.join(".git"));
    let blob_id = blob.parse().unwrap();
    assert!(local.has_object(&blob_id).unwrap());
    assert_eq!(git(&other, &["cat-file", "blob", &blob]), "hello from git");
    assert_eq!(git(&other, &["cat-file", "-t", &commit]), "commit");
}

#[test]
fn git_cli_reads_objects_through_one_session() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    git(tmp.path(), &["init", "--quiet", "-b", "main", "work"]);
    std::fs::write(work.join("a.txt"), "first line\n\nsecond\n").unwrap();
    git(&work, &["add", "a.txt"]);
    git(&work, &["commit", "--quiet", "-m", "one"]);
    std::fs::write(work.join("b.txt"), "").unwrap();
    git(&work, &["add", "b.txt"]);
    git(&work, &["commit", "--quiet", "-m", "two"]);

    let id = |rev: &str| -> ObjectId { git(&work, &["rev-parse", rev]).parse().unwrap() };
    let (first, second) = (id("HEAD~1"), id("HEAD"));

    let repo = GitCli::new(work.join(".git"));
    let (kind, content) = repo.read_raw(&id("HEAD:a.txt")).unwrap();
    assert_eq!(kind, ObjectKind::Blob);
    assert_eq!(content, b"first line\n\nsecond\n");
    assert_eq!(repo.read_raw(&id("HEAD:b.txt")).unwrap(), (ObjectKind::Blob, Vec::new()));

    let commit = repo.read_commit(&second).unwrap();
    assert_eq!(commit.parents, vec![first.clone()]);
    assert!(commit.time > 0);
    assert_eq!(repo.read_tree(&second).unwrap().id, id("HEAD^{tree}"));

    let absent: ObjectId = "0123456789abcdef0123456789abcdef01234567".parse().unwrap();
    assert!(matches!(repo.read_raw(&absent), Err(SyncError::NotFound(_))));

    // written after the session started
    let written = repo.write_object(b"blob 4\0late").unwrap();
    assert_eq!(repo.read_raw(&written).unwrap(), (ObjectKind::Blob, b"late".to_vec()));

    let found = closure(&repo, &second, Some(&first)).unwrap();
    assert!(found.contains(&second));
    assert!(found.contains(&id("HEAD:b.txt")));
    assert!(!found.contains(&first));
    assert!(!found.contains(&id("HEAD:a.txt")));
}
