//! [`EncryptedRemote`]: one plaintext repository paired with its encrypted
//! mirror. Entry point for the remote helper and the CLI.

use std::path::{Path, PathBuf};

use gre_core::{GreConfig, KeyLayout, MirrorLayout, ObjectId, PushRef};
use gre_crypto::{load_keys, save_keys, KeyDeriver, Keys, ScryptDeriver};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::fetch::FetchOrchestrator;
use crate::git::{GitCli, GitRepository};
use crate::meta::ensure_meta;
use crate::objects::{CopyStats, ObjectSync};
use crate::policy::{self, RefUpdatePolicy};
use crate::push::{PushOrchestrator, PushReport};
use crate::refs::RefStore;
use crate::transport::{GitCliTransport, MirrorTransport};

/// Ref names advertised as the remote's HEAD, in preference order.
const HEAD_CANDIDATES: [&str; 2] = ["refs/heads/main", "refs/heads/master"];

/// A ref as advertised by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedRef {
    pub name: String,
    /// `None` when the mirror holds no record for the target object.
    pub object_id: Option<ObjectId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefListing {
    pub refs: Vec<ListedRef>,
    /// Ref the remote HEAD points at.
    pub head: Option<String>,
}

/// Where keys come from when `keys.json` does not exist yet.
pub struct KeySource<'a> {
    pub passphrase: Option<SecretString>,
    pub deriver: &'a dyn KeyDeriver,
}

impl KeySource<'static> {
    /// Derive with scrypt from `passphrase`, if one is given.
    pub fn passphrase(passphrase: Option<SecretString>) -> Self {
        Self {
            passphrase,
            deriver: &ScryptDeriver,
        }
    }
}

/// Load `<gitdir>/encrypted-keys/keys.json`, deriving and saving keys from a
/// passphrase on first use.
pub fn load_or_derive_keys(
    git_dir: &Path,
    mirror: &MirrorLayout,
    config: &GreConfig,
    source: &KeySource<'_>,
) -> SyncResult<Keys> {
    let keys_path = KeyLayout::for_git_dir(git_dir).keys_path();
    if keys_path.is_file() {
        debug!(path = %keys_path.display(), "loading keys");
        return Ok(load_keys(&keys_path)?);
    }

    let Some(passphrase) = &source.passphrase else {
        return Err(SyncError::KeysMissing(keys_path));
    };
    let meta = ensure_meta(mirror, &config.kdf)?;
    let keys = source.deriver.derive(passphrase, &meta.derivation_params)?;
    save_keys(&keys_path, &keys)?;
    info!(path = %keys_path.display(), "derived and saved keys");
    Ok(keys)
}

/// Generate random keys and save them. Fails if keys already exist.
pub fn create_random_keys(git_dir: &Path) -> SyncResult<PathBuf> {
    let keys_path = KeyLayout::for_git_dir(git_dir).keys_path();
    if keys_path.exists() {
        return Err(gre_core::GreError::Config(format!(
            "{} already exists",
            keys_path.display()
        ))
        .into());
    }
    save_keys(&keys_path, &Keys::generate(&mut rand::rngs::OsRng))?;
    info!(path = %keys_path.display(), "generated random keys");
    Ok(keys_path)
}

/// Make sure the mirror working tree exists: clone `url`, or start empty.
pub fn prepare_mirror(
    layout: &MirrorLayout,
    url: &str,
    transport: &dyn MirrorTransport,
) -> SyncResult<()> {
    if !layout.git_dir().exists() {
        if let Err(e) = transport.clone_mirror(url, layout.root()) {
            warn!(url, error = %e, "clone failed; starting an empty mirror");
            transport.init(layout.root())?;
        }
    }
    layout.ensure_dirs()?;
    Ok(())
}

pub struct EncryptedRemote {
    repo: Box<dyn GitRepository>,
    transport: Box<dyn MirrorTransport>,
    policy: Box<dyn RefUpdatePolicy>,
    objects: ObjectSync,
    refs: RefStore,
    url: String,
}

impl EncryptedRemote {
    /// Open the remote for the repository at `git_dir` using the `git` CLI.
    pub fn open(
        git_dir: &Path,
        url: &str,
        config: &GreConfig,
        source: &KeySource<'_>,
    ) -> SyncResult<Self> {
        Self::open_with(
            Box::new(GitCli::new(git_dir)),
            Box::new(GitCliTransport::new(&config.sync)),
            git_dir,
            url,
            config,
            source,
        )
    }

    /// Open with explicit repository and transport backends.
    pub fn open_with(
        repo: Box<dyn GitRepository>,
        transport: Box<dyn MirrorTransport>,
        git_dir: &Path,
        url: &str,
        config: &GreConfig,
        source: &KeySource<'_>,
    ) -> SyncResult<Self> {
        let layout = MirrorLayout::for_git_dir(git_dir);
        prepare_mirror(&layout, url, transport.as_ref())?;
        let keys = load_or_derive_keys(git_dir, &layout, config, source)?;

        let objects = ObjectSync::new(layout.clone(), keys.clone(), config.sync.workers)?
            .verify_ids(config.sync.verify_ids);
        let refs = RefStore::new(layout, keys);

        Ok(Self {
            repo,
            transport,
            policy: policy::from_config(config.sync.enforce_fast_forward),
            objects,
            refs,
            url: url.to_string(),
        })
    }

    pub fn mirror(&self) -> &MirrorLayout {
        self.objects.layout()
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn objects(&self) -> &ObjectSync {
        &self.objects
    }

    /// Refs stored in the mirror, after a best-effort pull.
    pub fn list(&self, for_push: bool) -> SyncResult<RefListing> {
        self.transport.pull(&self.url, self.mirror().root(), false)?;

        let mut listing = RefListing::default();
        for pair in self.refs.read()? {
            let object_id = if self.objects.has_record(&pair.object_id)? {
                Some(pair.object_id)
            } else {
                warn!(refname = %pair.name, "ref target missing from mirror");
                None
            };
            listing.refs.push(ListedRef {
                name: pair.name,
                object_id,
            });
        }

        if !for_push {
            listing.head = HEAD_CANDIDATES
                .iter()
                .find(|c| listing.refs.iter().any(|r| r.name == **c))
                .map(|c| c.to_string());
        }
        Ok(listing)
    }

    pub fn fetch(&self) -> SyncResult<CopyStats> {
        FetchOrchestrator {
            repo: self.repo.as_ref(),
            objects: &self.objects,
            transport: self.transport.as_ref(),
            url: &self.url,
        }
        .fetch()
    }

    pub fn push(&self, refs: &[PushRef]) -> SyncResult<PushReport> {
        PushOrchestrator {
            repo: self.repo.as_ref(),
            objects: &self.objects,
            refs: &self.refs,
            transport: self.transport.as_ref(),
            policy: self.policy.as_ref(),
            url: &self.url,
        }
        .push(refs)
    }
}
