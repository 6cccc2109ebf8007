//! git-encrypted: set up and inspect the encrypted mirror of a repository.
//!
//!   init <url> [--random]  - prepare the mirror and create keys
//!   refs                   - print the refs stored in the mirror

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gre_cli::{logging, RemoteUrl};
use gre_core::{GreConfig, KeyLayout, MirrorLayout};
use gre_crypto::load_keys;
use gre_sync::meta::ensure_meta;
use gre_sync::remote::{create_random_keys, load_or_derive_keys, prepare_mirror};
use gre_sync::{GitCliTransport, KeySource, RefStore};
use secrecy::{ExposeSecret, SecretString};

#[derive(Parser, Debug)]
#[command(
    name = "git-encrypted",
    version,
    about = "Manage the encrypted mirror used by git-remote-encrypted"
)]
struct Cli {
    /// Plaintext repository
    #[arg(long, env = "GIT_DIR", default_value = ".git")]
    git_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare the encrypted mirror and create keys
    Init {
        /// Mirror URL, as given to `git remote add <name> encrypted::<url>`
        url: String,

        /// Generate random keys instead of deriving them from a passphrase
        #[arg(long)]
        random: bool,
    },

    /// Print the refs stored in the encrypted mirror
    Refs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = GreConfig::load(&cli.git_dir)
        .with_context(|| format!("loading config for {}", cli.git_dir.display()))?;
    logging::init(&config.log);

    match cli.command {
        Commands::Init { url, random } => cmd_init(&cli.git_dir, &config, &url, random),
        Commands::Refs => cmd_refs(&cli.git_dir),
    }
}

fn cmd_init(git_dir: &Path, config: &GreConfig, url: &str, random: bool) -> Result<()> {
    let keys_path = KeyLayout::for_git_dir(git_dir).keys_path();
    if keys_path.exists() {
        bail!("keys already exist at {}", keys_path.display());
    }

    let remote_url = RemoteUrl::parse(url)?;
    let layout = MirrorLayout::for_git_dir(git_dir);
    let transport = GitCliTransport::new(&config.sync);
    prepare_mirror(&layout, &remote_url.url, &transport)
        .with_context(|| format!("preparing mirror at {}", layout.root().display()))?;
    ensure_meta(&layout, &config.kdf).context("writing mirror metadata")?;

    if random {
        let path = create_random_keys(git_dir)?;
        println!("generated random keys: {}", path.display());
        println!("copy this file to every clone that needs access");
    } else {
        let passphrase = match remote_url.passphrase {
            Some(p) => p,
            None => prompt_passphrase()?,
        };
        let source = KeySource::passphrase(Some(passphrase));
        load_or_derive_keys(git_dir, &layout, config, &source).context("deriving keys")?;
        println!("derived keys: {}", keys_path.display());
    }

    println!("mirror: {}", layout.root().display());
    println!("add the remote with: git remote add <name> encrypted::{}", remote_url.url);
    Ok(())
}

fn prompt_passphrase() -> Result<SecretString> {
    let first = SecretString::from(rpassword::prompt_password("Passphrase: ")?);
    if first.expose_secret().is_empty() {
        bail!("passphrase must not be empty");
    }
    let second = SecretString::from(rpassword::prompt_password("Repeat passphrase: ")?);
    if first.expose_secret() != second.expose_secret() {
        bail!("passphrases do not match");
    }
    Ok(first)
}

fn cmd_refs(git_dir: &Path) -> Result<()> {
    let keys_path = KeyLayout::for_git_dir(git_dir).keys_path();
    let keys = load_keys(&keys_path)
        .with_context(|| format!("loading keys from {}", keys_path.display()))?;
    let store = RefStore::new(MirrorLayout::for_git_dir(git_dir), keys);

    let refs = store.read().context("reading encrypted refs")?;
    if refs.is_empty() {
        println!("no refs in {}", MirrorLayout::for_git_dir(git_dir).root().display());
    }
    for pair in refs {
        println!("{} {}", pair.object_id, pair.name);
    }
    Ok(())
}
