//! git-remote-encrypted: git remote helper for `encrypted::<url>` remotes.
//!
//! git runs `git-remote-encrypted <remote> <url>` with `GIT_DIR` set and
//! talks to it over stdin/stdout.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gre_cli::{logging, serve, RemoteUrl};
use gre_core::GreConfig;
use gre_sync::{EncryptedRemote, KeySource};
use secrecy::SecretString;

#[derive(Parser, Debug)]
#[command(
    name = "git-remote-encrypted",
    version,
    about = "git remote helper that stores an encrypted copy of the repository"
)]
struct Cli {
    /// Remote name (or the URL when git has no configured remote)
    remote: String,

    /// Mirror URL, optionally `<passphrase>::<url>`
    url: String,

    /// Plaintext repository
    #[arg(long, env = "GIT_DIR")]
    git_dir: PathBuf,

    /// Passphrase used to derive keys on first use
    #[arg(long, env = "GIT_ENCRYPTED_PASSWORD", hide_env_values = true)]
    passphrase: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = GreConfig::load(&cli.git_dir)
        .with_context(|| format!("loading config for {}", cli.git_dir.display()))?;
    logging::init(&config.log);

    let remote_url = RemoteUrl::parse(&cli.url)?;
    let passphrase = remote_url
        .passphrase
        .or_else(|| cli.passphrase.map(SecretString::from));
    tracing::debug!(remote = %cli.remote, url = %remote_url.url, "starting helper");

    let source = KeySource::passphrase(passphrase);
    let remote = EncryptedRemote::open(&cli.git_dir, &remote_url.url, &config, &source)
        .with_context(|| format!("opening encrypted remote {}", remote_url.url))?;

    serve(&remote, io::stdin().lock(), io::stdout().lock())
}
