//! Remote URLs of the form `[encrypted::][<passphrase>::]<url>`.
//!
//! git strips the `encrypted::` transport prefix before starting the helper,
//! but `git-encrypted init` sees the URL as the user typed it.

use secrecy::SecretString;

const PREFIX: &str = "encrypted::";

pub struct RemoteUrl {
    /// URL of the mirror repository, passed to `git clone/pull/push`.
    pub url: String,
    pub passphrase: Option<SecretString>,
}

#[derive(Debug, thiserror::Error)]
#[error("cannot parse encrypted remote url {0:?}")]
pub struct UrlError(String);

impl RemoteUrl {
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let rest = raw.strip_prefix(PREFIX).unwrap_or(raw);
        let pieces: Vec<&str> = rest.split("::").collect();
        let (passphrase, url) = match pieces.as_slice() {
            [url] => (None, *url),
            [passphrase, url] => (Some(*passphrase).filter(|p| !p.is_empty()), *url),
            _ => return Err(UrlError(raw.to_string())),
        };
        if url.is_empty() {
            return Err(UrlError(raw.to_string()));
        }
        Ok(Self {
            url: url.to_string(),
            passphrase: passphrase.map(|p| SecretString::from(p.to_string())),
        })
    }
}
