//! gre-cli: front ends for git-remote-encrypted.
//!
//! - `git-remote-encrypted`: the helper git starts for `encrypted::` remotes
//! - `git-encrypted`: creates the mirror and its keys, inspects refs

pub mod helper;
pub mod logging;
pub mod protocol;
pub mod url;

pub use helper::{serve, HelperBackend};
pub use url::RemoteUrl;
