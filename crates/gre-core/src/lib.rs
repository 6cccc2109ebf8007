//! gre-core: types shared by every git-remote-encrypted crate.
//!
//! Holds the object id / ref vocabulary, the on-disk layout of the encrypted
//! mirror, and the TOML configuration schema.

pub mod config;
pub mod error;
pub mod layout;
pub mod types;

pub use config::GreConfig;
pub use error::{GreError, GreResult};
pub use layout::{KeyLayout, MirrorLayout};
pub use types::{ObjectId, ObjectKind, PushRef, RefPair, REF_OID};
