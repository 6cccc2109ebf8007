//! gre-sync: moves a git repository's objects and refs into an encrypted
//! mirror repository and back.
//!
//! Push computes the objects the mirror lacks ([`walker`]), encrypts them into
//! `objects/` ([`objects`]), records ref targets in `refs/` ([`refs`]) and
//! commits and pushes the mirror ([`transport`]). Fetch pulls the mirror and
//! decrypts every object record into the plaintext repository.

pub mod codec;
pub mod error;
pub mod fetch;
pub mod git;
pub mod meta;
pub mod objects;
pub mod policy;
pub mod push;
pub mod records;
pub mod refs;
pub mod remote;
pub mod transport;
pub mod walker;

pub use error::{SyncError, SyncResult};
pub use git::{GitCli, GitRepository, StoredObject};
pub use objects::{CopyStats, ObjectSync};
pub use push::{PushReport, RefOutcome, RefResult};
pub use refs::RefStore;
pub use remote::{EncryptedRemote, KeySource, ListedRef, RefListing};
pub use transport::{GitCliTransport, MirrorTransport};
pub use walker::{closure, ObjectWalker};
