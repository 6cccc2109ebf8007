use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GreError;

/// Reserved object id that marks encrypted ref records.
///
/// This is git's well-known empty tree id. Ref records use it as the prefix of
/// their cleartext record key so they can never collide with a real object id.
pub const REF_OID: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Length of a hex-encoded SHA-1 object id.
pub const OBJECT_ID_HEX_LEN: usize = 40;

/// A content hash (40 lowercase hex characters) naming an immutable object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Build an id from its 20 raw bytes (as found inside tree objects).
    pub fn from_raw(bytes: &[u8; 20]) -> Self {
        let mut s = String::with_capacity(OBJECT_ID_HEX_LEN);
        for b in bytes {
            s.push(char::from_digit(u32::from(b >> 4), 16).unwrap_or('0'));
            s.push(char::from_digit(u32::from(b & 0x0f), 16).unwrap_or('0'));
        }
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl FromStr for ObjectId {
    type Err = GreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != OBJECT_ID_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GreError::InvalidObjectId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for ObjectId {
    type Error = GreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Git object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }
}

impl FromStr for ObjectKind {
    type Err = GreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(ObjectKind::Commit),
            "tree" => Ok(ObjectKind::Tree),
            "blob" => Ok(ObjectKind::Blob),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(GreError::Config(format!("unknown object kind: {other}"))),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a ref currently points at in the encrypted ref store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefPair {
    #[serde(rename = "ref")]
    pub name: String,
    pub object_id: ObjectId,
}

impl RefPair {
    pub fn new(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            name: name.into(),
            object_id,
        }
    }
}

/// One `push` line from the native git client: `[+]<src>:<dst>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRef {
    /// Source ref in the plaintext repository. Empty means "delete `dst`".
    pub src: String,
    /// Destination ref in the encrypted ref store.
    pub dst: String,
    /// Whether the client asked for a forced update (`+` prefix).
    pub force: bool,
}

impl PushRef {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            force: false,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.src.is_empty()
    }
}

impl FromStr for PushRef {
    type Err = GreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (force, spec) = match s.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (src, dst) = spec
            .split_once(':')
            .ok_or_else(|| GreError::InvalidRefspec(s.to_string()))?;
        if dst.is_empty() {
            return Err(GreError::InvalidRefspec(s.to_string()));
        }
        Ok(Self {
            src: src.to_string(),
            dst: dst.to_string(),
            force,
        })
    }
}
