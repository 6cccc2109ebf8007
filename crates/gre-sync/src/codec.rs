//! Loose object framing: `"<kind> <len>\0" || content`, zlib compressed.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use gre_core::ObjectKind;

use crate::error::{SyncError, SyncResult};

/// Prefix `content` with its git object header.
pub fn wrap(kind: ObjectKind, content: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", kind.as_str(), content.len());
    let mut out = Vec::with_capacity(header.len() + content.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(content);
    out
}

/// Split a wrapped object into its kind and content, checking the length.
pub fn unwrap(wrapped: &[u8]) -> SyncResult<(ObjectKind, &[u8])> {
    let nul = wrapped
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| SyncError::malformed("object header has no NUL terminator"))?;
    let header = std::str::from_utf8(&wrapped[..nul])
        .map_err(|_| SyncError::malformed("object header is not UTF-8"))?;
    let (kind, len) = header
        .split_once(' ')
        .ok_or_else(|| SyncError::malformed(format!("bad object header {header:?}")))?;
    let kind: ObjectKind = kind
        .parse()
        .map_err(|_| SyncError::malformed(format!("unknown object kind {kind:?}")))?;
    let len: usize = len
        .parse()
        .map_err(|_| SyncError::malformed(format!("bad object length {len:?}")))?;

    let content = &wrapped[nul + 1..];
    if content.len() != len {
        return Err(SyncError::malformed(format!(
            "{kind} declares {len} bytes but carries {}",
            content.len()
        )));
    }
    Ok((kind, content))
}

pub fn deflate(data: &[u8]) -> SyncResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn inflate(data: &[u8]) -> SyncResult<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| SyncError::malformed(format!("zlib: {e}")))?;
    Ok(out)
}
