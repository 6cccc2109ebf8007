//! Deterministic XChaCha20-Poly1305 record encryption
//!
//! Record format (binary):
//! ```text
//! filename: hex([N bytes: sealed object id][16 bytes: Poly1305 tag])
//! body:     [24 bytes: nonce][M bytes: sealed content][16 bytes: Poly1305 tag]
//! nonce  =  SHA-512(object_id || salt_key)[..24]
//! ```
//!
//! The nonce is a function of the object id alone, so re-encrypting an
//! object always yields the same record. Object ids name immutable content,
//! which means one nonce never seals two different plaintexts under the same
//! key.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use sha2::{Digest, Sha512};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::Keys;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// An encrypted record as written to the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    /// Hex-encoded sealed id; the record's file name.
    pub filename: String,
    /// `nonce || sealed content`; the record's file body.
    pub body: Vec<u8>,
}

/// Derive the nonce for `id`: first 24 bytes of `SHA-512(id || salt_key)`.
pub fn derive_nonce(id: &str, salt_key: &[u8; KEY_SIZE]) -> [u8; NONCE_SIZE] {
    let mut hasher = Sha512::new();
    hasher.update(id.as_bytes());
    hasher.update(salt_key);
    let digest = hasher.finalize();

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&digest[..NONCE_SIZE]);
    nonce
}

/// Authenticated-encrypt `plaintext`. Output is `ciphertext || tag`.
pub fn seal(plaintext: &[u8], nonce: &[u8; NONCE_SIZE], key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::MalformedInput(format!("encryption failed: {e}")))
}

/// Verify and decrypt `ciphertext || tag`.
pub fn open(ciphertext: &[u8], nonce: &[u8; NONCE_SIZE], key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::MalformedInput(format!(
            "ciphertext too short: {} bytes (minimum {TAG_SIZE})",
            ciphertext.len()
        )));
    }
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

/// Seal `id` under `nonce` and the filename key; hex-encode the result.
///
/// There is no inverse that works from the filename alone: the nonce lives in
/// the record body.
pub fn encrypt_filename(
    id: &str,
    nonce: &[u8; NONCE_SIZE],
    filename_key: &[u8; KEY_SIZE],
) -> CryptoResult<String> {
    let sealed = seal(id.as_bytes(), nonce, filename_key)?;
    Ok(hex::encode(sealed))
}

/// The record filename `id` is stored under, derived from scratch.
pub fn filename_for(id: &str, keys: &Keys) -> CryptoResult<String> {
    let nonce = derive_nonce(id, keys.salt());
    encrypt_filename(id, &nonce, keys.filename())
}

/// Encrypt one object into its mirror record.
pub fn encrypt_file(id: &str, content: &[u8], keys: &Keys) -> CryptoResult<EncryptedRecord> {
    let nonce = derive_nonce(id, keys.salt());
    let filename = encrypt_filename(id, &nonce, keys.filename())?;

    let sealed = seal(content, &nonce, keys.content())?;
    let mut body = Vec::with_capacity(NONCE_SIZE + sealed.len());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&sealed);

    Ok(EncryptedRecord { filename, body })
}

/// Split a record body into its nonce and sealed content.
pub fn split_body(body: &[u8]) -> CryptoResult<([u8; NONCE_SIZE], &[u8])> {
    if body.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::MalformedInput(format!(
            "record body too short: {} bytes (minimum {})",
            body.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }
    let (nonce_bytes, sealed) = body.split_at(NONCE_SIZE);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(nonce_bytes);
    Ok((nonce, sealed))
}

/// Decrypt a record and recover the id sealed into its filename.
///
/// Fails with [`CryptoError::Decryption`] if the body does not authenticate
/// and [`CryptoError::CorruptedRecord`] if the filename does not belong to
/// the body.
pub fn decrypt_file(filename_hex: &str, body: &[u8], keys: &Keys) -> CryptoResult<(String, Vec<u8>)> {
    let sealed_id = hex::decode(filename_hex)
        .map_err(|e| CryptoError::MalformedInput(format!("record filename is not hex: {e}")))?;
    let (nonce, sealed) = split_body(body)?;

    let content = open(sealed, &nonce, keys.content())?;

    let id_bytes = open(&sealed_id, &nonce, keys.filename()).map_err(|_| {
        CryptoError::CorruptedRecord(format!("filename {filename_hex} does not match its body"))
    })?;
    let id = String::from_utf8(id_bytes)
        .map_err(|_| CryptoError::CorruptedRecord("sealed id is not UTF-8".into()))?;

    if derive_nonce(&id, keys.salt()) != nonce {
        return Err(CryptoError::CorruptedRecord(format!(
            "nonce of record {filename_hex} was not derived from {id}"
        )));
    }
    if encrypt_filename(&id, &nonce, keys.filename())? != filename_hex.to_ascii_lowercase() {
        return Err(CryptoError::CorruptedRecord(format!(
            "filename {filename_hex} does not re-derive from {id}"
        )));
    }

    Ok((id, content))
}

/// Decrypt a record body without looking at its filename.
pub fn decrypt_content_only(body: &[u8], keys: &Keys) -> CryptoResult<Vec<u8>> {
    let (nonce, sealed) = split_body(body)?;
    open(sealed, &nonce, keys.content())
}
