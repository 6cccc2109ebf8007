//! gre-crypto: deterministic per-object encryption for git-remote-encrypted
//!
//! Every repository object is sealed with XChaCha20-Poly1305 under a nonce
//! derived from its object id, so the same object always produces the same
//! encrypted record and independent pushes agree byte-for-byte.
//!
//! Key hierarchy:
//! ```text
//! passphrase ──scrypt(salt, N, r, p)──▶ 96-byte block
//!   ├── [0..32]  content key   (seals object bodies)
//!   ├── [32..64] filename key  (seals object ids into record filenames)
//!   └── [64..96] salt key      (mixed into nonce derivation)
//! ```
//!
//! Record format:
//! ```text
//! filename = hex(seal(object_id, nonce, filename_key))
//! body     = nonce (24 bytes) || seal(content, nonce, content_key)
//! nonce    = SHA-512(object_id || salt_key)[..24]
//! ```

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod keys;

pub use cipher::{
    decrypt_content_only, decrypt_file, derive_nonce, encrypt_file, encrypt_filename,
    filename_for, open, seal, split_body, EncryptedRecord,
};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_keys, KdfParams, KeyDeriver, ScryptDeriver};
pub use keys::{load_keys, save_keys, Keys};

/// Size of each symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the KDF output block that is split into the three keys
pub const DERIVED_BLOCK_SIZE: usize = 3 * KEY_SIZE;
