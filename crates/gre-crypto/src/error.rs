use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("decryption failed: wrong key or corrupted data")]
    Decryption,

    #[error("corrupted record: {0}")]
    CorruptedRecord(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("key file error: {0}")]
    KeyFile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
