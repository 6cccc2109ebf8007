//! Key derivation: scrypt(passphrase, params) → 96-byte block → [`Keys`]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::Keys;
use crate::DERIVED_BLOCK_SIZE;

// Output length recorded in scrypt::Params; the raw KDF output length is set
// by the buffer passed to scrypt::scrypt.
const SCRYPT_PARAMS_LEN: usize = 32;

/// scrypt parameters, stored once per mirror in `encrypted.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Salt string (its UTF-8 bytes are the scrypt salt)
    pub salt: String,
    /// scrypt N; must be a power of two greater than 1
    pub cpu_cost: u32,
    /// scrypt r
    pub block_size: u32,
    /// scrypt p
    pub parallelization_cost: u32,
}

impl KdfParams {
    /// Fresh parameters with a random base64 salt of `salt_bytes` bytes.
    pub fn generate<R: RngCore + ?Sized>(
        rng: &mut R,
        salt_bytes: usize,
        cpu_cost: u32,
        block_size: u32,
        parallelization_cost: u32,
    ) -> Self {
        let mut salt = vec![0u8; salt_bytes];
        rng.fill_bytes(&mut salt);
        Self {
            salt: STANDARD.encode(&salt),
            cpu_cost,
            block_size,
            parallelization_cost,
        }
    }

    /// Validate and convert to scrypt's parameter type.
    fn to_scrypt(&self) -> CryptoResult<scrypt::Params> {
        if self.salt.is_empty() {
            return Err(CryptoError::KeyDerivation("salt must not be empty".into()));
        }
        if self.cpu_cost < 2 || !self.cpu_cost.is_power_of_two() {
            return Err(CryptoError::KeyDerivation(format!(
                "cpu cost must be a power of two greater than 1, got {}",
                self.cpu_cost
            )));
        }
        if self.block_size == 0 {
            return Err(CryptoError::KeyDerivation("block size must be positive".into()));
        }
        if self.parallelization_cost == 0 {
            return Err(CryptoError::KeyDerivation(
                "parallelization cost must be positive".into(),
            ));
        }

        let log_n = self.cpu_cost.trailing_zeros() as u8;
        scrypt::Params::new(
            log_n,
            self.block_size,
            self.parallelization_cost,
            SCRYPT_PARAMS_LEN,
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid scrypt params: {e}")))
    }
}

/// Turns a passphrase into keys. Implemented by [`ScryptDeriver`]; tests may
/// substitute a cheap deterministic double.
pub trait KeyDeriver {
    fn derive(&self, passphrase: &SecretString, params: &KdfParams) -> CryptoResult<Keys>;
}

/// The production [`KeyDeriver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScryptDeriver;

impl KeyDeriver for ScryptDeriver {
    fn derive(&self, passphrase: &SecretString, params: &KdfParams) -> CryptoResult<Keys> {
        derive_keys(passphrase, params)
    }
}

/// Derive the three mirror keys from a passphrase with scrypt.
///
/// Deterministic: the same passphrase and parameters always give the same
/// keys. The 96-byte output is split as `content | filename | salt`.
pub fn derive_keys(passphrase: &SecretString, params: &KdfParams) -> CryptoResult<Keys> {
    let scrypt_params = params.to_scrypt()?;

    let mut block = Zeroizing::new([0u8; DERIVED_BLOCK_SIZE]);
    scrypt::scrypt(
        passphrase.expose_secret().as_bytes(),
        params.salt.as_bytes(),
        &scrypt_params,
        block.as_mut_slice(),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("scrypt failed: {e}")))?;

    tracing::debug!(
        cpu_cost = params.cpu_cost,
        block_size = params.block_size,
        parallelization_cost = params.parallelization_cost,
        "derived keys"
    );

    Ok(Keys::from_derived_block(&block))
}
