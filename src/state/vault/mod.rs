//! The key vault: owner of the wallet's secret material.
//!
//! The lock coordinator never sees the secret itself. It asks a [KeyVault] to
//! derive an opaque [KeyMaterial] from a password, to check that key against
//! the sealed secret, and to seal or unseal the secret with it.

pub mod encryption;
pub mod local_vault;

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use zeroize::Zeroizing;

pub use local_vault::LocalKeyVault;

/// A derived 256-bit key. Zeroed on drop and never printed.
#[derive(Clone)]
pub struct KeyMaterial(Zeroizing<[u8; 32]>);

impl KeyMaterial {
    pub fn new(key: Zeroizing<[u8; 32]>) -> Self {
        Self(key)
    }

    pub fn expose(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compares two keys without short-circuiting on the first differing byte.
    pub fn matches(&self, other: &KeyMaterial) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// Failures reported by a [KeyVault].
///
/// `EncrypterNotAvailable` means the vault has no usable key-derivation
/// facility. A wrong password is not an error: [KeyVault::verify_key]
/// answers `Ok(false)`.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum VaultError {
    #[error("wallet is not available")]
    NotAvailable,

    #[error("wallet encrypter is not available")]
    EncrypterNotAvailable,

    #[error("wallet secret is not encrypted")]
    NotEncrypted,

    #[error("wallet secret is already encrypted")]
    AlreadyEncrypted,

    #[error("key does not unlock the wallet secret")]
    WrongKey,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("cipher failure: {0}")]
    Cipher(String),

    #[error("wallet file i/o failed: {0}")]
    Io(String),

    #[error("wallet file is malformed: {0}")]
    Format(String),
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        Self::Format(e.to_string())
    }
}

/// Storage and crypto engine behind the wallet lock.
///
/// Key derivation must be deterministic for a given vault: the same password
/// always yields a key that [KeyVault::verify_key] accepts after
/// [KeyVault::encrypt] sealed the secret with it.
#[async_trait]
pub trait KeyVault: fmt::Debug + Send + Sync + 'static {
    /// true once the wallet has been loaded.
    fn is_available(&self) -> bool;

    /// true if the secret is sealed at rest.
    fn is_encrypted(&self) -> Result<bool, VaultError>;

    /// Derive a key from `password` using the vault's stored salt and cost
    /// parameters.
    async fn derive_key(&self, password: &str) -> Result<KeyMaterial, VaultError>;

    /// Check `key` against the sealed secret.
    fn verify_key(&self, key: &KeyMaterial) -> Result<bool, VaultError>;

    /// Unseal the secret.
    async fn decrypt(&mut self, key: &KeyMaterial) -> Result<(), VaultError>;

    /// Seal the secret.
    async fn encrypt(&mut self, key: &KeyMaterial) -> Result<(), VaultError>;

    /// Spendable balance in base units, or `None` if it cannot be computed
    /// in the current state.
    fn available_balance(&self) -> Result<Option<u64>, VaultError>;

    /// Bring the wallet into the available state.
    async fn load(&mut self) -> Result<(), VaultError> {
        Ok(())
    }
}
