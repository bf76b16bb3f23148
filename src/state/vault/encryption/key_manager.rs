//! Argon2id key derivation for the wallet secret

use argon2::Algorithm;
use argon2::Argon2;
use argon2::ParamsBuilder;
use argon2::Version;
use hkdf::Hkdf;
use rand::Rng;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::format::Argon2Params;
use crate::state::vault::VaultError;

const HKDF_INFO: &[u8] = b"wallet-lock-secret-encryption-v1";

/// Master key derived from a user password. Zeroed on drop.
pub struct WalletKeyManager {
    master_key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for WalletKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WalletKeyManager(<redacted>)")
    }
}

impl WalletKeyManager {
    /// Derive master key from password using Argon2id.
    ///
    /// With the default parameters this takes about a second, so callers on
    /// an async runtime should run it on a blocking thread.
    pub fn from_password(
        password: &str,
        salt: &[u8; 32],
        params: Argon2Params,
    ) -> Result<Self, VaultError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.build()?);

        let mut master_key = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut *master_key)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

        Ok(Self { master_key })
    }

    pub fn generate_salt() -> [u8; 32] {
        let mut salt = [0u8; 32];
        rand::rng().fill(&mut salt);
        salt
    }

    /// Derive the secret encryption key using HKDF-SHA256
    pub fn derive_wallet_key(&self) -> Result<Zeroizing<[u8; 32]>, VaultError> {
        let hkdf = Hkdf::<Sha256>::new(None, &*self.master_key);
        let mut key = Zeroizing::new([0u8; 32]);
        hkdf.expand(HKDF_INFO, &mut *key)
            .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }
}

impl Argon2Params {
    /// Validated argon2 parameters. Out-of-range costs mean the vault has no
    /// usable key derivation.
    pub(crate) fn build(self) -> Result<argon2::Params, VaultError> {
        ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .build()
            .map_err(|e| {
                tracing::error!("invalid argon2 parameters {:?}: {}", self, e);
                VaultError::EncrypterNotAvailable
            })
    }
}
