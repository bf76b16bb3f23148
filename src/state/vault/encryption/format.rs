//! On-disk layout of the wallet vault file.

use serde::Deserialize;
use serde::Serialize;
use zeroize::ZeroizeOnDrop;

use super::WalletKeyManager;
use crate::state::vault::VaultError;

pub const VAULT_FILE_VERSION: u8 = 1;

/// Argon2id cost parameters, stored with the vault so that a file keeps
/// deriving the same keys if the defaults change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Params {
    /// 256 MiB, 4 iterations, 4 lanes
    fn default() -> Self {
        Self {
            memory_kib: 262_144,
            iterations: 4,
            parallelism: 4,
        }
    }
}

impl Argon2Params {
    /// The cheapest parameters argon2 accepts. Offers no real protection;
    /// meant for tests and throwaway wallets.
    pub fn minimal() -> Self {
        Self {
            memory_kib: argon2::Params::MIN_M_COST,
            iterations: argon2::Params::MIN_T_COST,
            parallelism: argon2::Params::MIN_P_COST,
        }
    }
}

/// The wallet's private material. Zeroed on drop.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, ZeroizeOnDrop)]
pub struct WalletSecret {
    pub seed: [u8; 32],
    pub balance: u64,
}

impl std::fmt::Debug for WalletSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSecret")
            .field("seed", &"<redacted>")
            .field("balance", &self.balance)
            .finish()
    }
}

impl WalletSecret {
    pub fn new_random() -> Self {
        Self {
            seed: WalletKeyManager::generate_salt(),
            balance: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoredSecret {
    Plaintext(WalletSecret),
    Sealed { nonce: [u8; 12], ciphertext: Vec<u8> },
}

/// Everything persisted for one wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultFile {
    pub version: u8,
    pub kdf: Argon2Params,
    pub salt: [u8; 32],
    pub secret: StoredSecret,
}

impl VaultFile {
    pub fn new_unencrypted(kdf: Argon2Params) -> Self {
        Self {
            version: VAULT_FILE_VERSION,
            kdf,
            salt: WalletKeyManager::generate_salt(),
            secret: StoredSecret::Plaintext(WalletSecret::new_random()),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, VaultError> {
        let file: Self = serde_json::from_slice(bytes)?;
        if file.version != VAULT_FILE_VERSION {
            return Err(VaultError::Format(format!(
                "unsupported vault file version {}",
                file.version
            )));
        }
        Ok(file)
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.secret, StoredSecret::Sealed { .. })
    }
}
