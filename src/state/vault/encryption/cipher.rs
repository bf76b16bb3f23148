//! AES-256-GCM authenticated encryption for the wallet secret

use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use rand::Rng;

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid AES key length")]
    InvalidKey,

    #[error("encryption failed")]
    Encryption,

    /// wrong key or corrupted ciphertext. GCM cannot tell the two apart.
    #[error("authentication failed (wrong key or corrupted data)")]
    Authentication,
}

/// Handles AES-256-GCM encryption/decryption
pub struct WalletCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for WalletCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletCipher").finish_non_exhaustive()
    }
}

impl WalletCipher {
    pub fn new(key: &[u8; 32]) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKey)?;
        Ok(Self { cipher })
    }

    /// Generate random 96-bit nonce
    pub fn generate_nonce() -> [u8; 12] {
        let mut nonce = [0u8; 12];
        rand::rng().fill(&mut nonce);
        nonce
    }

    /// Returns ciphertext with authentication tag appended
    pub fn seal(&self, plaintext: &[u8], nonce: &[u8; 12]) -> Result<Vec<u8>, CipherError> {
        self.cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CipherError::Encryption)
    }

    pub fn open(&self, ciphertext: &[u8], nonce: &[u8; 12]) -> Result<Vec<u8>, CipherError> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Authentication)
    }
}
