//! Wallet secret encryption using Argon2id + AES-256-GCM
//!
//! ## Architecture
//!
//! ```text
//! User Password (UTF-8) + 32-byte vault salt
//!     ↓ Argon2id (default 256 MB RAM, 4 iterations, 4 lanes)
//! Master Key (256 bits)
//!     ↓ HKDF-SHA256
//! Wallet Encryption Key (256 bits)
//!     ↓ AES-256-GCM, fresh 96-bit nonce per seal
//! Sealed Wallet Secret
//! ```
//!
//! The salt is created with the vault file and never rotated, so a password
//! always derives the same key for a given vault.

pub use cipher::CipherError;
pub use cipher::WalletCipher;
pub use format::Argon2Params;
pub use format::StoredSecret;
pub use format::VaultFile;
pub use format::WalletSecret;
pub use format::VAULT_FILE_VERSION;
pub use key_manager::WalletKeyManager;

mod cipher;
mod format;
mod key_manager;
