use serde::Deserialize;
use serde::Serialize;

use crate::state::vault::VaultError;

/// Outcome of a wallet lock operation, as reported to clients.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    WalletNotAvailable,
    EncrypterNotAvailable,
    WalletNotEncrypted,
    WalletIsEncrypted,
    IncorrectOldPassword,
    IncorrectPassword,
    AlreadyLocked,
    WalletLocked,
    BalanceNotAvailable,
    InvalidArgument,
    Internal,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// A failed wallet lock operation. Every variant corresponds to exactly one
/// non-`Ok` [StatusCode].
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub enum WalletLockError {
    #[error("wallet is not available")]
    WalletNotAvailable,

    #[error("wallet encrypter is not available")]
    EncrypterNotAvailable,

    #[error("wallet is not encrypted with a password")]
    WalletNotEncrypted,

    #[error("wallet is encrypted with a password")]
    WalletIsEncrypted,

    #[error("incorrect old password")]
    IncorrectOldPassword,

    #[error("incorrect password")]
    IncorrectPassword,

    #[error("wallet is already locked")]
    AlreadyLocked,

    #[error("wallet is locked")]
    WalletLocked,

    #[error("balance is not yet available")]
    BalanceNotAvailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WalletLockError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::WalletNotAvailable => StatusCode::WalletNotAvailable,
            Self::EncrypterNotAvailable => StatusCode::EncrypterNotAvailable,
            Self::WalletNotEncrypted => StatusCode::WalletNotEncrypted,
            Self::WalletIsEncrypted => StatusCode::WalletIsEncrypted,
            Self::IncorrectOldPassword => StatusCode::IncorrectOldPassword,
            Self::IncorrectPassword => StatusCode::IncorrectPassword,
            Self::AlreadyLocked => StatusCode::AlreadyLocked,
            Self::WalletLocked => StatusCode::WalletLocked,
            Self::BalanceNotAvailable => StatusCode::BalanceNotAvailable,
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::Internal(_) => StatusCode::Internal,
        }
    }
}

impl From<VaultError> for WalletLockError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NotAvailable => Self::WalletNotAvailable,
            VaultError::EncrypterNotAvailable => Self::EncrypterNotAvailable,
            other => Self::Internal(other.to_string()),
        }
    }
}

/// The `(ok, status)` pair every operation resolves to.
pub fn outcome<T>(result: &Result<T, WalletLockError>) -> (bool, StatusCode) {
    match result {
        Ok(_) => (true, StatusCode::Ok),
        Err(e) => (false, e.status()),
    }
}
