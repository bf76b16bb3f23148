//! implements an RPC server and client based on [tarpc]
//!
//! at present tarpc clients must also be written in rust.

use serde::Deserialize;
use serde::Serialize;
use tarpc::context;
use tracing::debug;
use zeroize::Zeroizing;

use crate::macros::fn_name;
use crate::state::lock::coordinator::LockStatus;
use crate::state::lock::coordinator::WalletLockCoordinator;
use crate::state::lock::status::StatusCode;
use crate::state::lock::status::WalletLockError;
use crate::state::vault::KeyVault;

/// Reply to every wallet lock call: `(ok, status)`, the error text when not
/// ok, and the call's result when there is one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcReply<T> {
    pub ok: bool,
    pub status: StatusCode,
    pub message: Option<String>,
    pub payload: Option<T>,
}

impl<T> From<Result<T, WalletLockError>> for RpcReply<T> {
    fn from(result: Result<T, WalletLockError>) -> Self {
        match result {
            Ok(payload) => Self {
                ok: true,
                status: StatusCode::Ok,
                message: None,
                payload: Some(payload),
            },
            Err(e) => Self {
                ok: false,
                status: e.status(),
                message: Some(e.to_string()),
                payload: None,
            },
        }
    }
}

#[tarpc::service]
pub trait RPC {
    /******** READ DATA ********/

    /// Returns the lock mode and, while timed-unlocked, the seconds left
    /// until the wallet relocks itself.
    async fn lock_status() -> LockStatus;

    /// Returns the spendable balance in base units.
    ///
    /// Fails with `WalletLocked` while the wallet is locked.
    async fn get_balance() -> RpcReply<u64>;

    /******** CHANGE THINGS ********/

    /// Encrypts an unencrypted wallet with `password`, or, when
    /// `new_password` is given, changes the password of an encrypted wallet.
    async fn set_password(password: String, new_password: Option<String>) -> RpcReply<()>;

    /// Decrypts the wallet permanently.
    async fn remove_password(password: String) -> RpcReply<()>;

    /// Decrypts the wallet for `timeout_secs` seconds. Calling again while
    /// unlocked restarts the timeout.
    async fn unlock_wallet(password: String, timeout_secs: i64) -> RpcReply<()>;

    /// Ends a timed unlock now.
    async fn lock_wallet() -> RpcReply<()>;
}

#[derive(Debug)]
pub struct WalletLockRpcServer<V> {
    coordinator: WalletLockCoordinator<V>,
}

impl<V> Clone for WalletLockRpcServer<V> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<V: KeyVault> WalletLockRpcServer<V> {
    pub fn new(coordinator: WalletLockCoordinator<V>) -> Self {
        Self { coordinator }
    }
}

impl<V: KeyVault> RPC for WalletLockRpcServer<V> {
    // documented in trait. do not add doc-comment.
    async fn lock_status(self, _: context::Context) -> LockStatus {
        debug!("{}", fn_name!());
        self.coordinator.lock_status().await
    }

    // documented in trait. do not add doc-comment.
    async fn get_balance(self, _: context::Context) -> RpcReply<u64> {
        debug!("{}", fn_name!());
        self.coordinator.get_available_balance().await.into()
    }

    // documented in trait. do not add doc-comment.
    async fn set_password(
        self,
        _: context::Context,
        password: String,
        new_password: Option<String>,
    ) -> RpcReply<()> {
        debug!("{}", fn_name!());
        let password = Zeroizing::new(password);
        let new_password = new_password.map(Zeroizing::new);
        self.coordinator
            .set_password(&password, new_password.as_deref().map(String::as_str))
            .await
            .into()
    }

    // documented in trait. do not add doc-comment.
    async fn remove_password(self, _: context::Context, password: String) -> RpcReply<()> {
        debug!("{}", fn_name!());
        let password = Zeroizing::new(password);
        self.coordinator
            .remove_wallet_password(&password)
            .await
            .into()
    }

    // documented in trait. do not add doc-comment.
    async fn unlock_wallet(
        self,
        _: context::Context,
        password: String,
        timeout_secs: i64,
    ) -> RpcReply<()> {
        debug!("{}", fn_name!());
        let password = Zeroizing::new(password);
        self.coordinator
            .unlock_wallet(&password, timeout_secs)
            .await
            .into()
    }

    // documented in trait. do not add doc-comment.
    async fn lock_wallet(self, _: context::Context) -> RpcReply<()> {
        debug!("{}", fn_name!());
        self.coordinator.lock_wallet().await.into()
    }
}
