//! The wallet lock coordinator.
//!
//! All mode changes, and every vault call that goes with them, happen while
//! holding one mutex. An auto-relock re-enters through the same mutex and
//! only acts on the timed unlock that armed it, so it can never relock a
//! wallet that a concurrent caller already moved elsewhere.
//!
//! Operations that touch the vault run on their own task. A caller that
//! gives up, such as an RPC request past its deadline, stops waiting for the
//! result but never stops the operation between two vault calls.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::future::FutureExt;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use zeroize::Zeroizing;

use super::mode::CachedPassword;
use super::mode::LockStateMachine;
use super::mode::ModeKind;
use super::mode::TransitionError;
use super::relock_scheduler::AutoRelockScheduler;
use super::relock_scheduler::RelockHandle;
use super::relock_scheduler::RelockId;
use super::status::WalletLockError;
use crate::application::locks::tokio::log_lock_event;
use crate::application::locks::tokio::AtomicMutex;
use crate::macros::fn_name;
use crate::state::vault::KeyMaterial;
use crate::state::vault::KeyVault;
use crate::state::vault::VaultError;

/// Delay before retrying an auto-relock whose vault call failed.
pub const RELOCK_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Longest timed unlock accepted by [WalletLockCoordinator::unlock_wallet].
pub const MAX_UNLOCK_TIMEOUT: Duration = Duration::from_secs(86_400 * 365);

/// Snapshot of the lock for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub mode: ModeKind,

    /// whole seconds until the pending auto-relock, if timed-unlocked
    pub relock_in_secs: Option<u64>,
}

#[derive(Debug)]
struct LockState<V> {
    vault: V,
    machine: LockStateMachine,
}

/// Governs whether the wallet secret is encrypted, and for how long a timed
/// unlock lasts.
///
/// Cheap to clone. All clones share one state.
#[derive(Debug)]
pub struct WalletLockCoordinator<V> {
    state: AtomicMutex<LockState<V>>,
    scheduler: AutoRelockScheduler,
}

impl<V> Clone for WalletLockCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<V: KeyVault> WalletLockCoordinator<V> {
    pub fn new(vault: V) -> Self {
        let state = LockState {
            vault,
            machine: LockStateMachine::new(),
        };
        Self {
            state: AtomicMutex::named(state, "wallet_lock", Some(log_lock_event)),
            scheduler: AutoRelockScheduler::new(),
        }
    }

    /// Load the vault, leaving `Unavailable` on success.
    pub async fn load_vault(&self) -> Result<ModeKind, WalletLockError> {
        let coordinator = self.clone();
        self.run_to_completion(async move { coordinator.load_vault_task().await })
            .await
    }

    async fn load_vault_task(&self) -> Result<ModeKind, WalletLockError> {
        let mut state = self.state.lock_guard().await;
        state
            .vault
            .load()
            .await
            .map_err(|e| vault_failure("load", e))?;
        state.sync_availability()
    }

    pub async fn get_available_balance(&self) -> Result<u64, WalletLockError> {
        let mut state = self.state.lock_guard().await;
        match state.sync_availability()? {
            ModeKind::Unavailable => Err(WalletLockError::WalletNotAvailable),
            ModeKind::Locked => Err(WalletLockError::WalletLocked),
            ModeKind::Unencrypted | ModeKind::UnlockedTimed => state
                .vault
                .available_balance()
                .map_err(|e| vault_failure("available_balance", e))?
                .ok_or(WalletLockError::BalanceNotAvailable),
        }
    }

    /// Without `new_password`, encrypts an unencrypted wallet under
    /// `password`. With it, replaces the password of an encrypted wallet,
    /// which ends any timed unlock. An empty `new_password` counts as absent.
    pub async fn set_password(
        &self,
        password: &str,
        new_password: Option<&str>,
    ) -> Result<(), WalletLockError> {
        let coordinator = self.clone();
        let password = Zeroizing::new(password.to_owned());
        let new_password = new_password
            .filter(|p| !p.is_empty())
            .map(|p| Zeroizing::new(p.to_owned()));
        self.run_to_completion(async move {
            coordinator
                .set_password_task(&password, new_password.as_deref().map(String::as_str))
                .await
        })
        .await
    }

    async fn set_password_task(
        &self,
        password: &str,
        new_password: Option<&str>,
    ) -> Result<(), WalletLockError> {
        let mut guard = self.state.lock_guard().await;
        let state = &mut *guard;
        match (state.sync_availability()?, new_password) {
            (ModeKind::Unavailable, _) => Err(WalletLockError::WalletNotAvailable),
            (ModeKind::Unencrypted, Some(_)) => Err(WalletLockError::WalletNotEncrypted),
            (ModeKind::Locked | ModeKind::UnlockedTimed, None) => {
                Err(WalletLockError::WalletIsEncrypted)
            }
            (ModeKind::Unencrypted, None) => {
                let key = state.derive(password).await?;
                state
                    .vault
                    .encrypt(&key)
                    .await
                    .map_err(|e| vault_failure("encrypt", e))?;
                state.machine.enter_locked().map_err(transition_failure)?;
                info!("wallet encrypted with a password");
                Ok(())
            }
            (ModeKind::Locked, Some(new_password)) => {
                state.change_locked_password(password, new_password).await
            }
            (ModeKind::UnlockedTimed, Some(new_password)) => {
                state.change_unlocked_password(password, new_password).await
            }
        }
    }

    /// Decrypt the wallet for good.
    pub async fn remove_wallet_password(&self, password: &str) -> Result<(), WalletLockError> {
        let coordinator = self.clone();
        let password = Zeroizing::new(password.to_owned());
        self.run_to_completion(async move { coordinator.remove_password_task(&password).await })
            .await
    }

    async fn remove_password_task(&self, password: &str) -> Result<(), WalletLockError> {
        let mut guard = self.state.lock_guard().await;
        let state = &mut *guard;
        let kind = state.sync_availability()?;
        match kind {
            ModeKind::Unavailable => return Err(WalletLockError::WalletNotAvailable),
            ModeKind::Unencrypted => return Err(WalletLockError::WalletNotEncrypted),
            ModeKind::Locked | ModeKind::UnlockedTimed => {}
        }

        let Some(key) = state.check_password(password).await? else {
            warn!("{}: incorrect password", fn_name!());
            return Err(WalletLockError::IncorrectPassword);
        };
        if kind == ModeKind::Locked {
            state
                .vault
                .decrypt(&key)
                .await
                .map_err(|e| vault_failure("decrypt", e))?;
        }
        if let Some(relock) = state.machine.enter_unencrypted().map_err(transition_failure)? {
            relock.cancel();
        }
        info!("wallet password removed");
        Ok(())
    }

    /// Decrypt the wallet for `timeout_secs`, after which it is encrypted
    /// again under the same password. Unlocking an unlocked wallet restarts
    /// the timeout. The timeout must lie in `1..=MAX_UNLOCK_TIMEOUT`.
    pub async fn unlock_wallet(
        &self,
        password: &str,
        timeout_secs: i64,
    ) -> Result<(), WalletLockError> {
        let timeout = u64::try_from(timeout_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                WalletLockError::InvalidArgument(format!(
                    "unlock timeout must be a positive number of seconds, got {}",
                    timeout_secs
                ))
            })?;
        if timeout > MAX_UNLOCK_TIMEOUT {
            return Err(WalletLockError::InvalidArgument(format!(
                "unlock timeout must be at most {} seconds, got {}",
                MAX_UNLOCK_TIMEOUT.as_secs(),
                timeout_secs
            )));
        }

        let coordinator = self.clone();
        let password = Zeroizing::new(password.to_owned());
        self.run_to_completion(async move { coordinator.unlock_task(&password, timeout).await })
            .await
    }

    async fn unlock_task(&self, password: &str, timeout: Duration) -> Result<(), WalletLockError> {
        let mut guard = self.state.lock_guard().await;
        let state = &mut *guard;
        let kind = state.sync_availability()?;
        match kind {
            ModeKind::Unavailable => return Err(WalletLockError::WalletNotAvailable),
            ModeKind::Unencrypted => return Err(WalletLockError::WalletNotEncrypted),
            ModeKind::Locked | ModeKind::UnlockedTimed => {}
        }

        let Some(key) = state.check_password(password).await? else {
            warn!("{}: incorrect password", fn_name!());
            return Err(WalletLockError::IncorrectPassword);
        };
        if kind == ModeKind::Locked {
            state
                .vault
                .decrypt(&key)
                .await
                .map_err(|e| vault_failure("decrypt", e))?;
        }

        // cancel the running timeout before arming its replacement
        if let Some((previous, _)) = state.machine.unlocked() {
            previous.cancel();
        }
        let relock = self.arm_relock(timeout);
        state
            .machine
            .enter_unlocked(relock, CachedPassword::new(password))
            .map_err(transition_failure)?;

        info!("wallet unlocked for {} seconds", timeout.as_secs());
        Ok(())
    }

    /// End a timed unlock now.
    pub async fn lock_wallet(&self) -> Result<(), WalletLockError> {
        let coordinator = self.clone();
        self.run_to_completion(async move { coordinator.lock_task().await })
            .await
    }

    async fn lock_task(&self) -> Result<(), WalletLockError> {
        let mut state = self.state.lock_guard().await;
        state.sync_availability()?;
        if state.machine.unlocked().is_none() {
            return Err(WalletLockError::AlreadyLocked);
        }
        state.relock().await?;
        info!("wallet locked");
        Ok(())
    }

    /// Relock a timed unlock immediately. For process shutdown.
    pub async fn shutdown(&self) -> Result<(), WalletLockError> {
        let coordinator = self.clone();
        self.run_to_completion(async move { coordinator.shutdown_task().await })
            .await
    }

    async fn shutdown_task(&self) -> Result<(), WalletLockError> {
        let mut state = self.state.lock_guard().await;
        if state.machine.unlocked().is_some() {
            state.relock().await?;
            info!("wallet relocked for shutdown");
        }
        Ok(())
    }

    pub async fn mode_kind(&self) -> ModeKind {
        let mut state = self.state.lock_guard().await;
        if let Err(e) = state.sync_availability() {
            warn!("could not determine wallet availability: {}", e);
        }
        state.machine.kind()
    }

    pub async fn lock_status(&self) -> LockStatus {
        let mut state = self.state.lock_guard().await;
        if let Err(e) = state.sync_availability() {
            warn!("could not determine wallet availability: {}", e);
        }
        let relock_in_secs = state.machine.unlocked().map(|(relock, _)| {
            relock
                .deadline()
                .saturating_duration_since(tokio::time::Instant::now())
                .as_secs()
        });
        LockStatus {
            mode: state.machine.kind(),
            relock_in_secs,
        }
    }

    /// Number of armed auto-relocks. Never more than one.
    pub fn pending_relocks(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Run `op` on its own task and wait for its result.
    async fn run_to_completion<T, Fut>(&self, op: Fut) -> Result<T, WalletLockError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, WalletLockError>> + Send + 'static,
    {
        tokio::spawn(op).await.map_err(|e| {
            error!("wallet lock operation did not complete: {}", e);
            WalletLockError::Internal(e.to_string())
        })?
    }

    fn arm_relock(&self, after: Duration) -> RelockHandle {
        let coordinator = self.clone();
        self.scheduler
            .arm(after, move |id| -> BoxFuture<'static, ()> {
                async move { coordinator.relock_if_current(id).await }.boxed()
            })
    }

    /// Scheduled relock. A no-op unless the wallet is still in the timed
    /// unlock identified by `id`.
    async fn relock_if_current(&self, id: RelockId) {
        let mut state = self.state.lock_guard().await;
        if !state.machine.is_current_epoch(id) {
            debug!("{} is stale, wallet already left that unlock", id);
            return;
        }

        match state.relock().await {
            Ok(()) => info!("wallet relocked after unlock timeout"),
            Err(e) => {
                error!(
                    "automatic relock failed: {}. retrying in {:?}",
                    e, RELOCK_RETRY_DELAY
                );
                let retry = self.arm_relock(RELOCK_RETRY_DELAY);
                if let Err(e) = state.machine.replace_relock(retry) {
                    error!("could not schedule relock retry: {}", e);
                }
            }
        }
    }
}

impl<V: KeyVault> LockState<V> {
    /// Leave `Unavailable` once the vault is loaded.
    fn sync_availability(&mut self) -> Result<ModeKind, WalletLockError> {
        if self.machine.kind() == ModeKind::Unavailable && self.vault.is_available() {
            let encrypted = self
                .vault
                .is_encrypted()
                .map_err(|e| vault_failure("is_encrypted", e))?;
            self.machine
                .mark_available(encrypted)
                .map_err(transition_failure)?;
            info!("wallet available, mode {}", self.machine.kind());
        }
        Ok(self.machine.kind())
    }

    async fn derive(&self, password: &str) -> Result<KeyMaterial, WalletLockError> {
        self.vault
            .derive_key(password)
            .await
            .map_err(|e| vault_failure("derive_key", e))
    }

    /// The key for `password` if it opens the wallet, `None` if it does not.
    ///
    /// Locked wallets are checked by the vault. A timed-unlocked wallet is
    /// decrypted, so there the key is compared with the cached password's.
    async fn check_password(&self, password: &str) -> Result<Option<KeyMaterial>, WalletLockError> {
        let key = self.derive(password).await?;
        let matches = match self.machine.unlocked() {
            Some((_, cached)) => key.matches(&self.derive(cached.expose()).await?),
            None => self
                .vault
                .verify_key(&key)
                .map_err(|e| vault_failure("verify_key", e))?,
        };
        Ok(matches.then_some(key))
    }

    async fn change_locked_password(
        &mut self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), WalletLockError> {
        let Some(old_key) = self.check_password(old_password).await? else {
            warn!("{}: incorrect old password", fn_name!());
            return Err(WalletLockError::IncorrectOldPassword);
        };
        let new_key = self.derive(new_password).await?;

        self.vault
            .decrypt(&old_key)
            .await
            .map_err(|e| vault_failure("decrypt", e))?;

        if let Err(e) = self.vault.encrypt(&new_key).await {
            let failure = vault_failure("encrypt", e);
            if let Err(rollback) = self.vault.encrypt(&old_key).await {
                error!(
                    "could not restore encryption under the old password: {}. wallet is unencrypted",
                    rollback
                );
                self.machine
                    .enter_unencrypted()
                    .map_err(transition_failure)?;
            }
            return Err(failure);
        }

        self.machine.enter_locked().map_err(transition_failure)?;
        info!("wallet password changed");
        Ok(())
    }

    async fn change_unlocked_password(
        &mut self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), WalletLockError> {
        if self.check_password(old_password).await?.is_none() {
            warn!("{}: incorrect old password", fn_name!());
            return Err(WalletLockError::IncorrectOldPassword);
        }
        let new_key = self.derive(new_password).await?;

        self.vault
            .encrypt(&new_key)
            .await
            .map_err(|e| vault_failure("encrypt", e))?;

        if let Some(relock) = self.machine.enter_locked().map_err(transition_failure)? {
            relock.cancel();
        }
        info!("wallet password changed, timed unlock ended");
        Ok(())
    }

    /// Encrypt under the cached password and end the timed unlock. On
    /// failure nothing changes and the pending relock stays armed.
    async fn relock(&mut self) -> Result<(), WalletLockError> {
        let Some((_, password)) = self.machine.unlocked() else {
            return Err(WalletLockError::AlreadyLocked);
        };
        let key = self.derive(password.expose()).await?;
        self.vault
            .encrypt(&key)
            .await
            .map_err(|e| vault_failure("encrypt", e))?;

        if let Some(relock) = self.machine.enter_locked().map_err(transition_failure)? {
            relock.cancel();
        }
        Ok(())
    }
}

fn vault_failure(operation: &str, e: VaultError) -> WalletLockError {
    match e {
        VaultError::EncrypterNotAvailable | VaultError::NotAvailable => {
            warn!("key vault {}: {}", operation, e)
        }
        _ => error!("key vault {} failed: {}", operation, e),
    }
    e.into()
}

fn transition_failure(e: TransitionError) -> WalletLockError {
    error!("{}", e);
    WalletLockError::Internal(e.to_string())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests;
