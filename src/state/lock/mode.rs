use serde::Deserialize;
use serde::Serialize;
use zeroize::Zeroizing;

use super::relock_scheduler::RelockHandle;
use super::relock_scheduler::RelockId;

/// The password cached for the duration of a timed unlock.
///
/// It is only used to re-derive the key when relocking, and is zeroed when
/// the `UnlockedTimed` mode that owns it is left.
pub struct CachedPassword(Zeroizing<String>);

impl CachedPassword {
    pub fn new(password: &str) -> Self {
        Self(Zeroizing::new(password.to_owned()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CachedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CachedPassword(<redacted>)")
    }
}

#[derive(Debug)]
pub enum Mode {
    /// key vault not loaded yet
    Unavailable,
    Unencrypted,
    Locked,
    /// decrypted until `relock` fires
    UnlockedTimed {
        relock: RelockHandle,
        password: CachedPassword,
    },
}

/// [Mode] without its payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
pub enum ModeKind {
    Unavailable,
    Unencrypted,
    Locked,
    UnlockedTimed,
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Unavailable => ModeKind::Unavailable,
            Self::Unencrypted => ModeKind::Unencrypted,
            Self::Locked => ModeKind::Locked,
            Self::UnlockedTimed { .. } => ModeKind::UnlockedTimed,
        }
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("invalid wallet lock transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ModeKind,
    pub to: ModeKind,
}

/// Holds the current [Mode] and allows only the legal transitions.
///
/// Transitions out of `UnlockedTimed` hand back the relock handle that was
/// live, so the caller decides when it is cancelled. The cached password
/// is dropped, and thereby zeroed, inside the transition.
#[derive(Debug)]
pub struct LockStateMachine {
    mode: Mode,
}

impl Default for LockStateMachine {
    fn default() -> Self {
        Self {
            mode: Mode::Unavailable,
        }
    }
}

impl LockStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn kind(&self) -> ModeKind {
        self.mode.kind()
    }

    /// The pending relock and cached password, if timed-unlocked.
    pub fn unlocked(&self) -> Option<(&RelockHandle, &CachedPassword)> {
        match &self.mode {
            Mode::UnlockedTimed { relock, password } => Some((relock, password)),
            _ => None,
        }
    }

    /// true if timed-unlocked under the epoch `id`.
    pub fn is_current_epoch(&self, id: RelockId) -> bool {
        self.unlocked()
            .is_some_and(|(relock, _)| relock.id() == id)
    }

    /// Unavailable -> Locked or Unencrypted.
    pub fn mark_available(&mut self, encrypted: bool) -> Result<(), TransitionError> {
        let to = if encrypted {
            Mode::Locked
        } else {
            Mode::Unencrypted
        };
        self.transition(to, &[ModeKind::Unavailable]).map(|_| ())
    }

    /// Unencrypted | Locked | UnlockedTimed -> Locked
    pub fn enter_locked(&mut self) -> Result<Option<RelockHandle>, TransitionError> {
        self.transition(
            Mode::Locked,
            &[ModeKind::Unencrypted, ModeKind::Locked, ModeKind::UnlockedTimed],
        )
    }

    /// Locked | UnlockedTimed -> Unencrypted
    pub fn enter_unencrypted(&mut self) -> Result<Option<RelockHandle>, TransitionError> {
        self.transition(
            Mode::Unencrypted,
            &[ModeKind::Locked, ModeKind::UnlockedTimed],
        )
    }

    /// Locked | UnlockedTimed -> UnlockedTimed
    ///
    /// When already unlocked, the previous handle is returned and the new one
    /// takes its place.
    pub fn enter_unlocked(
        &mut self,
        relock: RelockHandle,
        password: CachedPassword,
    ) -> Result<Option<RelockHandle>, TransitionError> {
        self.transition(
            Mode::UnlockedTimed { relock, password },
            &[ModeKind::Locked, ModeKind::UnlockedTimed],
        )
    }

    /// Swap the relock of the current timed unlock, keeping the password.
    pub fn replace_relock(&mut self, new: RelockHandle) -> Result<RelockHandle, TransitionError> {
        match &mut self.mode {
            Mode::UnlockedTimed { relock, .. } => Ok(std::mem::replace(relock, new)),
            other => Err(TransitionError {
                from: other.kind(),
                to: ModeKind::UnlockedTimed,
            }),
        }
    }

    fn transition(
        &mut self,
        to: Mode,
        allowed_from: &[ModeKind],
    ) -> Result<Option<RelockHandle>, TransitionError> {
        let from = self.kind();
        if !allowed_from.contains(&from) {
            return Err(TransitionError { from, to: to.kind() });
        }

        match std::mem::replace(&mut self.mode, to) {
            Mode::UnlockedTimed { relock, password } => {
                drop(password);
                Ok(Some(relock))
            }
            _ => Ok(None),
        }
    }
}
