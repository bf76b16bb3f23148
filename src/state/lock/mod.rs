//! Wallet lock state: the mode machine, the auto-relock scheduler and the
//! coordinator that ties both to a key vault.

pub mod coordinator;
pub mod mode;
pub mod relock_scheduler;
pub mod status;

pub use coordinator::LockStatus;
pub use coordinator::WalletLockCoordinator;
pub use mode::ModeKind;
pub use status::StatusCode;
pub use status::WalletLockError;
