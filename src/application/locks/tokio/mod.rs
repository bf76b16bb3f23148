//! Provides simplified tokio lock types for sharing data between tasks

mod atomic_mutex;
mod shared;

pub use atomic_mutex::AtomicMutex;
pub use atomic_mutex::AtomicMutexGuard;
use shared::now;
pub use shared::log_lock_event;
pub use shared::LockCallbackFn;
use shared::LockCallbackInfo;
pub use shared::LockEvent;
pub use shared::LockInfo;
