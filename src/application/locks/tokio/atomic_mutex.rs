use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

use super::now;
use super::LockCallbackFn;
use super::LockCallbackInfo;
use super::LockEvent;

/// An `Arc<Mutex<T>>` wrapper to make data thread-safe and easy to work with.
///
/// Clones share the same inner mutex. A name and a callback fn may be
/// provided at construction so that lock acquisitions can be traced.
///
/// # Examples
/// ```
/// # use wallet_lock::application::locks::tokio::AtomicMutex;
/// # tokio_test::block_on(async {
/// let counter = AtomicMutex::named(0u32, "counter", None);
/// *counter.lock_guard().await += 1;
/// assert_eq!(1, *counter.lock_guard().await);
/// # })
/// ```
#[derive(Debug)]
pub struct AtomicMutex<T> {
    inner: Arc<Mutex<T>>,
    lock_callback_info: LockCallbackInfo,
}

impl<T> Clone for AtomicMutex<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            lock_callback_info: self.lock_callback_info.clone(),
        }
    }
}

impl<T> AtomicMutex<T> {
    /// Create from a name and an optional callback function, which
    /// is called when a lock event occurs.
    pub fn named(t: T, name: &str, lock_callback_fn: Option<LockCallbackFn>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(t)),
            lock_callback_info: LockCallbackInfo::new(Some(name.to_owned()), lock_callback_fn),
        }
    }

    /// Acquire the lock and return an `AtomicMutexGuard`
    #[cfg_attr(feature = "track-lock-location", track_caller)]
    pub async fn lock_guard(&self) -> AtomicMutexGuard<'_, T> {
        self.try_acquire_cb();

        let try_acquire_at = now();
        let guard = self.inner.lock().await;
        AtomicMutexGuard::new(guard, &self.lock_callback_info, try_acquire_at)
    }

    #[cfg_attr(feature = "track-lock-location", track_caller)]
    fn try_acquire_cb(&self) {
        if let Some(cb) = self.lock_callback_info.lock_callback_fn {
            cb(LockEvent::TryAcquire {
                info: self.lock_callback_info.as_lock_info(),

                #[cfg(feature = "track-lock-location")]
                location: Some(core::panic::Location::caller()),
                #[cfg(not(feature = "track-lock-location"))]
                location: None,
            });
        }
    }
}

/// A wrapper for [MutexGuard] that can optionally call a callback to notify
/// when the lock event occurs.
#[derive(Debug)]
pub struct AtomicMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    lock_callback_info: &'a LockCallbackInfo,
    try_acquire_at: Option<std::time::Instant>,
    acquire_at: Option<std::time::Instant>,
    location: Option<&'static core::panic::Location<'static>>,
}

impl<'a, T> AtomicMutexGuard<'a, T> {
    fn new(
        guard: MutexGuard<'a, T>,
        lock_callback_info: &'a LockCallbackInfo,
        try_acquire_at: Option<std::time::Instant>,
    ) -> Self {
        let my_guard = Self {
            guard,
            lock_callback_info,
            try_acquire_at,
            acquire_at: now(),

            #[cfg(feature = "track-lock-location")]
            location: Some(core::panic::Location::caller()),
            #[cfg(not(feature = "track-lock-location"))]
            location: None,
        };

        if let Some(cb) = lock_callback_info.lock_callback_fn {
            cb(LockEvent::Acquire {
                info: lock_callback_info.as_lock_info(),
                try_acquire_at: my_guard.try_acquire_at,
                acquire_at: my_guard.acquire_at,
                location: my_guard.location,
            });
        }

        my_guard
    }
}

impl<T> Drop for AtomicMutexGuard<'_, T> {
    fn drop(&mut self) {
        let lock_callback_info = self.lock_callback_info;
        if let Some(cb) = lock_callback_info.lock_callback_fn {
            cb(LockEvent::Release {
                info: lock_callback_info.as_lock_info(),
                try_acquire_at: self.try_acquire_at,
                acquire_at: self.acquire_at,
                location: self.location,
            });
        }
    }
}

impl<T> Deref for AtomicMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for AtomicMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
