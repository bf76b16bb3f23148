//! Deferred, cancellable relock actions.
//!
//! Each [AutoRelockScheduler::arm] spawns one tokio task that sleeps and then
//! runs the action, unless the returned [RelockHandle] is cancelled first.
//! A handle settles exactly once, either by firing or by being cancelled,
//! and whichever happens first wins. So an action runs at most once, and
//! never after `cancel()` returned.

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Deadline used when `now + after` is not representable. Same horizon as
/// tokio's own "far future".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Identity of one armed relock, i.e. one timed-unlock epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelockId(u64);

impl std::fmt::Display for RelockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "relock#{}", self.0)
    }
}

#[derive(Debug)]
struct Settle {
    settled: AtomicBool,
    pending: Arc<AtomicUsize>,
}

impl Settle {
    /// true for the one caller that settles the handle.
    fn settle(&self) -> bool {
        let won = !self.settled.swap(true, Ordering::AcqRel);
        if won {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        won
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

/// Handle to a single pending relock. Dropping it cancels the relock.
#[derive(Debug)]
pub struct RelockHandle {
    id: RelockId,
    deadline: Instant,
    token: CancellationToken,
    settle: Arc<Settle>,
}

impl RelockHandle {
    pub fn id(&self) -> RelockId {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Prevent the action from running. No effect if it already started.
    pub fn cancel(&self) {
        if self.settle.settle() {
            trace!("{} cancelled", self.id);
        }
        self.token.cancel();
    }

    /// true while the action can still fire.
    pub fn is_pending(&self) -> bool {
        !self.settle.is_settled()
    }
}

impl Drop for RelockHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoRelockScheduler {
    next_id: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
}

impl AutoRelockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `after` unless the returned handle is cancelled
    /// or dropped first.
    pub fn arm<F, Fut>(&self, after: Duration, action: F) -> RelockHandle
    where
        F: FnOnce(RelockId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = RelockId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = Instant::now();
        let deadline = now.checked_add(after).unwrap_or(now + FAR_FUTURE);
        let token = CancellationToken::new();
        self.pending.fetch_add(1, Ordering::AcqRel);
        let settle = Arc::new(Settle {
            settled: AtomicBool::new(false),
            pending: self.pending.clone(),
        });

        let task_token = token.clone();
        let task_settle = settle.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    if task_settle.settle() {
                        trace!("{} firing", id);
                        action(id).await;
                    }
                }
            }
        });

        trace!("{} armed for {:?}", id, after);
        RelockHandle {
            id,
            deadline,
            token,
            settle,
        }
    }

    /// Number of armed relocks that have neither fired nor been cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
