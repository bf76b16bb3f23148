/// Contains metadata about a lock
#[derive(Debug, Clone, Copy)]
pub struct LockInfo<'a> {
    name: Option<&'a str>,
}
impl LockInfo<'_> {
    /// get the lock's name
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name
    }
}

#[derive(Debug, Clone)]
pub(super) struct LockCallbackInfo {
    name: Option<String>,
    pub lock_callback_fn: Option<LockCallbackFn>,
}
impl LockCallbackInfo {
    #[inline]
    pub fn new(name: Option<String>, lock_callback_fn: Option<LockCallbackFn>) -> Self {
        Self {
            name,
            lock_callback_fn,
        }
    }

    #[inline]
    pub fn as_lock_info(&self) -> LockInfo<'_> {
        LockInfo {
            name: self.name.as_deref(),
        }
    }
}

/// Represents an event (acquire/release) for a lock
#[derive(Debug, Clone)]
pub enum LockEvent<'a> {
    TryAcquire {
        info: LockInfo<'a>,
        location: Option<&'static core::panic::Location<'static>>,
    },
    Acquire {
        info: LockInfo<'a>,
        try_acquire_at: Option<std::time::Instant>,
        acquire_at: Option<std::time::Instant>,
        location: Option<&'static core::panic::Location<'static>>,
    },
    Release {
        info: LockInfo<'a>,
        try_acquire_at: Option<std::time::Instant>,
        acquire_at: Option<std::time::Instant>,
        location: Option<&'static core::panic::Location<'static>>,
    },
}

impl LockEvent<'_> {
    pub fn event_type_name(&self) -> &str {
        match self {
            Self::TryAcquire { .. } => "TryAcquire",
            Self::Acquire { .. } => "Acquire",
            Self::Release { .. } => "Release",
        }
    }
    pub fn info(&self) -> &LockInfo<'_> {
        match self {
            Self::TryAcquire { info, .. } | Self::Acquire { info, .. } | Self::Release { info, .. } => {
                info
            }
        }
    }
    pub fn location(&self) -> Option<&'static core::panic::Location<'static>> {
        match self {
            Self::TryAcquire { location, .. }
            | Self::Acquire { location, .. }
            | Self::Release { location, .. } => *location,
        }
    }
    pub fn acquire_at(&self) -> Option<std::time::Instant> {
        match self {
            Self::TryAcquire { .. } => None,
            Self::Acquire { acquire_at, .. } | Self::Release { acquire_at, .. } => *acquire_at,
        }
    }
}

/// A callback fn for receiving [LockEvent] event
/// each time a lock is acquired or released.
pub type LockCallbackFn = fn(lock_event: LockEvent);

/// Logs every lock event at trace level.
///
/// very verbose. only enabled with feature `log-lock_events`.
pub fn log_lock_event(lock_event: LockEvent) {
    #[cfg(feature = "log-lock_events")]
    {
        let location_str = match lock_event.location() {
            Some(l) => format!("\n\t|-- acquirer: {}", l),
            None => String::default(),
        };
        let held_str = match lock_event.acquire_at() {
            Some(t) if matches!(lock_event, LockEvent::Release { .. }) => {
                format!("\n\t|-- held: {} secs", t.elapsed().as_secs_f32())
            }
            _ => String::default(),
        };

        tracing::trace!(
            "{} tokio lock `{}` by\n\t|-- thread {}, (`{:?}`){}{}",
            lock_event.event_type_name(),
            lock_event.info().name().unwrap_or("?"),
            std::thread::current().name().unwrap_or("?"),
            std::thread::current().id(),
            location_str,
            held_str,
        );
    }

    #[cfg(not(feature = "log-lock_events"))]
    let _ = lock_event;
}

#[cfg(feature = "track-lock-time")]
pub fn now() -> Option<std::time::Instant> {
    Some(std::time::Instant::now())
}

#[cfg(not(feature = "track-lock-time"))]
pub fn now() -> Option<std::time::Instant> {
    None
}
