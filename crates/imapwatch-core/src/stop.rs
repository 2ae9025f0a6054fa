use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Process-wide, write-once shutdown flag shared by the supervisor and every
/// watcher. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal. Returns `true` only for the call that flipped it.
    pub fn set(&self) -> bool {
        let first = !self.inner.stopped.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_set(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is set.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Blocks the current thread for up to `duration`, waking every `slice`
    /// to check the signal. Returns `true` if the signal was observed.
    pub fn sleep(&self, duration: Duration, slice: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let slice = slice.max(Duration::from_millis(1));
        loop {
            if self.is_set() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }
}
