//! Cancellation tokens for commissioning work.
//!
//! The commissioner hands a token to every item it runs. When an item
//! exceeds its timeout the token is cancelled; cooperative items observe
//! the cancellation and return early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{ControlError, ControlResult};

/// A token that can be used to signal cancellation across threads.
///
/// # Examples
///
/// ```
/// use ferrous_metro::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// parent.cancel();
/// assert!(child.is_cancelled());
/// assert!(child.throw_if_cancelled().is_err());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

struct CancellationTokenInner {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
    children: Mutex<Vec<Weak<CancellationTokenInner>>>,
    signal: Mutex<()>,
    wakeup: Condvar,
    created_at: Instant,
}

impl CancellationTokenInner {
    fn new(parent: Option<CancellationToken>) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            parent,
            children: Mutex::new(Vec::new()),
            signal: Mutex::new(()),
            wakeup: Condvar::new(),
            created_at: Instant::now(),
        })
    }

    /// Wakes sleepers on this token and every live descendant.
    fn wake(&self) {
        drop(self.signal.lock());
        self.wakeup.notify_all();
        let children: Vec<_> = self.children.lock().iter().filter_map(Weak::upgrade).collect();
        for child in children {
            child.wake();
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self {
            inner: CancellationTokenInner::new(None),
        }
    }

    /// Creates a child token that is cancelled when either it or its parent is.
    pub fn child_token(&self) -> Self {
        let inner = CancellationTokenInner::new(Some(self.clone()));
        let mut children = self.inner.children.lock();
        children.retain(|child| child.strong_count() > 0);
        children.push(Arc::downgrade(&inner));
        Self { inner }
    }

    /// Cancels the token, signaling that associated operations should stop.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.wake();
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.parent {
            Some(ref parent) => parent.is_cancelled(),
            None => false,
        }
    }

    /// Fails with [`ControlError::Cancelled`] once the token is cancelled.
    pub fn throw_if_cancelled(&self) -> ControlResult<()> {
        if self.is_cancelled() {
            Err(ControlError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration`, waking early on cancellation.
    ///
    /// Returns false when the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut signal = self.inner.signal.lock();
        loop {
            if self.is_cancelled() {
                return false;
            }
            if self.inner.wakeup.wait_until(&mut signal, deadline).timed_out() {
                return !self.is_cancelled();
            }
        }
    }

    /// Returns the elapsed time since this token was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_child_token_independent_cancellation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(!token.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();

        assert!(CancellationToken::new().sleep(Duration::from_millis(1)));
    }

    #[test]
    fn test_child_sleep_wakes_on_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let handle = thread::spawn(move || child.sleep(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(10));
        parent.cancel();
        assert!(!handle.join().unwrap());
    }
}
