use parking_lot::{Condvar, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Signalled flag, kept in bit zero of the state word.
const SIGNALLED: usize = 1;

/// Each registered waiter adds this to the state word.
const ONE_WAITER: usize = 2;

/// A condition variable bound to the scheduler mutex.
///
/// The state word packs the signalled flag with a waiter count so that the
/// fused unlock-and-signal operations can tell, while still holding the
/// lock, whether releasing a waiter is worthwhile. Every mutation happens
/// with the scheduler mutex held; the word is atomic only so the methods
/// can take `&self`.
pub(crate) struct WakeupEvent {
    cond: Condvar,
    state: AtomicUsize,
}

impl WakeupEvent {
    pub(crate) fn new() -> Self {
        Self {
            cond: Condvar::new(),
            state: AtomicUsize::new(0),
        }
    }

    pub(crate) fn clear<T>(&self, _lock: &mut MutexGuard<'_, T>) {
        self.state.fetch_and(!SIGNALLED, Ordering::Relaxed);
    }

    /// Release one waiter, keeping the lock.
    #[allow(dead_code)]
    pub(crate) fn signal_one<T>(&self, _lock: &mut MutexGuard<'_, T>) {
        let state = self.state.fetch_or(SIGNALLED, Ordering::Relaxed);
        if state >= ONE_WAITER {
            self.cond.notify_one();
        }
    }

    pub(crate) fn signal_all<T>(&self, _lock: &mut MutexGuard<'_, T>) {
        self.state.fetch_or(SIGNALLED, Ordering::Relaxed);
        self.cond.notify_all();
    }

    /// Drop the lock, then hand it off to one waiter if any is registered.
    pub(crate) fn unlock_and_signal_one<T>(&self, lock: MutexGuard<'_, T>) {
        let state = self.state.fetch_or(SIGNALLED, Ordering::Relaxed);
        let have_waiters = state >= ONE_WAITER;
        drop(lock);
        if have_waiters {
            self.cond.notify_one();
        }
    }

    /// Like [`unlock_and_signal_one`], but only gives the lock up when a
    /// waiter actually exists. Returns the still-held guard otherwise, so
    /// the caller can fall back to interrupting the reactor.
    ///
    /// [`unlock_and_signal_one`]: WakeupEvent::unlock_and_signal_one
    pub(crate) fn maybe_unlock_and_signal_one<'a, T>(
        &self,
        lock: MutexGuard<'a, T>,
    ) -> Option<MutexGuard<'a, T>> {
        let state = self.state.fetch_or(SIGNALLED, Ordering::Relaxed);
        if state >= ONE_WAITER {
            drop(lock);
            self.cond.notify_one();
            None
        } else {
            Some(lock)
        }
    }

    /// Block until signalled. Atomically releases the lock while parked and
    /// reacquires it before returning.
    pub(crate) fn wait<T>(&self, lock: &mut MutexGuard<'_, T>) {
        while self.state.load(Ordering::Relaxed) & SIGNALLED == 0 {
            self.state.fetch_add(ONE_WAITER, Ordering::Relaxed);
            self.cond.wait(lock);
            self.state.fetch_sub(ONE_WAITER, Ordering::Relaxed);
        }
    }

    /// Bounded wait. Returns true if the event was signalled before the
    /// deadline.
    pub(crate) fn wait_for<T>(&self, lock: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state.load(Ordering::Relaxed) & SIGNALLED == 0 {
            self.state.fetch_add(ONE_WAITER, Ordering::Relaxed);
            let timed_out = self.cond.wait_until(lock, deadline).timed_out();
            self.state.fetch_sub(ONE_WAITER, Ordering::Relaxed);
            if timed_out {
                break;
            }
        }
        self.state.load(Ordering::Relaxed) & SIGNALLED != 0
    }
}
