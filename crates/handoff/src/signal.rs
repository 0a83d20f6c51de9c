use crate::invariants::debug_assert_waiter_balanced;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};

/// A one-to-many counting notification.
///
/// `fire` increments a monotonic count and wakes every parked waiter;
/// `wait` parks until the count is non-zero. The count is NOT cleared on
/// wake-up; callers that want edge semantics call [`clear`](Self::clear)
/// themselves.
///
/// Both queue engines embed two private signals (one per direction) for
/// their blocking overlays, and clients construct their own to attach to a
/// [`Completion`](crate::Completion) marker.
///
/// # Example
///
/// ```
/// use handoff::Signal;
/// use std::sync::Arc;
///
/// let signal = Arc::new(Signal::new());
/// let s = Arc::clone(&signal);
/// let worker = std::thread::spawn(move || s.fire());
///
/// signal.wait();
/// assert_eq!(signal.count(), 1);
/// worker.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct Signal {
    /// Guards every state transition; the condvar parks under it.
    lock: Mutex<()>,
    cond: Condvar,
    /// Monotonic fire tally. Written under the lock; unlocked observers use
    /// an atomic load.
    count: AtomicU32,
    /// Threads currently parked. Mutated only under the lock, but read by
    /// unlocked callers (advisory wake, close drain). SeqCst on every access:
    /// the waiter count and the queue's admission state form a Dekker-style
    /// handshake (a parking thread writes here then re-reads the queue, the
    /// waking thread writes the queue then reads here) and both pairs must
    /// sit in the single total order or each side can miss the other.
    waiters: AtomicU32,
}

impl Signal {
    /// Creates a signal with a zero count and no waiters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks the calling thread until the count is non-zero.
    ///
    /// Returns immediately if the signal has already fired. Spurious
    /// wake-ups re-check the count and re-park. The count is left intact;
    /// call [`clear`](Self::clear) for edge-triggered behavior.
    pub fn wait(&self) {
        let mut guard = self.lock.lock();
        while self.count.load(Ordering::Relaxed) == 0 {
            self.add_waiter();
            self.cond.wait(&mut guard);
            self.remove_waiter();
        }
    }

    /// Increments the count by one and wakes all parked waiters.
    pub fn fire(&self) {
        let _guard = self.lock.lock();
        self.count.fetch_add(1, Ordering::Relaxed);
        self.cond.notify_all();
    }

    /// Returns the current count.
    pub fn count(&self) -> u32 {
        let _guard = self.lock.lock();
        self.count.load(Ordering::Relaxed)
    }

    /// Resets the count to zero, returning the prior value.
    pub fn clear(&self) -> u32 {
        let _guard = self.lock.lock();
        self.count.swap(0, Ordering::Relaxed)
    }

    // ---------------------------------------------------------------------
    // Crate-internal park/wake machinery for the queue blocking overlays.
    //
    // A blocked queue operation does not use `wait`; it parks on the
    // condvar directly, re-attempting its lock-free operation under the
    // signal lock. The double check under the lock closes the lost-wakeup
    // window against the opposite side's post-success notify.
    // ---------------------------------------------------------------------

    /// Parks until `attempt` produces a value.
    ///
    /// The caller is registered as a waiter, `attempt` runs under the signal
    /// lock, and the thread re-parks for as long as `attempt` returns
    /// `None`. `attempt` must not take any other signal's lock.
    pub(crate) fn park_until<T>(&self, mut attempt: impl FnMut() -> Option<T>) -> T {
        let mut guard = self.lock.lock();
        self.add_waiter();
        let out = loop {
            if let Some(v) = attempt() {
                break v;
            }
            self.cond.wait(&mut guard);
        };
        self.remove_waiter();
        out
    }

    /// Fires the signal only if somebody is parked on it.
    ///
    /// Advisory: a thread about to park re-attempts its operation under the
    /// lock after registering as a waiter, so with the SeqCst handshake on
    /// the waiter count no wakeup is ever lost. Returns `true` if a fire was
    /// delivered.
    pub(crate) fn wake_if_waiting(&self) -> bool {
        if self.waiters.load(Ordering::SeqCst) == 0 {
            return false;
        }
        self.fire();
        true
    }

    /// Wakes all parked waiters without touching the count.
    pub(crate) fn broadcast(&self) {
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    /// Acquires the signal lock. Used by the close protocol, which sets the
    /// closed flag while holding both direction locks.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// Returns `true` if any thread is currently parked.
    pub(crate) fn has_waiters(&self) -> bool {
        self.waiters.load(Ordering::SeqCst) > 0
    }

    #[inline]
    fn add_waiter(&self) {
        self.waiters.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    fn remove_waiter(&self) {
        let prev = self.waiters.fetch_sub(1, Ordering::SeqCst);
        debug_assert_waiter_balanced!(prev);
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        // Dropping with parked threads is a caller bug; make it loud in
        // debug builds instead of undefined.
        debug_assert!(
            self.waiters.load(Ordering::Relaxed) == 0,
            "signal dropped with parked waiters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fire_before_wait_returns_immediately() {
        let signal = Signal::new();
        signal.fire();
        signal.wait(); // must not park
        assert_eq!(signal.count(), 1);
    }

    #[test]
    fn test_count_accumulates() {
        let signal = Signal::new();
        signal.fire();
        signal.fire();
        signal.fire();
        assert_eq!(signal.count(), 3);
    }

    #[test]
    fn test_clear_returns_prior_count() {
        let signal = Signal::new();
        signal.fire();
        signal.fire();
        assert_eq!(signal.clear(), 2);
        assert_eq!(signal.clear(), 0);
        assert_eq!(signal.count(), 0);
    }

    #[test]
    fn test_wait_parks_until_fire() {
        let signal = Arc::new(Signal::new());
        let s = Arc::clone(&signal);

        let waiter = thread::spawn(move || {
            s.wait();
            s.count()
        });

        // Give the waiter a chance to park, then release it.
        while !signal.has_waiters() {
            thread::yield_now();
        }
        signal.fire();

        assert_eq!(waiter.join().unwrap(), 1);
        assert!(!signal.has_waiters());
    }

    #[test]
    fn test_fire_wakes_all_waiters() {
        let signal = Arc::new(Signal::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let s = Arc::clone(&signal);
            handles.push(thread::spawn(move || s.wait()));
        }

        while signal.waiters.load(Ordering::Relaxed) < 8 {
            thread::yield_now();
        }
        signal.fire();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_park_until_observes_change() {
        let signal = Arc::new(Signal::new());
        let ready = Arc::new(AtomicU32::new(0));

        let s = Arc::clone(&signal);
        let r = Arc::clone(&ready);
        let parked = thread::spawn(move || {
            s.park_until(|| {
                let v = r.load(Ordering::Relaxed);
                (v != 0).then_some(v)
            })
        });

        thread::sleep(Duration::from_millis(10));
        ready.store(7, Ordering::Relaxed);
        signal.broadcast();

        assert_eq!(parked.join().unwrap(), 7);
    }

    #[test]
    fn test_wake_if_waiting_without_waiters_is_noop() {
        let signal = Signal::new();
        assert!(!signal.wake_if_waiting());
        assert_eq!(signal.count(), 0);
    }
}
