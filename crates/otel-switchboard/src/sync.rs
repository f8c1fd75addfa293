//! Cooperative mutual exclusion with direct lock hand-off.
//!
//! [`HandoffMutex`] is the synchronisation leaf everything else in this
//! crate builds on. It wraps [`tokio::sync::Mutex`], which queues waiters
//! in FIFO order and hands the lock directly to the next waiter on release,
//! so there is no unlock/re-lock window in which a later arrival can jump
//! the queue. The thin wrapper exists to pin down that contract in one
//! place and to give the rest of the crate a `run_exclusive` convenience
//! for purely synchronous critical sections.
//!
//! # Hazards
//!
//! The lock is **not reentrant**: a task that awaits `lock()` on a mutex it
//! already holds deadlocks itself and every queued waiter behind it. There
//! is no timeout or cancellation; a critical section that never finishes
//! (for example a sink call hung on a dead network peer) starves every
//! subsequent operation on the same instance.

use std::ops::{Deref, DerefMut};
use tokio::sync::{Mutex, MutexGuard};

/// A FIFO async mutex whose release hands the lock to the next waiter.
#[derive(Debug, Default)]
pub struct HandoffMutex<T> {
    inner: Mutex<T>,
}

/// Guard proving exclusive access to the protected value.
///
/// Releasing is the guard's `Drop`: it runs whether the critical section
/// completes, returns early, or panics.
#[derive(Debug)]
pub struct HandoffGuard<'a, T>(MutexGuard<'a, T>);

impl<T> HandoffMutex<T> {
    /// Creates a mutex protecting `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquires the lock, suspending the caller until it is granted.
    ///
    /// Waiters are granted the lock strictly in arrival order.
    pub async fn lock(&self) -> HandoffGuard<'_, T> {
        HandoffGuard(self.inner.lock().await)
    }

    /// Runs a synchronous critical section under the lock.
    ///
    /// For critical sections that themselves suspend, hold the guard from
    /// [`lock`](Self::lock) across the awaits instead.
    pub async fn run_exclusive<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock().await;
        f(&mut guard)
    }
}

impl<T> Deref for HandoffGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for HandoffGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
