//! Concurrency primitives: a reentrant mutex and the FIFO queue of shared
//! values built on top of it.
//!
//! Grounded on `original_source/message.h`'s `QueueOf<T>` (a
//! `std::deque<shared_ptr<T>>` behind a recursive mutex) and on the
//! teacher's use of `critical_section`/`std::sync::Mutex` for guarding
//! shared state across the two cooperative loops.

use core::cell::UnsafeCell;

#[cfg(feature = "std")]
use std::sync::Arc;
#[cfg(feature = "std")]
use std::collections::VecDeque;

#[cfg(not(feature = "std"))]
use heapless::Deque;

/// A mutex that may be locked again, reentrantly, from within a closure
/// already running under its own lock — needed because `ATPR` handling
/// and the automation periodic-broadcast builders both nest calls back
/// into the same guarded state while already holding it.
///
/// `critical_section::with` nests safely by construction (it only ever
/// disables/restores interrupts, or on `std`, re-enters the same
/// reentrant guard), so the guarded value itself is held behind an
/// `UnsafeCell` rather than a `RefCell`: two nested `lock` calls from the
/// same logical caller are the expected, documented case, not a bug.
pub struct RecursiveMutex<T> {
    inner: critical_section::Mutex<UnsafeCell<T>>,
}

// SAFETY: all access to `inner`'s contents goes through `lock`, which runs
// inside a `critical_section`, so concurrent access from another execution
// context never overlaps ours.
unsafe impl<T> Sync for RecursiveMutex<T> {}

impl<T> core::fmt::Debug for RecursiveMutex<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecursiveMutex").finish_non_exhaustive()
    }
}

impl<T> RecursiveMutex<T> {
    pub const fn new(value: T) -> Self {
        RecursiveMutex {
            inner: critical_section::Mutex::new(UnsafeCell::new(value)),
        }
    }

    /// Runs `f` with exclusive-in-spirit access to the guarded value. Safe
    /// to call reentrantly from inside another `lock` call on the same
    /// instance, from the same logical caller, *provided the outer
    /// closure does not touch its `&mut T` again until the nested call
    /// has returned* — re-borrow after, never hold across.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            // SAFETY: see struct docs.
            let value = unsafe { &mut *cell.get() };
            f(value)
        })
    }
}

/// A shared, immutable handle to a queued value. `std` builds share the
/// allocation via `Arc`; `no_std` builds have no allocator, so the value
/// is stored and handed out by clone instead of by reference count.
#[cfg(feature = "std")]
pub type Shared<T> = Arc<T>;
#[cfg(not(feature = "std"))]
pub type Shared<T> = T;

/// FIFO of shared values guarded by a [`RecursiveMutex`]. `pull` never
/// blocks: it returns `T::default()`-equivalent via the caller-supplied
/// empty sentinel when nothing is queued, matching the original's
/// `QueueOf<T>::empty` static.
pub struct QueueOf<T> {
    #[cfg(feature = "std")]
    items: RecursiveMutex<VecDeque<Shared<T>>>,
    #[cfg(not(feature = "std"))]
    items: RecursiveMutex<Deque<Shared<T>, { crate::consts::MAX_QUEUE_LEN }>>,
}

impl<T> core::fmt::Debug for QueueOf<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueOf")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> QueueOf<T> {
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        QueueOf {
            items: RecursiveMutex::new(VecDeque::new()),
        }
    }

    #[cfg(not(feature = "std"))]
    pub fn new() -> Self {
        QueueOf {
            items: RecursiveMutex::new(Deque::new()),
        }
    }

    #[cfg(feature = "std")]
    pub fn push(&self, value: T) {
        self.items.lock(|q| q.push_back(Arc::new(value)));
    }

    #[cfg(not(feature = "std"))]
    pub fn push(&self, value: T) {
        self.items.lock(|q| {
            if q.is_full() {
                let _ = q.pop_front();
            }
            let _ = q.push_back(value);
        });
    }

    /// Pulls the oldest queued value, or `empty` if none is queued.
    #[cfg(feature = "std")]
    pub fn pull(&self, empty: impl FnOnce() -> T) -> Shared<T> {
        self.items
            .lock(|q| q.pop_front())
            .unwrap_or_else(|| Arc::new(empty()))
    }

    #[cfg(not(feature = "std"))]
    pub fn pull(&self, empty: impl FnOnce() -> T) -> Shared<T> {
        self.items.lock(|q| q.pop_front()).unwrap_or_else(empty)
    }

    pub fn available(&self) -> bool {
        self.items.lock(|q| !q.is_empty())
    }

    pub fn len(&self) -> usize {
        self.items.lock(|q| q.len())
    }
}

#[cfg(feature = "std")]
impl<T> Default for QueueOf<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn push_then_pull_preserves_order() {
        let q: QueueOf<u32> = QueueOf::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(*q.pull(|| 0), 1);
        assert_eq!(*q.pull(|| 0), 2);
        assert_eq!(*q.pull(|| 0), 3);
    }

    #[test]
    fn pull_on_empty_queue_returns_sentinel() {
        let q: QueueOf<u32> = QueueOf::new();
        assert_eq!(*q.pull(|| 42), 42);
    }

    #[test]
    fn available_reflects_queue_state() {
        let q: QueueOf<u32> = QueueOf::new();
        assert!(!q.available());
        q.push(1);
        assert!(q.available());
        let _ = q.pull(|| 0);
        assert!(!q.available());
    }

    #[test]
    fn recursive_mutex_allows_nested_lock_from_same_caller() {
        let m = RecursiveMutex::new(AtomicU32::new(0));
        m.lock(|outer| {
            outer.fetch_add(1, Ordering::Relaxed);
            m.lock(|inner| {
                inner.fetch_add(1, Ordering::Relaxed);
            });
        });
        m.lock(|v| assert_eq!(v.load(Ordering::Relaxed), 2));
    }
}
