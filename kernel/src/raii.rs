//! RAII (Resource Acquisition Is Initialization) patterns for kernel resources
//!
//! This module provides RAII wrappers for various kernel resources to ensure
//! proper cleanup when resources go out of scope.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::MutexGuard;

use crate::mm::coremap::COREMAP;
use crate::mm::FrameNumber;

/// Count of [`TrackedMutexGuard`]s currently held anywhere in the kernel.
/// `syscall::dispatch` asserts this is zero on entry (spec.md §4.7): a
/// syscall must never trap in with a lock already held, since this core has
/// no way to release it again before the handler runs.
static HELD_LOCKS: AtomicUsize = AtomicUsize::new(0);

/// Number of tracked locks currently held by this core. A placeholder for
/// real per-thread lock-depth/IRQL tracking -- there is one hart and no
/// preemption here, so a single global counter is sufficient to catch a
/// syscall handler that naively reaches `dispatch` while still holding one.
pub fn held_lock_count() -> usize {
    HELD_LOCKS.load(Ordering::SeqCst)
}

/// RAII wrapper for a single physical frame allocated outside any address
/// space (e.g. a kernel scratch page). Returns the frame to the coremap
/// when dropped.
pub struct FrameGuard {
    frame: FrameNumber,
}

impl FrameGuard {
    pub fn new(frame: FrameNumber) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> FrameNumber {
        self.frame
    }

    /// Release ownership of the frame without deallocating it.
    pub fn leak(self) -> FrameNumber {
        let frame = self.frame;
        core::mem::forget(self);
        frame
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        COREMAP.free_one(self.frame);
    }
}

/// RAII lock guard that logs acquisition and release through the
/// structured log service rather than directly to the console.
pub struct TrackedMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    name: &'static str,
}

impl<'a, T> TrackedMutexGuard<'a, T> {
    pub fn new(guard: MutexGuard<'a, T>, name: &'static str) -> Self {
        HELD_LOCKS.fetch_add(1, Ordering::SeqCst);
        crate::log_service::klog(crate::log_service::LogLevel::Trace, "lock", name);
        Self { guard, name }
    }
}

impl<T> Drop for TrackedMutexGuard<'_, T> {
    fn drop(&mut self) {
        HELD_LOCKS.fetch_sub(1, Ordering::SeqCst);
        crate::log_service::klog(crate::log_service::LogLevel::Trace, "lock", self.name);
    }
}

impl<T> Deref for TrackedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T> DerefMut for TrackedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

/// Macro to create RAII scope guards.
#[macro_export]
macro_rules! defer {
    ($e:expr) => {
        let _guard = $crate::raii::ScopeGuard::new(|| $e);
    };
}

/// Generic scope guard that runs cleanup code on drop.
pub struct ScopeGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// Cancel the cleanup.
    pub fn cancel(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_guard() {
        let mut cleaned = false;
        {
            let _guard = ScopeGuard::new(|| {
                cleaned = true;
            });
        }
        assert!(cleaned);
    }

    #[test]
    fn test_scope_guard_cancel() {
        let mut cleaned = false;
        {
            let guard = ScopeGuard::new(|| {
                cleaned = true;
            });
            guard.cancel();
        }
        assert!(!cleaned);
    }

    #[test]
    fn tracked_mutex_guard_counts_itself_held_and_releases_on_drop() {
        let lock: spin::Mutex<u32> = spin::Mutex::new(0);
        let before = held_lock_count();
        {
            let _guard = TrackedMutexGuard::new(lock.lock(), "test-lock");
            assert_eq!(held_lock_count(), before + 1);
        }
        assert_eq!(held_lock_count(), before);
    }

    #[test]
    fn frame_guard_returns_its_frame_on_drop() {
        crate::mm::init(16, 0);
        let before = COREMAP.free_count();
        let frame = COREMAP.alloc_frame(None, crate::mm::PageFlags::READ).expect("alloc should succeed");
        {
            let _guard = FrameGuard::new(frame);
            assert_eq!(COREMAP.free_count(), before - 1);
        }
        assert_eq!(COREMAP.free_count(), before);
    }
}
