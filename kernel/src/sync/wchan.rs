//! Wait channels and semaphores
//!
//! Real blocking (parking a thread and descheduling it) belongs to the
//! scheduler, which this core does not implement (spec.md §1 names
//! synchronization primitives as an external collaborator whose contract is
//! assumed, not a subsystem to build). What's modeled here is the contract
//! itself: a named rendezvous point threads can wait on and be woken from,
//! backed by a spinlock exactly as `kern/thread/synch.c`'s semaphore is
//! layered over a wait channel. `wait()` returns instead of parking a
//! thread; callers that need retry-until-ready semantics (e.g. `waitpid`
//! against `KernelError::WouldBlock`) loop on it themselves.

use spin::Mutex;

/// A named rendezvous point. Threads "wait" by observing `woken` hasn't
/// been signalled yet and "wake" everyone by bumping it.
pub struct WaitChannel {
    name: &'static str,
    generation: Mutex<u64>,
}

impl WaitChannel {
    pub const fn new(name: &'static str) -> Self {
        Self { name, generation: Mutex::new(0) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot the current generation, to later check against via
    /// [`Self::has_woken_since`].
    pub fn snapshot(&self) -> u64 {
        *self.generation.lock()
    }

    /// `true` once at least one [`Self::wake_all`] has happened since
    /// `since` was captured.
    pub fn has_woken_since(&self, since: u64) -> bool {
        *self.generation.lock() > since
    }

    /// Wake every waiter on this channel.
    pub fn wake_all(&self) {
        *self.generation.lock() += 1;
    }
}

/// A counting semaphore, layered over a [`WaitChannel`] the same way
/// `struct semaphore` is layered over a `struct wchan` in the original
/// source.
pub struct Semaphore {
    count: Mutex<usize>,
    wchan: WaitChannel,
}

impl Semaphore {
    pub const fn new(name: &'static str, initial_count: usize) -> Self {
        Self { count: Mutex::new(initial_count), wchan: WaitChannel::new(name) }
    }

    /// Decrement, if nonzero. Returns `false` (instead of blocking) if the
    /// count is currently zero; the caller retries.
    pub fn try_down(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Increment and wake any waiters.
    pub fn up(&self) {
        *self.count.lock() += 1;
        self.wchan.wake_all();
    }

    pub fn wchan(&self) -> &WaitChannel {
        &self.wchan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_down_fails_on_empty_semaphore() {
        let sem = Semaphore::new("test", 0);
        assert!(!sem.try_down());
    }

    #[test]
    fn up_then_try_down_succeeds_exactly_once() {
        let sem = Semaphore::new("test", 0);
        sem.up();
        assert!(sem.try_down());
        assert!(!sem.try_down());
    }

    #[test]
    fn wake_all_advances_the_generation_counter() {
        let chan = WaitChannel::new("test");
        let snap = chan.snapshot();
        assert!(!chan.has_woken_since(snap));
        chan.wake_all();
        assert!(chan.has_woken_since(snap));
    }
}
