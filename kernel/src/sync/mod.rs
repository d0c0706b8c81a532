//! Synchronization primitives
//!
//! `once_lock` is generic global-init plumbing used throughout the crate.
//! `wchan` models the wait-channel/semaphore contract spec.md §1 assumes
//! exists without requiring this core to build a scheduler around it.

pub mod once_lock;
pub mod wchan;

pub use once_lock::{GlobalState, LazyLock, OnceLock};
pub use wchan::{Semaphore, WaitChannel};
