//! Kernel library
//!
//! A teaching kernel core for a 32-bit MIPS-style machine, modeled on
//! OS/161: virtual memory (coremap, two-level page tables, TLB refill,
//! swap), process lifecycle (fork/exec/wait/exit), and a per-process file
//! descriptor layer atop an opaque VFS seam. The machine-dependent trap
//! entry stub, `mips_usermode`, the VFS implementation itself, and
//! synchronization primitives are external collaborators this crate only
//! exposes trait/function seams for (spec.md §1).

#![no_std]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

extern crate alloc;

// Bare-metal target: a real heap backed by a linked-list allocator over a
// region the platform integration supplies via `init_heap`.
#[cfg(target_os = "none")]
use linked_list_allocator::LockedHeap;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

#[cfg(target_os = "none")]
/// Hand the allocator a backing region. Must be called once, before any
/// other subsystem allocates (spec.md §9, "bootstrap order").
///
/// # Safety
/// `heap_start..heap_start + heap_size` must be valid, writable, and not
/// otherwise in use for the remainder of the kernel's lifetime.
pub unsafe fn init_heap(heap_start: usize, heap_size: usize) {
    unsafe {
        ALLOCATOR.lock().init(heap_start as *mut u8, heap_size);
    }
}

// Hosted target (`cargo test`): delegate to the system allocator so test
// code can use Vec/String/Arc without a platform-supplied heap region.
#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fd;
pub mod loader;
pub mod log_service;
pub mod mm;
pub mod process;
pub mod raii;
pub mod serial;
pub mod sync;
pub mod syscall;
pub mod timer;

/// Heap allocation error handler.
///
/// Panic is intentional: heap allocation failure in a no_std kernel is
/// unrecoverable. The alloc_error_handler ABI requires `-> !`.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}
