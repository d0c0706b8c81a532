//! Kernel-wide compile-time configuration
//!
//! Constants shared across the coremap, swap engine, address space, fault
//! handler, process table, and fd layer. Values follow the conventions of
//! the MIPS-style target this core is written for (see spec.md §6):
//! `USERSPACE_TOP` is the boundary where kernel segment `kseg0` begins, and
//! user stacks grow down from it.

/// Bytes per page / physical frame.
pub const PAGE_SIZE: usize = 4096;

/// Bitmask of the low bits within a page.
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Top of user-addressable virtual memory; also the initial user stack
/// pointer handed to a freshly loaded program (spec.md §4.3 `define_stack`).
pub const USERSTACK: usize = 0x8000_0000;

/// Base of the kernel segment. Fault addresses at or above this are rejected
/// outright (spec.md §4.4, step 2).
pub const KSEG_BASE: usize = 0x8000_0000;

/// Number of PTEs in a page table / page-table references in a page
/// directory (spec.md §3).
pub const PAGE_TABLE_ENTRIES: usize = 1024;
pub const PAGE_DIR_ENTRIES: usize = 1024;

/// Default guard distance maintained between the heap and the stack before
/// the fault handler treats an access as falling in the hole between them
/// (spec.md §4.4, step 4).
pub const STACK_GUARD_PAGES: usize = 1;

/// Maximum number of pages a single stack may grow to, preventing an
/// unbounded downward fault loop from exhausting physical memory.
pub const MAX_STACK_PAGES: usize = 256;

/// Per-process open file descriptor table size (spec.md §3, §4.6).
pub const OPEN_MAX: usize = 64;

/// Maximum combined size of an `execv` argv block (spec.md §4.5, step 2).
pub const ARG_MAX: usize = 64 * 1024;

/// Number of entries in the software TLB (spec.md §4.4, step 8).
pub const TLB_ENTRIES: usize = 64;

/// Number of frames the coremap tries to keep free; falling below this
/// triggers eviction before an allocation is attempted (spec.md §4.1).
pub const FRAME_RESERVE_THRESHOLD: usize = 10;

/// Number of full coremap sweeps the swap engine's round-robin victim scan
/// will attempt before giving up (spec.md §4.2).
pub const SWAP_SCAN_SWEEPS: usize = 2;

/// Process table size (dense PID space, spec.md §3).
pub const MAX_PROCESSES: usize = 256;

/// The init process's PID. Allocated at bootstrap; reparent target for
/// orphaned zombies (spec.md §3, §4.5).
pub const INIT_PID: u32 = 2;
