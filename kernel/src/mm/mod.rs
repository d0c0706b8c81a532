//! Virtual memory: frame allocator/coremap, swap engine, address spaces,
//! and the TLB-fault handler (spec.md §4.1-§4.4).
//!
//! These four pieces are specified together because they share the same
//! invariants around frame ownership and the SWAPPING_* transit states
//! (spec.md §9, "Ownership graphs"); splitting them across independent
//! modules would scatter a single invariant across files that each only see
//! half of it.

pub mod addrspace;
pub mod coremap;
pub mod fault;
pub mod physmem;
pub mod swap;
pub mod tlb;

use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

pub use crate::config::PAGE_SIZE;

/// A physical address, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalAddress(pub u64);

impl PhysicalAddress {
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A virtual address, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(pub usize);

impl VirtualAddress {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Round down to the start of the containing page.
    pub const fn page_align_down(self) -> Self {
        Self(self.0 & !crate::config::PAGE_MASK)
    }

    /// `true` if this address is already page-aligned.
    pub const fn is_page_aligned(self) -> bool {
        self.0 & crate::config::PAGE_MASK == 0
    }

    /// The page-directory index (top 10 bits of the low 2 GiB).
    pub const fn dir_index(self) -> usize {
        (self.0 >> 22) & 0x3ff
    }

    /// The page-table index (middle 10 bits).
    pub const fn table_index(self) -> usize {
        (self.0 >> 12) & 0x3ff
    }
}

/// Physical frame number (byte address / [`PAGE_SIZE`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(pub u32);

impl FrameNumber {
    pub const fn as_addr(self) -> PhysicalAddress {
        PhysicalAddress((self.0 as u64) * PAGE_SIZE as u64)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Page permission bits carried by a PTE (spec.md §3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        const READ    = 0b001;
        const WRITE   = 0b010;
        const EXECUTE = 0b100;
    }
}

/// Identifies an [`addrspace::AddressSpace`] for coremap/swap bookkeeping
/// without requiring a raw pointer or shared ownership. Assigned once at
/// `AddressSpace::create()` and stable for the address space's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressSpaceId(u64);

impl AddressSpaceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// One-time virtual-memory subsystem bootstrap: brings up the coremap and
/// swap table. Must run before any user process is created (spec.md §9).
pub fn init(total_frames: usize, fixed_prefix_frames: usize) {
    physmem::init(total_frames);
    coremap::init(total_frames, fixed_prefix_frames);
    log::info!("mm: coremap initialized with {total_frames} frames ({fixed_prefix_frames} fixed)");
}
