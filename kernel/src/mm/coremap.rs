//! Physical frame allocator and coremap (spec.md §3, §4.1)
//!
//! The coremap is the single source of truth for who owns each physical
//! frame. A linear first-fit scan finds candidates; when fewer than
//! [`FRAME_RESERVE_THRESHOLD`] frames are free, allocation first asks the
//! swap engine to evict until the reserve is restored (spec.md §4.1,
//! "Allocation policy").

use spin::Mutex;

use super::{AddressSpaceId, FrameNumber, PageFlags, VirtualAddress};
use crate::config::FRAME_RESERVE_THRESHOLD;
use crate::error::{KernelError, KernelResult};

/// Lifecycle state of a physical frame (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Free,
    Fixed,
    Clean,
    Dirty,
    SwappingOut,
    SwappingIn,
    Locked,
    Loading,
}

/// The owning (address space, virtual address) pair for a non-FIXED frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub as_id: AddressSpaceId,
    pub va: VirtualAddress,
}

/// One entry in the coremap (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub state: FrameState,
    pub owner: Option<Owner>,
    /// Length of the contiguous run this frame heads, for multi-frame
    /// kernel allocations. Zero for frames that are not a run head.
    pub run_length: u32,
}

impl Frame {
    const fn fixed() -> Self {
        Self {
            state: FrameState::Fixed,
            owner: None,
            run_length: 0,
        }
    }

    const fn free() -> Self {
        Self {
            state: FrameState::Free,
            owner: None,
            run_length: 0,
        }
    }
}

struct CoremapInner {
    frames: alloc::vec::Vec<Frame>,
    free_count: usize,
    /// Round-robin victim-scan cursor, shared with the swap engine so
    /// repeated scans make forward progress (spec.md §4.2, "Slot selection").
    scan_cursor: usize,
}

/// Guards all frame allocation/eviction decisions (spec.md §5, lock level 3).
pub struct Coremap {
    inner: Mutex<CoremapInner>,
}

impl Coremap {
    const fn empty() -> Self {
        Self {
            inner: Mutex::new(CoremapInner {
                frames: alloc::vec::Vec::new(),
                free_count: 0,
                scan_cursor: 0,
            }),
        }
    }

    fn init(&self, total_frames: usize, fixed_prefix_frames: usize) {
        let mut inner = self.inner.lock();
        inner.frames = alloc::vec::Vec::with_capacity(total_frames);
        for i in 0..total_frames {
            inner.frames.push(if i < fixed_prefix_frames {
                Frame::fixed()
            } else {
                Frame::free()
            });
        }
        inner.free_count = total_frames - fixed_prefix_frames;
        inner.scan_cursor = 0;
    }

    pub fn total_frames(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free_count
    }

    pub fn frame_state(&self, frame: FrameNumber) -> FrameState {
        self.inner.lock().frames[frame.index()].state
    }

    pub fn frame_owner(&self, frame: FrameNumber) -> Option<Owner> {
        self.inner.lock().frames[frame.index()].owner
    }

    /// Allocate a single frame. `owner = None` means a kernel (FIXED-class)
    /// allocation; `owner = Some(..)` marks it as belonging to a user
    /// address space at the given VA, matching spec.md §4.1's
    /// `alloc_frame(owner, perms)`. The `perms` argument itself is not
    /// consulted here -- the PTE install is the caller's job (see
    /// [`super::addrspace::AddressSpace::alloc_and_map`]); this function
    /// only tracks coremap-level ownership and returns the frame LOCKED, as
    /// spec.md §4.1 requires, so the caller can safely zero and fill it
    /// before any other allocation can observe it.
    pub fn alloc_frame(
        &self,
        owner: Option<Owner>,
        _perms: PageFlags,
    ) -> KernelResult<FrameNumber> {
        self.ensure_reserve();
        let mut inner = self.inner.lock();
        let found = inner
            .frames
            .iter()
            .position(|f| f.state == FrameState::Free);
        match found {
            Some(idx) => {
                inner.frames[idx] = Frame {
                    state: FrameState::Locked,
                    owner,
                    run_length: 0,
                };
                inner.free_count -= 1;
                Ok(FrameNumber(idx as u32))
            }
            None => Err(KernelError::NoMemory),
        }
    }

    /// Find `n` contiguous FREE frames and mark them FIXED as a single run
    /// (spec.md §4.1, `alloc_n_frames`). Used only for kernel heap pages.
    pub fn alloc_n_frames(&self, n: usize) -> KernelResult<FrameNumber> {
        if n == 0 {
            return Err(KernelError::InvalidArgument {
                what: "alloc_n_frames(0)",
            });
        }
        self.ensure_reserve();
        let mut inner = self.inner.lock();
        let total = inner.frames.len();
        let mut start = 0;
        'scan: while start + n <= total {
            for off in 0..n {
                if inner.frames[start + off].state != FrameState::Free {
                    start += off + 1;
                    continue 'scan;
                }
            }
            for off in 0..n {
                inner.frames[start + off] = Frame::fixed();
            }
            inner.frames[start].run_length = n as u32;
            inner.free_count -= n;
            return Ok(FrameNumber(start as u32));
        }
        Err(KernelError::NoMemory)
    }

    /// Free the run headed by `first` (spec.md §4.1, `free_pages`). Panics
    /// on a double-free, matching the fatal-condition contract of
    /// spec.md §7 (corrupt coremap state is unrecoverable).
    pub fn free_pages(&self, first: FrameNumber) {
        let mut inner = self.inner.lock();
        let idx = first.index();
        let run = inner.frames[idx].run_length.max(1) as usize;
        for off in 0..run {
            let f = &mut inner.frames[idx + off];
            assert_ne!(
                f.state,
                FrameState::Free,
                "coremap: double free of frame {}",
                idx + off
            );
            *f = Frame::free();
        }
        inner.free_count += run;
    }

    /// Release ownership of a single user frame back to FREE (used by
    /// address-space destruy and by the swap engine after a successful
    /// swap-out eviction).
    pub fn free_one(&self, frame: FrameNumber) {
        let mut inner = self.inner.lock();
        let f = &mut inner.frames[frame.index()];
        assert_ne!(
            f.state,
            FrameState::Free,
            "coremap: double free of frame {}",
            frame.index()
        );
        *f = Frame::free();
        inner.free_count += 1;
    }

    pub fn set_state(&self, frame: FrameNumber, state: FrameState) {
        self.inner.lock().frames[frame.index()].state = state;
    }

    pub fn set_owner(&self, frame: FrameNumber, owner: Option<Owner>) {
        self.inner.lock().frames[frame.index()].owner = owner;
    }

    /// Round-robin scan starting at the shared cursor, yielding every frame
    /// index exactly once per sweep; advances the cursor so a second call
    /// continues where the first left off (spec.md §4.2).
    pub fn scan_from_cursor(&self) -> alloc::vec::Vec<FrameNumber> {
        let mut inner = self.inner.lock();
        let total = inner.frames.len();
        if total == 0 {
            return alloc::vec::Vec::new();
        }
        let start = inner.scan_cursor % total;
        let mut order = alloc::vec::Vec::with_capacity(total);
        for i in 0..total {
            order.push(FrameNumber(((start + i) % total) as u32));
        }
        inner.scan_cursor = (start + 1) % total;
        order
    }

    /// If fewer than [`FRAME_RESERVE_THRESHOLD`] frames are free, ask the
    /// swap engine to evict until the reserve is restored. A single-frame
    /// request that still can't be satisfied after that is a panic --
    /// there is no graceful out-of-memory path at this layer (spec.md
    /// §4.1).
    fn ensure_reserve(&self) {
        if self.free_count() >= FRAME_RESERVE_THRESHOLD {
            return;
        }
        for _ in 0..crate::config::SWAP_SCAN_SWEEPS {
            if self.free_count() >= FRAME_RESERVE_THRESHOLD {
                return;
            }
            crate::mm::swap::evict_to_reserve(self, FRAME_RESERVE_THRESHOLD);
        }
    }
}

/// Global coremap instance, initialized once at VM bootstrap (spec.md §9).
pub static COREMAP: Coremap = Coremap::empty();

pub fn init(total_frames: usize, fixed_prefix_frames: usize) {
    COREMAP.init(total_frames, fixed_prefix_frames);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(total: usize, fixed: usize) -> Coremap {
        let cm = Coremap::empty();
        cm.init(total, fixed);
        cm
    }

    #[test]
    fn fixed_prefix_is_unavailable() {
        let cm = fresh(16, 4);
        assert_eq!(cm.free_count(), 12);
        for i in 0..4 {
            assert_eq!(cm.frame_state(FrameNumber(i)), FrameState::Fixed);
        }
    }

    #[test]
    fn alloc_then_free_roundtrips_free_count() {
        let cm = fresh(32, 0);
        let before = cm.free_count();
        let f = cm.alloc_frame(None, PageFlags::READ | PageFlags::WRITE)
            .expect("allocation from a fully free coremap must succeed");
        assert_eq!(cm.free_count(), before - 1);
        cm.free_one(f);
        assert_eq!(cm.free_count(), before);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let cm = fresh(8, 0);
        let f = cm.alloc_frame(None, PageFlags::READ)
            .expect("allocation from a fully free coremap must succeed");
        cm.free_one(f);
        cm.free_one(f);
    }

    #[test]
    fn contiguous_run_allocates_and_frees_together() {
        let cm = fresh(16, 0);
        let base = cm.alloc_n_frames(4).expect("4 contiguous frames should be available");
        assert_eq!(cm.free_count(), 12);
        cm.free_pages(base);
        assert_eq!(cm.free_count(), 16);
    }

    #[test]
    fn scan_from_cursor_covers_every_frame_once_per_sweep() {
        let cm = fresh(8, 0);
        let order = cm.scan_from_cursor();
        let mut seen: alloc::vec::Vec<u32> = order.iter().map(|f| f.0).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<alloc::vec::Vec<_>>());
    }
}
