//! Swap engine (spec.md §4.2)
//!
//! Backs DIRTY frames onto a backing store so the coremap can reclaim them.
//! Victim selection is a round-robin scan over DIRTY frames only -- CLEAN
//! frames are reclaimed for free (just dropped), FIXED/LOCKED/transit-state
//! frames are never picked (spec.md §4.2, "Slot selection").

use spin::Mutex;

use super::coremap::{Coremap, FrameState, Owner};
use super::{AddressSpaceId, FrameNumber, VirtualAddress, PAGE_SIZE};

/// A slot on the backing store, indexed by slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSlot(pub u32);

/// Abstraction over the swap backing store (disk, or an in-memory stand-in
/// for hosted tests). The real block device driver is an external
/// collaborator (spec.md §1); this trait is the seam.
pub trait BackingStore: Send {
    fn write_slot(&mut self, slot: SwapSlot, data: &[u8; PAGE_SIZE]);
    fn read_slot(&mut self, slot: SwapSlot, data: &mut [u8; PAGE_SIZE]);
    fn slot_count(&self) -> u32;
}

/// In-memory backing store used by hosted tests and by the example
/// bootstrap; a real platform integration supplies a disk-backed store
/// instead.
pub struct MemoryBackingStore {
    slots: alloc::vec::Vec<[u8; PAGE_SIZE]>,
}

impl MemoryBackingStore {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: alloc::vec::Vec::from_iter(core::iter::repeat([0u8; PAGE_SIZE]).take(slots)),
        }
    }
}

impl BackingStore for MemoryBackingStore {
    fn write_slot(&mut self, slot: SwapSlot, data: &[u8; PAGE_SIZE]) {
        self.slots[slot.0 as usize] = *data;
    }

    fn read_slot(&mut self, slot: SwapSlot, data: &mut [u8; PAGE_SIZE]) {
        *data = self.slots[slot.0 as usize];
    }

    fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }
}

struct SwapTable {
    store: Option<alloc::boxed::Box<dyn BackingStore>>,
    /// `true` for slots currently holding live data.
    used: alloc::vec::Vec<bool>,
}

impl SwapTable {
    const fn empty() -> Self {
        Self {
            store: None,
            used: alloc::vec::Vec::new(),
        }
    }

    /// Out-of-slot is a fatal condition (spec.md §4.2, §7): by the time the
    /// swap engine is asked to evict a DIRTY frame the coremap is already
    /// out of free frames, so a full backing store leaves nowhere left to
    /// put the page and the kernel cannot make forward progress.
    fn alloc_slot(&mut self) -> SwapSlot {
        match self.used.iter().position(|u| !*u) {
            Some(idx) => {
                self.used[idx] = true;
                SwapSlot(idx as u32)
            }
            None => panic!("swap: backing store exhausted, no free slot to evict into"),
        }
    }

    fn free_slot(&mut self, slot: SwapSlot) {
        self.used[slot.0 as usize] = false;
    }
}

/// Guards the swap table and backing store (spec.md §5, lock level 4; taken
/// after the coremap lock, never before it).
pub struct SwapEngine {
    table: Mutex<SwapTable>,
}

impl SwapEngine {
    const fn empty() -> Self {
        Self {
            table: Mutex::new(SwapTable::empty()),
        }
    }

    pub fn init(&self, store: alloc::boxed::Box<dyn BackingStore>) {
        let mut table = self.table.lock();
        let n = store.slot_count() as usize;
        table.store = Some(store);
        table.used = alloc::vec![false; n];
    }

    /// Copy `page` from its frame to a fresh swap slot, marking the frame
    /// SWAPPING_OUT for the duration (spec.md §4.2, `swap_out`). Returns the
    /// slot the page now lives in. The caller is responsible for updating
    /// the owning PTE's location tag to ON_DISK once this returns. Panics
    /// if the backing store has no free slot left (spec.md §4.2, "Out-of-
    /// slot is fatal").
    pub fn swap_out(&self, coremap: &Coremap, frame: FrameNumber, page: &[u8; PAGE_SIZE]) -> SwapSlot {
        coremap.set_state(frame, FrameState::SwappingOut);
        let slot = {
            let mut table = self.table.lock();
            let slot = table.alloc_slot();
            let store = table.store.as_mut().expect("swap engine used before init");
            store.write_slot(slot, page);
            slot
        };
        coremap.set_state(frame, FrameState::Clean);
        slot
    }

    /// Read `slot` back into `page`, marking the destination frame
    /// SWAPPING_IN for the duration (spec.md §4.2, `swap_in`). The caller
    /// installs the frame into the PTE and flips the location tag to
    /// IN_MEM; this function only moves bytes.
    pub fn swap_in(&self, coremap: &Coremap, frame: FrameNumber, slot: SwapSlot, page: &mut [u8; PAGE_SIZE]) {
        coremap.set_state(frame, FrameState::SwappingIn);
        {
            let mut table = self.table.lock();
            let store = table.store.as_mut().expect("swap engine used before init");
            store.read_slot(slot, page);
        }
        coremap.set_state(frame, FrameState::Dirty);
    }

    /// Release a swap slot once its page has been paged back in or the
    /// owning address space is destroyed (spec.md §4.2, `clean_swapfile`).
    pub fn free_slot(&self, slot: SwapSlot) {
        self.table.lock().free_slot(slot);
    }
}

/// Global swap engine, initialized alongside the coremap at VM bootstrap.
pub static SWAP: SwapEngine = SwapEngine::empty();

pub fn init(store: alloc::boxed::Box<dyn BackingStore>) {
    SWAP.init(store);
}

/// Evictions performed by [`evict_to_reserve`] on behalf of a frame's owner
/// that hasn't yet been told: the coremap has no way to reach back into the
/// owning [`super::addrspace::AddressSpace`] to flip its PTE to ON_DISK
/// (spec.md §9's lock ordering keeps the process table locked before, never
/// after, the coremap, which rules out calling back into process state from
/// here). Instead the fault handler consults this table first, before
/// trusting whatever its PTE currently says (spec.md §4.4 step 5).
static PENDING_EVICTIONS: Mutex<alloc::vec::Vec<(AddressSpaceId, VirtualAddress, SwapSlot)>> =
    Mutex::new(alloc::vec::Vec::new());

fn record_pending_eviction(owner: Owner, slot: SwapSlot) {
    PENDING_EVICTIONS.lock().push((owner.as_id, owner.va, slot));
}

/// Look up and remove a pending eviction record for `(as_id, va)`, if any.
pub fn take_pending_eviction(as_id: AddressSpaceId, va: VirtualAddress) -> Option<SwapSlot> {
    let mut pending = PENDING_EVICTIONS.lock();
    let idx = pending.iter().position(|(id, v, _)| *id == as_id && *v == va)?;
    Some(pending.remove(idx).2)
}

/// Scan DIRTY frames round-robin, evicting each one found (writing it out
/// and freeing it) until `reserve` frames are free or a full sweep finds no
/// DIRTY victim. Called by the coremap allocator when the free-frame
/// reserve runs low (spec.md §4.1, §4.2). The owning address space's PTE
/// still points at the evicted frame until it next faults on that page;
/// the fault handler is responsible for noticing the frame moved and
/// reinstalling the PTE's location as ON_DISK via the owner backpointer.
pub fn evict_to_reserve(coremap: &Coremap, reserve: usize) {
    if coremap.free_count() >= reserve {
        return;
    }
    let order = coremap.scan_from_cursor();
    for frame in order {
        if coremap.free_count() >= reserve {
            return;
        }
        if coremap.frame_state(frame) != FrameState::Dirty {
            continue;
        }
        let owner = coremap.frame_owner(frame);
        let page = super::physmem::read_frame(frame);
        let slot = SWAP.swap_out(coremap, frame, &page);
        if let Some(owner) = owner {
            record_pending_eviction(owner, slot);
        }
        coremap.free_one(frame);
    }
}
