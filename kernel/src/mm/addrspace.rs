//! Per-process address spaces: page tables, PTEs, and region bookkeeping
//! (spec.md §3, §4.3)
//!
//! A two-level structure maps the low 2 GiB of user virtual memory: a page
//! directory of [`PAGE_DIR_ENTRIES`] entries, each pointing at a page table
//! of [`PAGE_TABLE_ENTRIES`] PTEs, lazily allocated on first use so that a
//! freshly created address space costs one directory's worth of memory, not
//! four megabytes of page tables.

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::coremap::{Owner, COREMAP};
use super::swap::{SwapSlot, SWAP};
use super::{AddressSpaceId, FrameNumber, PageFlags, VirtualAddress, PAGE_SIZE};
use crate::config::{PAGE_DIR_ENTRIES, PAGE_TABLE_ENTRIES, USERSTACK};
use crate::error::{KernelError, KernelResult};

/// Where a page's data currently lives (spec.md §3, PTE location tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    InMem(FrameNumber),
    OnDisk(SwapSlot),
    /// A swap_out or swap_in for this page is in flight; faults on it must
    /// block until the transit completes rather than racing the swap
    /// engine (spec.md §4.2, §4.4 step 6).
    InTransit,
}

/// A single page-table entry.
#[derive(Debug, Clone, Copy)]
pub struct Pte {
    pub location: Location,
    pub perms: PageFlags,
}

struct PageTable {
    entries: [Option<Pte>; PAGE_TABLE_ENTRIES],
}

impl PageTable {
    fn new() -> Box<Self> {
        Box::new(Self {
            entries: [None; PAGE_TABLE_ENTRIES],
        })
    }
}

/// A named region of an address space's layout, recorded at `define_region`
/// time so `prepare_load`/`complete_load` can restore original permissions
/// (spec.md §4.3, `prepare_load`/`complete_load`).
#[derive(Debug, Clone, Copy)]
struct Region {
    start: VirtualAddress,
    npages: usize,
    perms: PageFlags,
}

/// A process's virtual address space (spec.md §3).
pub struct AddressSpace {
    id: AddressSpaceId,
    directory: Vec<Option<Box<PageTable>>>,
    regions: Vec<Region>,
    /// First byte past the highest region defined by the loader; the heap
    /// begins here (spec.md §4.3, `define_region`/`complete_load`).
    pub static_start: VirtualAddress,
    pub heap_start: VirtualAddress,
    pub heap_end: VirtualAddress,
    /// Number of pages currently backing the stack, grown on demand by the
    /// fault handler (spec.md §4.4 step 4).
    stack_pages: usize,
    load_complete: bool,
    /// Cleared by `prepare_load` and set by `complete_load` (spec.md §3,
    /// §4.3). While clear, the fault handler grants writes to every region
    /// regardless of its declared permissions so the loader can fill in a
    /// read-only text segment; once set, a `READONLY_WRITE` fault is a
    /// permission violation rather than a mapping request (spec.md §4.4
    /// step 1).
    use_permissions: bool,
}

impl AddressSpace {
    /// Create a fresh, empty address space (spec.md §4.3, `as_create`).
    pub fn create() -> Self {
        let mut directory = Vec::with_capacity(PAGE_DIR_ENTRIES);
        for _ in 0..PAGE_DIR_ENTRIES {
            directory.push(None);
        }
        Self {
            id: AddressSpaceId::next(),
            directory,
            regions: Vec::new(),
            static_start: VirtualAddress::new(0),
            heap_start: VirtualAddress::new(0),
            heap_end: VirtualAddress::new(0),
            stack_pages: 0,
            load_complete: false,
            use_permissions: true,
        }
    }

    pub fn id(&self) -> AddressSpaceId {
        self.id
    }

    pub fn use_permissions(&self) -> bool {
        self.use_permissions
    }

    /// Register a loader-defined region spanning `npages` pages starting at
    /// `start`, with the permissions it will have once loading completes
    /// (spec.md §4.3, `define_region`). Allocates and maps every page in
    /// the region eagerly rather than waiting for the loader's first write
    /// to each one, per spec.md §4.3's "allocate a frame eagerly (simpler
    /// than lazy for region definition)".
    pub fn define_region(&mut self, start: VirtualAddress, npages: usize, perms: PageFlags) -> KernelResult<()> {
        if !start.is_page_aligned() {
            return Err(KernelError::InvalidArgument {
                what: "define_region: start not page-aligned",
            });
        }
        let end = VirtualAddress::new(start.as_usize() + npages * PAGE_SIZE);
        if end.as_usize() > self.static_start.as_usize() {
            self.static_start = end;
        }
        for i in 0..npages {
            let va = VirtualAddress::new(start.as_usize() + i * PAGE_SIZE);
            self.alloc_and_map(va, perms)?;
        }
        self.regions.push(Region { start, npages, perms });
        Ok(())
    }

    /// Force every defined region writable for the duration of segment
    /// loading, regardless of its final permissions (spec.md §4.3,
    /// `prepare_load`). ELF text segments are often read-only in their
    /// final form but the loader still needs to write their bytes in.
    pub fn prepare_load(&mut self) {
        for region in &self.regions {
            for i in 0..region.npages {
                let va = VirtualAddress::new(region.start.as_usize() + i * PAGE_SIZE);
                if let Some(pte) = self.pte_mut(va) {
                    pte.perms = PageFlags::READ | PageFlags::WRITE;
                }
            }
        }
        self.use_permissions = false;
    }

    /// Restore each region's declared permissions and establish the heap
    /// bounds immediately above the highest region (spec.md §4.3,
    /// `complete_load`). Must run after every `PT_LOAD` segment has been
    /// copied in. Flushes the TLB so stale writable entries installed
    /// during loading cannot outlive `use_permissions` flipping back on.
    pub fn complete_load(&mut self) -> KernelResult<()> {
        for region in &self.regions {
            for i in 0..region.npages {
                let va = VirtualAddress::new(region.start.as_usize() + i * PAGE_SIZE);
                if let Some(pte) = self.pte_mut(va) {
                    pte.perms = region.perms;
                }
            }
        }
        self.heap_start = self.static_start;
        self.heap_end = self.static_start;
        self.load_complete = true;
        self.use_permissions = true;
        super::tlb::flush_all();
        Ok(())
    }

    /// Grow or shrink the heap by `delta` bytes, returning the previous
    /// break (spec.md §4.3, `sbrk`-equivalent growth used by the heap-fault
    /// path). Negative `delta` shrinking below `heap_start` is rejected.
    pub fn adjust_heap(&mut self, delta: isize) -> KernelResult<VirtualAddress> {
        let old_break = self.heap_end;
        let new_end = old_break.as_usize() as isize + delta;
        if new_end < self.heap_start.as_usize() as isize {
            return Err(KernelError::InvalidArgument {
                what: "adjust_heap: would shrink below heap_start",
            });
        }
        self.heap_end = VirtualAddress::new(new_end as usize);
        Ok(old_break)
    }

    /// Reserve the top-of-memory stack region and return its initial stack
    /// pointer (spec.md §4.3, `define_stack`). The stack starts with zero
    /// pages resident; the fault handler grows it downward on demand.
    pub fn define_stack(&mut self) -> VirtualAddress {
        self.stack_pages = 0;
        VirtualAddress::new(USERSTACK)
    }

    pub fn stack_pages(&self) -> usize {
        self.stack_pages
    }

    /// Grow the stack by one page toward lower addresses, up to
    /// [`crate::config::MAX_STACK_PAGES`] (spec.md §4.4 step 4).
    pub fn grow_stack(&mut self) -> KernelResult<VirtualAddress> {
        if self.stack_pages >= crate::config::MAX_STACK_PAGES {
            return Err(KernelError::NoMemory);
        }
        self.stack_pages += 1;
        let va = USERSTACK - self.stack_pages * PAGE_SIZE;
        Ok(VirtualAddress::new(va))
    }

    fn pte_mut(&mut self, va: VirtualAddress) -> Option<&mut Pte> {
        self.directory
            .get_mut(va.dir_index())?
            .as_mut()?
            .entries
            .get_mut(va.table_index())?
            .as_mut()
    }

    pub fn pte(&self, va: VirtualAddress) -> Option<&Pte> {
        self.directory
            .get(va.dir_index())?
            .as_ref()?
            .entries
            .get(va.table_index())?
            .as_ref()
    }

    /// `true` if `va`'s page is currently backed by a live, owned
    /// translation. A PTE claiming `Location::InMem(frame)` stops being
    /// resident the moment the coremap evicts `frame` out from under it
    /// (spec.md §9, "pending eviction reconciliation"); the PTE itself is
    /// only updated lazily, by [`super::fault::handle_fault`], so this
    /// check is what tells a caller whether it needs to fault first.
    pub(crate) fn resident(&self, va: VirtualAddress) -> bool {
        match self.pte(va).map(|pte| pte.location) {
            Some(Location::InMem(frame)) => {
                super::coremap::COREMAP.frame_owner(frame) == Some(Owner { as_id: self.id, va })
            }
            Some(Location::OnDisk(_)) | Some(Location::InTransit) => true,
            None => false,
        }
    }

    /// Allocate a frame and install a fresh PTE for `va`, creating the
    /// backing page table on first use in this directory slot (spec.md §3,
    /// "Allocation policy" division of labor between the coremap and the
    /// address space).
    pub fn alloc_and_map(&mut self, va: VirtualAddress, perms: PageFlags) -> KernelResult<FrameNumber> {
        let frame = COREMAP.alloc_frame(
            Some(Owner { as_id: self.id, va }),
            perms,
        )?;
        let dir_idx = va.dir_index();
        if self.directory[dir_idx].is_none() {
            self.directory[dir_idx] = Some(PageTable::new());
        }
        let table = self.directory[dir_idx].as_mut().expect("just inserted");
        table.entries[va.table_index()] = Some(Pte {
            location: Location::InMem(frame),
            perms,
        });
        super::physmem::zero_frame(frame);
        super::coremap::COREMAP.set_state(frame, super::coremap::FrameState::Dirty);
        Ok(frame)
    }

    /// Copy `data` into the page mapped at `va`'s page (`va` need not be
    /// page-aligned), failing if no page is mapped there yet. Used by the
    /// ELF loader to fill segment contents (spec.md §4.8). Callers must
    /// have just confirmed `resident(page_start)`; this does not itself
    /// fault a page back in if it was evicted between the check and the
    /// call.
    pub fn write_bytes(&self, va: VirtualAddress, data: &[u8]) -> KernelResult<()> {
        let page_start = va.page_align_down();
        let pte = self.pte(page_start).ok_or(KernelError::BadAddress { addr: va.as_usize() })?;
        let Location::InMem(frame) = pte.location else {
            return Err(KernelError::BadAddress { addr: va.as_usize() });
        };
        let offset = va.as_usize() - page_start.as_usize();
        super::physmem::write_at(frame, offset, data);
        Ok(())
    }

    /// Copy `len` bytes starting at user virtual address `va` into `buf`
    /// (spec.md §4.7, `copyin`). Pages not yet resident are faulted in
    /// exactly as a real access would trigger the hardware TLB miss
    /// handler, so a syscall reading from a heap address that hasn't been
    /// touched yet still works.
    pub fn copyin(&mut self, va: VirtualAddress, buf: &mut [u8]) -> KernelResult<()> {
        self.copy_user(va, buf.len(), super::fault::FaultType::Read, |frame, page_off, n, dst_off| {
            let page = super::physmem::read_frame(frame);
            buf[dst_off..dst_off + n].copy_from_slice(&page[page_off..page_off + n]);
        })
    }

    /// Copy `buf` out to user virtual address `va` (spec.md §4.7,
    /// `copyout`).
    pub fn copyout(&mut self, va: VirtualAddress, buf: &[u8]) -> KernelResult<()> {
        self.copy_user(va, buf.len(), super::fault::FaultType::Write, |frame, page_off, n, src_off| {
            super::physmem::write_at(frame, page_off, &buf[src_off..src_off + n]);
        })
    }

    fn copy_user(
        &mut self,
        va: VirtualAddress,
        len: usize,
        fault_kind: super::fault::FaultType,
        mut per_page: impl FnMut(FrameNumber, usize, usize, usize),
    ) -> KernelResult<()> {
        let mut done = 0;
        while done < len {
            let cur = VirtualAddress::new(va.as_usize() + done);
            let page_start = cur.page_align_down();
            let page_off = cur.as_usize() - page_start.as_usize();
            let n = (PAGE_SIZE - page_off).min(len - done);

            if !self.resident(page_start) {
                super::fault::handle_fault(self, page_start, fault_kind)?;
            }
            let frame = match self.pte(page_start).map(|p| p.location) {
                Some(Location::InMem(frame)) => frame,
                _ => return Err(KernelError::BadAddress { addr: cur.as_usize() }),
            };
            per_page(frame, page_off, n, done);
            done += n;
        }
        Ok(())
    }

    /// Duplicate this address space for `fork` (spec.md §4.3, `as_copy`).
    /// Every resident page is eagerly copied into a fresh frame; pages
    /// currently on disk are duplicated to a new swap slot instead of being
    /// faulted back in, matching OS/161's eager-copy semantics rather than
    /// introducing copy-on-write (spec.md §9, Open Questions).
    ///
    /// Takes `&mut self` because a PTE can claim `InMem` for a frame the
    /// coremap already evicted out from under it (spec.md §9, "pending
    /// eviction reconciliation"); `self.resident` catches that, and the fix
    /// is to fault the page back in on the parent first so there is a real
    /// frame to copy from.
    pub fn copy(&mut self) -> KernelResult<Self> {
        let mut child = Self::create();
        child.regions = self.regions.clone();
        child.static_start = self.static_start;
        child.heap_start = self.heap_start;
        child.heap_end = self.heap_end;
        child.stack_pages = self.stack_pages;
        child.load_complete = self.load_complete;
        child.use_permissions = self.use_permissions;

        for dir_idx in 0..PAGE_DIR_ENTRIES {
            if self.directory[dir_idx].is_none() {
                continue;
            }
            for tbl_idx in 0..PAGE_TABLE_ENTRIES {
                let Some(pte) = self.directory[dir_idx]
                    .as_ref()
                    .and_then(|table| table.entries[tbl_idx])
                else {
                    continue;
                };
                let va = VirtualAddress::new((dir_idx << 22) | (tbl_idx << 12));
                if matches!(pte.location, Location::InMem(_)) && !self.resident(va) {
                    super::fault::handle_fault(self, va, super::fault::FaultType::Read)?;
                }
                let pte = self.directory[dir_idx]
                    .as_ref()
                    .and_then(|table| table.entries[tbl_idx])
                    .expect("reconciled above");
                match pte.location {
                    Location::InMem(frame) => {
                        let new_frame = child.alloc_and_map(va, pte.perms)?;
                        super::physmem::write_frame(new_frame, &super::physmem::read_frame(frame));
                    }
                    Location::OnDisk(slot) => {
                        let new_frame = child.alloc_and_map(va, pte.perms)?;
                        let mut page = [0u8; PAGE_SIZE];
                        SWAP.swap_in(&COREMAP, new_frame, slot, &mut page);
                        super::physmem::write_frame(new_frame, &page);
                    }
                    Location::InTransit => {
                        return Err(KernelError::BadAddress { addr: va.as_usize() });
                    }
                }
            }
        }
        Ok(child)
    }

    /// Tear down every mapping, returning owned frames and swap slots to
    /// their respective allocators (spec.md §4.3, `as_destroy`). A PTE
    /// claiming `InMem` whose frame was actually evicted out from under it
    /// (spec.md §9, "pending eviction reconciliation") instead has a
    /// pending swap slot to free, not a frame.
    pub fn destroy(self) {
        for dir_idx in 0..PAGE_DIR_ENTRIES {
            let Some(table) = self.directory[dir_idx].as_ref() else {
                continue;
            };
            for tbl_idx in 0..PAGE_TABLE_ENTRIES {
                let Some(pte) = table.entries[tbl_idx] else {
                    continue;
                };
                let va = VirtualAddress::new((dir_idx << 22) | (tbl_idx << 12));
                match pte.location {
                    Location::InMem(frame) if self.resident(va) => COREMAP.free_one(frame),
                    Location::InMem(_) => {
                        if let Some(slot) = super::swap::take_pending_eviction(self.id, va) {
                            SWAP.free_slot(slot);
                        }
                    }
                    Location::OnDisk(slot) => SWAP.free_slot(slot),
                    Location::InTransit => {}
                }
            }
        }
    }

    /// Install this address space as the active one for TLB-fault handling
    /// and flush any stale translations for the previous owner (spec.md
    /// §4.3, `as_activate`; §4.4 step 8 covers the TLB side).
    pub fn activate(&self) {
        super::tlb::flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_region_extends_static_start() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.define_region(VirtualAddress::new(0x1000), 2, PageFlags::READ | PageFlags::EXECUTE)
            .expect("region at a page-aligned address must be accepted");
        assert_eq!(asp.static_start.as_usize(), 0x1000 + 2 * PAGE_SIZE);
    }

    #[test]
    fn define_region_eagerly_maps_every_page() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.define_region(VirtualAddress::new(0x1000), 2, PageFlags::READ | PageFlags::WRITE)
            .expect("region at a page-aligned address must be accepted");
        assert!(asp.resident(VirtualAddress::new(0x1000)));
        assert!(asp.resident(VirtualAddress::new(0x1000 + PAGE_SIZE)));
    }

    #[test]
    fn define_region_rejects_unaligned_start() {
        let mut asp = AddressSpace::create();
        let err = asp
            .define_region(VirtualAddress::new(0x1001), 1, PageFlags::READ)
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument { .. }));
    }

    #[test]
    fn complete_load_establishes_heap_at_static_start() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.define_region(VirtualAddress::new(0x0), 4, PageFlags::READ | PageFlags::EXECUTE)
            .expect("aligned region");
        asp.complete_load().expect("complete_load should succeed");
        assert_eq!(asp.heap_start, asp.static_start);
        assert_eq!(asp.heap_end, asp.static_start);
    }

    #[test]
    fn complete_load_restores_use_permissions() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.prepare_load();
        assert!(!asp.use_permissions());
        asp.complete_load().expect("complete_load should succeed");
        assert!(asp.use_permissions());
    }

    #[test]
    fn adjust_heap_rejects_shrinking_below_heap_start() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.complete_load().expect("complete_load should succeed");
        let err = asp.adjust_heap(-(PAGE_SIZE as isize)).unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument { .. }));
    }

    #[test]
    fn grow_stack_moves_downward_from_userstack() {
        let mut asp = AddressSpace::create();
        asp.define_stack();
        let va = asp.grow_stack().expect("growing an empty stack must succeed");
        assert_eq!(va.as_usize(), USERSTACK - PAGE_SIZE);
        assert_eq!(asp.stack_pages(), 1);
    }

    #[test]
    fn destroy_frees_every_mapped_frame() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        let before = COREMAP.free_count();
        asp.alloc_and_map(VirtualAddress::new(0x2000), PageFlags::READ | PageFlags::WRITE)
            .expect("mapping into a fresh address space must succeed");
        assert_eq!(COREMAP.free_count(), before - 1);
        asp.destroy();
        assert_eq!(COREMAP.free_count(), before);
    }
}
