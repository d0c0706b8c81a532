//! TLB-fault handler (spec.md §4.4)
//!
//! The real trap entry stub that lands here is an external collaborator
//! (spec.md §1); this module starts from the decoded fault address and
//! access type a trap handler would hand it, and implements the eight-step
//! contract spec.md §4.4 describes.

use super::addrspace::{AddressSpace, Location};
use super::swap::SWAP;
use super::{PageFlags, VirtualAddress, PAGE_SIZE};
use crate::config::{KSEG_BASE, STACK_GUARD_PAGES, USERSTACK};
use crate::error::{KernelError, KernelResult};

/// The kind of access that faulted, decoded from the trap cause register by
/// the (external) trap stub. `ReadOnlyWrite` is the distinct trap MIPS
/// raises for a write that hits a mapped-but-read-only page (a TLB Mod
/// exception), as opposed to `Write`'s TLB-miss refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Read,
    Write,
    ReadOnlyWrite,
    Execute,
}

impl FaultType {
    fn required_perm(self) -> PageFlags {
        match self {
            FaultType::Read => PageFlags::READ,
            FaultType::Write | FaultType::ReadOnlyWrite => PageFlags::WRITE,
            FaultType::Execute => PageFlags::EXECUTE,
        }
    }
}

/// Whether `kind` is satisfied by `perms` on an address space currently in
/// state `use_permissions` (spec.md §4.4 step 8: "Writable is granted if
/// the PTE's W bit is set OR `use_permissions` is false").
fn permission_granted(use_permissions: bool, perms: PageFlags, kind: FaultType) -> bool {
    if matches!(kind, FaultType::Write | FaultType::ReadOnlyWrite) && !use_permissions {
        return true;
    }
    perms.contains(kind.required_perm())
}

/// Handle a TLB-refill/permission fault at `vaddr` for `kind` against
/// `asp`, following spec.md §4.4's numbered steps:
///
/// 1. Reject a `READONLY_WRITE` outright while `use_permissions` is set --
///    a write landed on a page mapped read-only, not a missing mapping.
/// 2. Reject `vaddr == 0`; a null dereference is never a valid fault to
///    service.
/// 3. Page-align the fault address -- a real trap hands over the exact
///    faulting byte, not the page it falls in.
/// 4. Addresses at or above [`KSEG_BASE`] are never faulted in on behalf of
///    user code.
/// 5. If a PTE already exists and is resident, this is a pure permission
///    check or a stale-TLB refill; reinsert the translation.
/// 6. If no PTE exists, decide whether `vaddr` falls in the stack growth
///    region (between the current stack floor and the guard band) or the
///    heap, and grow accordingly; anything else is a segmentation fault.
/// 7. If the PTE exists but its location is ON_DISK, hand off to the swap
///    engine to bring it back into memory.
/// 8. If the PTE's location is IN_TRANSIT, the caller must retry -- another
///    fault on the same page is already being serviced.
/// 9. Once a frame is resident, check the requested access against the
///    PTE's permissions, granting writes unconditionally while
///    `use_permissions` is clear.
/// 10. Install the translation into the software TLB (round-robin
///     replacement owns eviction) and return.
pub fn handle_fault(asp: &mut AddressSpace, vaddr: VirtualAddress, kind: FaultType) -> KernelResult<()> {
    if kind == FaultType::ReadOnlyWrite && asp.use_permissions() {
        return Err(KernelError::PermissionViolation);
    }
    if vaddr.as_usize() == 0 {
        return Err(KernelError::BadAddress { addr: 0 });
    }
    let vaddr = vaddr.page_align_down();
    if vaddr.as_usize() >= KSEG_BASE {
        return Err(KernelError::BadAddress { addr: vaddr.as_usize() });
    }

    if let Some(slot) = super::swap::take_pending_eviction(asp.id(), vaddr) {
        let perms = asp
            .pte(vaddr)
            .map(|pte| pte.perms)
            .unwrap_or(PageFlags::READ | PageFlags::WRITE);
        let mut page = [0u8; PAGE_SIZE];
        let frame = asp.alloc_and_map(vaddr, perms)?;
        SWAP.swap_in(&super::coremap::COREMAP, frame, slot, &mut page);
        super::physmem::write_frame(frame, &page);
        SWAP.free_slot(slot);
        if !permission_granted(asp.use_permissions(), perms, kind) {
            return Err(KernelError::PermissionViolation);
        }
        super::tlb::install(vaddr, perms);
        return Ok(());
    }

    if let Some(pte) = asp.pte(vaddr) {
        match pte.location {
            Location::InTransit => return Err(KernelError::BadAddress { addr: vaddr.as_usize() }),
            Location::OnDisk(slot) => {
                let mut page = [0u8; PAGE_SIZE];
                let frame = asp.alloc_and_map(vaddr, pte.perms)?;
                SWAP.swap_in(&super::coremap::COREMAP, frame, slot, &mut page);
                SWAP.free_slot(slot);
            }
            Location::InMem(_) => {}
        }
        let perms = asp.pte(vaddr).expect("pte just touched").perms;
        if !permission_granted(asp.use_permissions(), perms, kind) {
            return Err(KernelError::PermissionViolation);
        }
        super::tlb::install(vaddr, perms);
        return Ok(());
    }

    if is_stack_growth(asp, vaddr) {
        asp.grow_stack()?;
        asp.alloc_and_map(vaddr, PageFlags::READ | PageFlags::WRITE)?;
        super::tlb::install(vaddr, PageFlags::READ | PageFlags::WRITE);
        return Ok(());
    }

    if vaddr.as_usize() >= asp.heap_start.as_usize() && vaddr.as_usize() < asp.heap_end.as_usize() {
        asp.alloc_and_map(vaddr, PageFlags::READ | PageFlags::WRITE)?;
        super::tlb::install(vaddr, PageFlags::READ | PageFlags::WRITE);
        return Ok(());
    }

    Err(KernelError::BadAddress { addr: vaddr.as_usize() })
}

/// `true` if `vaddr` falls between the current stack floor and the guard
/// band below it, i.e. a legitimate next page to grow into (spec.md §4.4
/// step 4).
fn is_stack_growth(asp: &AddressSpace, vaddr: VirtualAddress) -> bool {
    let floor = USERSTACK - asp.stack_pages() * PAGE_SIZE;
    let guard_floor = floor.saturating_sub(STACK_GUARD_PAGES * PAGE_SIZE);
    vaddr.as_usize() >= guard_floor && vaddr.as_usize() < floor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_address_is_rejected() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        let err = handle_fault(&mut asp, VirtualAddress::new(KSEG_BASE), FaultType::Read).unwrap_err();
        assert!(matches!(err, KernelError::BadAddress { .. }));
    }

    #[test]
    fn unmapped_non_stack_non_heap_address_segfaults() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.complete_load().expect("complete_load should succeed");
        let err = handle_fault(&mut asp, VirtualAddress::new(0x40_0000), FaultType::Read).unwrap_err();
        assert!(matches!(err, KernelError::BadAddress { .. }));
    }

    #[test]
    fn heap_fault_lazily_maps_a_page() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.complete_load().expect("complete_load should succeed");
        asp.adjust_heap(PAGE_SIZE as isize).expect("heap growth should succeed");
        let heap_va = asp.heap_start;
        handle_fault(&mut asp, heap_va, FaultType::Write).expect("heap fault should map a page");
        assert!(asp.pte(heap_va).is_some());
    }

    #[test]
    fn first_stack_fault_grows_one_page_below_userstack() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.define_stack();
        let va = VirtualAddress::new(USERSTACK - PAGE_SIZE);
        handle_fault(&mut asp, va, FaultType::Write).expect("first stack fault should grow the stack");
        assert_eq!(asp.stack_pages(), 1);
    }

    #[test]
    fn unaligned_fault_address_is_serviced_against_its_page() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.complete_load().expect("complete_load should succeed");
        asp.adjust_heap(PAGE_SIZE as isize).expect("heap growth should succeed");
        let mid_page = VirtualAddress::new(asp.heap_start.as_usize() + 0x10);
        handle_fault(&mut asp, mid_page, FaultType::Write).expect("a mid-page fault address should be page-aligned and serviced");
        assert!(asp.pte(asp.heap_start).is_some());
    }

    #[test]
    fn null_dereference_is_rejected() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        let err = handle_fault(&mut asp, VirtualAddress::new(0), FaultType::Read).unwrap_err();
        assert!(matches!(err, KernelError::BadAddress { addr: 0 }));
    }

    #[test]
    fn readonly_write_fault_is_a_permission_violation_during_normal_execution() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.complete_load().expect("complete_load should succeed");
        let err = handle_fault(&mut asp, VirtualAddress::new(0x1000), FaultType::ReadOnlyWrite).unwrap_err();
        assert!(matches!(err, KernelError::PermissionViolation));
    }

    #[test]
    fn write_fault_is_granted_during_load_regardless_of_declared_permissions() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.define_region(VirtualAddress::new(0x0), 1, PageFlags::READ | PageFlags::EXECUTE)
            .expect("aligned region");
        asp.prepare_load();
        handle_fault(&mut asp, VirtualAddress::new(0x0), FaultType::Write)
            .expect("a write during load must be granted even onto a read-only region");
    }

    #[test]
    fn write_fault_on_read_only_page_is_a_permission_violation() {
        crate::mm::init(64, 0);
        let mut asp = AddressSpace::create();
        asp.define_region(VirtualAddress::new(0x0), 1, PageFlags::READ | PageFlags::EXECUTE)
            .expect("aligned region");
        asp.prepare_load();
        asp.complete_load().expect("complete_load should succeed");
        let err = handle_fault(&mut asp, VirtualAddress::new(0x0), FaultType::Write).unwrap_err();
        assert!(matches!(err, KernelError::PermissionViolation));
    }
}
