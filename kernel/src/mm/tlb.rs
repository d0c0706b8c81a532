//! Software TLB abstraction (spec.md §4.4 step 8)
//!
//! The real hardware TLB and its shootdown IPI are architecture concerns
//! (spec.md §1); this module models the per-CPU software side a platform
//! integration would drive: a fixed-size table of resident translations
//! with round-robin replacement, and a shootdown hook for multi-CPU
//! configurations to call into.

use spin::Mutex;

use super::{PageFlags, VirtualAddress};
use crate::config::TLB_ENTRIES;

#[derive(Debug, Clone, Copy)]
struct Entry {
    vaddr: VirtualAddress,
    perms: PageFlags,
}

struct SoftTlb {
    entries: [Option<Entry>; TLB_ENTRIES],
    next_victim: usize,
}

impl SoftTlb {
    const fn empty() -> Self {
        Self {
            entries: [None; TLB_ENTRIES],
            next_victim: 0,
        }
    }

    fn install(&mut self, vaddr: VirtualAddress, perms: PageFlags) {
        if let Some(slot) = self.entries.iter_mut().find(|e| matches!(e, Some(e) if e.vaddr == vaddr)) {
            *slot = Some(Entry { vaddr, perms });
            return;
        }
        if let Some(slot) = self.entries.iter_mut().find(|e| e.is_none()) {
            *slot = Some(Entry { vaddr, perms });
            return;
        }
        let victim = self.next_victim;
        self.entries[victim] = Some(Entry { vaddr, perms });
        self.next_victim = (victim + 1) % TLB_ENTRIES;
    }

    fn lookup(&self, vaddr: VirtualAddress) -> Option<PageFlags> {
        self.entries
            .iter()
            .flatten()
            .find(|e| e.vaddr == vaddr)
            .map(|e| e.perms)
    }

    fn invalidate(&mut self, vaddr: VirtualAddress) {
        for slot in self.entries.iter_mut() {
            if matches!(slot, Some(e) if e.vaddr == vaddr) {
                *slot = None;
            }
        }
    }

    fn flush_all(&mut self) {
        self.entries = [None; TLB_ENTRIES];
        self.next_victim = 0;
    }
}

static TLB: Mutex<SoftTlb> = Mutex::new(SoftTlb::empty());

/// Install a translation, evicting the round-robin victim slot if the table
/// is full (spec.md §4.4 step 8).
pub fn install(vaddr: VirtualAddress, perms: PageFlags) {
    TLB.lock().install(vaddr, perms);
}

pub fn lookup(vaddr: VirtualAddress) -> Option<PageFlags> {
    TLB.lock().lookup(vaddr)
}

/// Invalidate a single translation, e.g. when its page is chosen as a swap
/// victim (spec.md §4.2).
pub fn invalidate(vaddr: VirtualAddress) {
    TLB.lock().invalidate(vaddr);
}

/// Flush every translation, used on address-space switch (spec.md §4.3,
/// `as_activate`). On a real multi-CPU target this is also the shootdown
/// target other cores' IPI handlers call.
pub fn flush_all() {
    TLB.lock().flush_all();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_then_lookup_roundtrips() {
        flush_all();
        install(VirtualAddress::new(0x1000), PageFlags::READ | PageFlags::WRITE);
        assert_eq!(lookup(VirtualAddress::new(0x1000)), Some(PageFlags::READ | PageFlags::WRITE));
    }

    #[test]
    fn invalidate_removes_only_the_named_entry() {
        flush_all();
        install(VirtualAddress::new(0x1000), PageFlags::READ);
        install(VirtualAddress::new(0x2000), PageFlags::WRITE);
        invalidate(VirtualAddress::new(0x1000));
        assert_eq!(lookup(VirtualAddress::new(0x1000)), None);
        assert_eq!(lookup(VirtualAddress::new(0x2000)), Some(PageFlags::WRITE));
    }

    #[test]
    fn full_table_evicts_round_robin() {
        flush_all();
        for i in 0..TLB_ENTRIES {
            install(VirtualAddress::new((i + 1) * 0x1000), PageFlags::READ);
        }
        install(VirtualAddress::new((TLB_ENTRIES + 1) * 0x1000), PageFlags::READ);
        assert_eq!(lookup(VirtualAddress::new(0x1000)), None);
    }
}
