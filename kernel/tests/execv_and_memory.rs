//! End-to-end program-loading and virtual-memory scenarios (spec.md §8)

use mossbed_kernel::config::PAGE_SIZE;
use mossbed_kernel::fd::file::Whence;
use mossbed_kernel::mm::coremap::COREMAP;
use mossbed_kernel::mm::swap::{self, MemoryBackingStore};
use mossbed_kernel::mm::VirtualAddress;
use mossbed_kernel::process::pid::Pid;
use mossbed_kernel::process::table::PROCESS_TABLE;
use mossbed_kernel::process::{exec, fork};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Build a minimal statically-linked ET_EXEC/EM_MIPS ELF with a single
/// PT_LOAD segment, matching what `loader::load_elf` expects.
fn build_minimal_elf(entry: u32, segment: &[u8], vaddr: u32, memsz: u32, flags: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&ELF_MAGIC);
    out.push(1); // ELFCLASS32
    out.push(2); // ELFDATA2MSB
    out.extend_from_slice(&[0u8; 10]);
    out.extend_from_slice(&2u16.to_be_bytes()); // ET_EXEC
    out.extend_from_slice(&8u16.to_be_bytes()); // EM_MIPS
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&entry.to_be_bytes());
    out.extend_from_slice(&52u32.to_be_bytes()); // e_phoff
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&[0u8; 2]);
    out.extend_from_slice(&32u16.to_be_bytes()); // e_phentsize
    out.extend_from_slice(&1u16.to_be_bytes()); // e_phnum
    out.extend_from_slice(&[0u8; 6]);

    out.extend_from_slice(&1u32.to_be_bytes()); // PT_LOAD
    out.extend_from_slice(&(84u32).to_be_bytes()); // p_offset
    out.extend_from_slice(&vaddr.to_be_bytes());
    out.extend_from_slice(&vaddr.to_be_bytes());
    out.extend_from_slice(&(segment.len() as u32).to_be_bytes());
    out.extend_from_slice(&memsz.to_be_bytes());
    out.extend_from_slice(&flags.to_be_bytes());
    out.extend_from_slice(&(PAGE_SIZE as u32).to_be_bytes());

    out.extend_from_slice(segment);
    out
}

fn fresh_vm() {
    mossbed_kernel::mm::init(512, 0);
    swap::init(Box::new(MemoryBackingStore::new(64)));
    PROCESS_TABLE.init();
}

/// Execv-hello: a running process replaces its address space with a
/// freshly loaded program and its old address space is gone.
#[test]
fn execv_replaces_the_caller_address_space() {
    fresh_vm();
    let pid = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("p")).expect("alloc should succeed");

    let code = [0xAAu8; 16];
    let elf = build_minimal_elf(0x4000, &code, 0x4000, 16, 0b101); // R|X

    let (entry, stack_ptr) = exec::execv(pid, &elf, &["hello"]).expect("execv should succeed");
    assert_eq!(entry.as_usize(), 0x4000);
    assert!(stack_ptr.as_usize() < mossbed_kernel::config::USERSTACK);

    PROCESS_TABLE
        .with(pid, |p| {
            let asp = p.address_space.as_ref().expect("execv must leave an address space installed");
            assert!(asp.pte(VirtualAddress::new(0x4000)).is_some());
        })
        .expect("process must still exist");
}

/// Heap growth: repeated `sbrk`-style growth extends the break and the
/// newly extended range is usable.
#[test]
fn heap_grows_by_page_aligned_increments() {
    fresh_vm();
    let pid = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("p")).expect("alloc should succeed");
    let first_break = PROCESS_TABLE
        .with_mut(pid, |p| {
            let asp = p.address_space.as_mut().expect("process always has an address space");
            asp.adjust_heap(PAGE_SIZE as isize)
        })
        .expect("with_mut should succeed")
        .expect("adjust_heap should succeed");

    let second_break = PROCESS_TABLE
        .with_mut(pid, |p| {
            let asp = p.address_space.as_mut().expect("process always has an address space");
            asp.adjust_heap(PAGE_SIZE as isize)
        })
        .expect("with_mut should succeed")
        .expect("adjust_heap should succeed");

    assert_eq!(second_break.as_usize() - first_break.as_usize(), PAGE_SIZE);
}

/// Swap round-trip: a page forced out to the backing store by
/// `evict_to_reserve` comes back with its original contents the next time
/// it's touched, via the pending-eviction reconciliation path in
/// `fault::handle_fault`.
#[test]
fn evicted_page_comes_back_with_its_original_contents_on_next_touch() {
    fresh_vm();
    let pid = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("p")).expect("alloc should succeed");
    let rw = mossbed_kernel::mm::PageFlags::READ | mossbed_kernel::mm::PageFlags::WRITE;

    PROCESS_TABLE
        .with_mut(pid, |p| -> mossbed_kernel::error::KernelResult<()> {
            let asp = p.address_space.as_mut().expect("process always has an address space");
            asp.define_region(VirtualAddress::new(0x1000), 1, rw)?;
            asp.write_bytes(VirtualAddress::new(0x1000), b"hello swap")?;
            Ok(())
        })
        .expect("with_mut should succeed")
        .expect("setting up the page should succeed");

    // Force every dirty frame (including the one above) out to the swap
    // device, as the coremap's own reserve-maintenance logic would under
    // memory pressure (spec.md §4.1, §4.2).
    mossbed_kernel::mm::swap::evict_to_reserve(&COREMAP, COREMAP.total_frames());

    let mut buf = [0u8; 10];
    PROCESS_TABLE
        .with_mut(pid, |p| {
            let asp = p.address_space.as_mut().expect("process always has an address space");
            asp.copyin(VirtualAddress::new(0x1000), &mut buf)
        })
        .expect("with_mut should succeed")
        .expect("copyin should fault the page back in from swap");
    assert_eq!(&buf, b"hello swap");
}

/// lseek-on-console: the console fd is not seekable and `lseek` against
/// it fails rather than silently succeeding.
#[test]
fn lseek_against_the_console_is_rejected() {
    fresh_vm();
    let pid = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("p")).expect("alloc should succeed");
    PROCESS_TABLE
        .with_mut(pid, |p| mossbed_kernel::fd::console::install_stdio(&mut p.fd_table))
        .expect("with_mut should succeed")
        .expect("install_stdio should succeed");

    let result = PROCESS_TABLE
        .with(pid, |p| p.fd_table.get(1))
        .expect("with should succeed")
        .expect("fd 1 must be installed")
        .seek(0, Whence::Start);
    assert!(result.is_err());
}
