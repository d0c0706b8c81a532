//! ELF32 big-endian MIPS program loader (spec.md §4.8)
//!
//! Parses just enough of the ELF format to load a statically-linked
//! `ET_EXEC` MIPS binary: the program header table, `PT_LOAD` segments,
//! and the handful of synthetic segment types a MIPS toolchain emits
//! (`PT_MIPS_REGINFO`, `PT_PHDR`) which this loader recognizes and skips.
//! Dynamic linking, relocations, and `PT_INTERP` are not supported --
//! the user-space C library and its build are an external collaborator
//! (spec.md §1), and every test binary this core loads is statically
//! linked. The segment-loading callback mechanics a richer ELF loader
//! would expose are themselves out of scope; this module only implements
//! the one concrete load path spec.md §4.8 describes.

use alloc::string::String;
use alloc::vec::Vec;

use crate::config::{ARG_MAX, PAGE_SIZE};
use crate::error::{KernelError, KernelResult};
use crate::mm::addrspace::AddressSpace;
use crate::mm::{PageFlags, VirtualAddress};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2MSB: u8 = 2;
const ET_EXEC: u16 = 2;
const EM_MIPS: u16 = 8;

const PT_NULL: u32 = 0;
const PT_LOAD: u32 = 1;
const PT_PHDR: u32 = 6;
const PT_MIPS_REGINFO: u32 = 0x7000_0000;

const PF_X: u32 = 0x1;
const PF_W: u32 = 0x2;
const PF_R: u32 = 0x4;

#[derive(Debug)]
struct Elf32Header {
    e_type: u16,
    e_machine: u16,
    e_entry: u32,
    e_phoff: u32,
    e_phentsize: u16,
    e_phnum: u16,
}

#[derive(Debug, Clone, Copy)]
struct Elf32ProgramHeader {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
}

fn read_u16(bytes: &[u8], off: usize) -> KernelResult<u16> {
    let slice: [u8; 2] = bytes
        .get(off..off + 2)
        .ok_or(KernelError::InvalidArgument { what: "elf: truncated header" })?
        .try_into()
        .expect("slice length checked above");
    Ok(u16::from_be_bytes(slice))
}

fn read_u32(bytes: &[u8], off: usize) -> KernelResult<u32> {
    let slice: [u8; 4] = bytes
        .get(off..off + 4)
        .ok_or(KernelError::InvalidArgument { what: "elf: truncated header" })?
        .try_into()
        .expect("slice length checked above");
    Ok(u32::from_be_bytes(slice))
}

fn parse_header(bytes: &[u8]) -> KernelResult<Elf32Header> {
    if bytes.len() < 52 || bytes[0..4] != ELF_MAGIC {
        return Err(KernelError::InvalidArgument { what: "elf: bad magic" });
    }
    if bytes[4] != ELFCLASS32 {
        return Err(KernelError::InvalidArgument { what: "elf: not 32-bit" });
    }
    if bytes[5] != ELFDATA2MSB {
        return Err(KernelError::InvalidArgument { what: "elf: not big-endian" });
    }
    let e_type = read_u16(bytes, 16)?;
    let e_machine = read_u16(bytes, 18)?;
    if e_type != ET_EXEC {
        return Err(KernelError::InvalidArgument { what: "elf: not ET_EXEC" });
    }
    if e_machine != EM_MIPS {
        return Err(KernelError::InvalidArgument { what: "elf: not EM_MIPS" });
    }
    Ok(Elf32Header {
        e_type,
        e_machine,
        e_entry: read_u32(bytes, 24)?,
        e_phoff: read_u32(bytes, 28)?,
        e_phentsize: read_u16(bytes, 42)?,
        e_phnum: read_u16(bytes, 44)?,
    })
}

fn parse_program_headers(bytes: &[u8], header: &Elf32Header) -> KernelResult<Vec<Elf32ProgramHeader>> {
    let mut headers = Vec::with_capacity(header.e_phnum as usize);
    for i in 0..header.e_phnum as usize {
        let base = header.e_phoff as usize + i * header.e_phentsize as usize;
        headers.push(Elf32ProgramHeader {
            p_type: read_u32(bytes, base)?,
            p_offset: read_u32(bytes, base + 4)?,
            p_vaddr: read_u32(bytes, base + 8)?,
            p_filesz: read_u32(bytes, base + 16)?,
            p_memsz: read_u32(bytes, base + 20)?,
            p_flags: read_u32(bytes, base + 24)?,
        });
    }
    Ok(headers)
}

fn segment_perms(p_flags: u32) -> PageFlags {
    let mut perms = PageFlags::empty();
    if p_flags & PF_R != 0 {
        perms |= PageFlags::READ;
    }
    if p_flags & PF_W != 0 {
        perms |= PageFlags::WRITE;
    }
    if p_flags & PF_X != 0 {
        perms |= PageFlags::EXECUTE;
    }
    perms
}

/// The outcome of [`load_elf`]: a ready-to-activate address space plus the
/// entry point and initial stack pointer a trap-return would need.
pub struct LoadedProgram {
    pub address_space: AddressSpace,
    pub entry: VirtualAddress,
    pub stack_ptr: VirtualAddress,
}

/// Load `elf_bytes` into a fresh address space and lay out `argv` on the
/// new stack, following spec.md §4.8's load sequence: parse headers,
/// `prepare_load`, copy each `PT_LOAD` segment (zero-filling the BSS tail
/// where `p_memsz > p_filesz`), `complete_load`, `define_stack`, then push
/// the argument vector.
pub fn load_elf(elf_bytes: &[u8], argv: &[&str]) -> KernelResult<LoadedProgram> {
    let header = parse_header(elf_bytes)?;
    let program_headers = parse_program_headers(elf_bytes, &header)?;

    let mut asp = AddressSpace::create();

    for ph in &program_headers {
        match ph.p_type {
            PT_NULL | PT_PHDR | PT_MIPS_REGINFO => continue,
            PT_LOAD => {
                let start = VirtualAddress::new(ph.p_vaddr as usize).page_align_down();
                let end = (ph.p_vaddr as usize) + ph.p_memsz as usize;
                let npages = (end - start.as_usize()).div_ceil(PAGE_SIZE);
                asp.define_region(start, npages, segment_perms(ph.p_flags))?;
            }
            other => {
                return Err(KernelError::InvalidArgument {
                    what: elf_unsupported_segment_message(other),
                });
            }
        }
    }

    asp.prepare_load();

    for ph in &program_headers {
        if ph.p_type != PT_LOAD {
            continue;
        }
        let file_start = ph.p_offset as usize;
        let file_end = file_start + ph.p_filesz as usize;
        let segment_data = elf_bytes
            .get(file_start..file_end)
            .ok_or(KernelError::InvalidArgument { what: "elf: segment data out of file bounds" })?;

        let mut written = 0usize;
        while written < ph.p_filesz as usize {
            let va = VirtualAddress::new(ph.p_vaddr as usize + written);
            let page_start = va.page_align_down();
            let page_off = va.as_usize() - page_start.as_usize();
            let n = (PAGE_SIZE - page_off).min(ph.p_filesz as usize - written);
            if !asp.resident(page_start) {
                asp.alloc_and_map(page_start, PageFlags::READ | PageFlags::WRITE)?;
            }
            asp.write_bytes(va, &segment_data[written..written + n])?;
            written += n;
        }
        // BSS: pages covering [p_filesz, p_memsz) are already zeroed by
        // alloc_and_map's zero-fill (spec.md §4.8, "BSS zero-fill"); touch
        // them here only so they exist before the program runs.
        while written < ph.p_memsz as usize {
            let va = VirtualAddress::new(ph.p_vaddr as usize + written);
            let page_start = va.page_align_down();
            let n = (PAGE_SIZE - (va.as_usize() - page_start.as_usize())).min(ph.p_memsz as usize - written);
            if !asp.resident(page_start) {
                asp.alloc_and_map(page_start, PageFlags::READ | PageFlags::WRITE)?;
            }
            written += n;
        }
    }

    asp.complete_load()?;
    let initial_sp = asp.define_stack();
    let stack_ptr = push_argv(&mut asp, initial_sp, argv)?;

    Ok(LoadedProgram {
        address_space: asp,
        entry: VirtualAddress::new(header.e_entry as usize),
        stack_ptr,
    })
}

fn elf_unsupported_segment_message(_p_type: u32) -> &'static str {
    "elf: unsupported program header type"
}

/// Marshal `argv` onto the new stack, MIPS o32-ABI style: the strings
/// themselves first (so their addresses are stable), then a
/// NULL-terminated array of pointers to them, with the stack pointer
/// finally aligned down to 8 bytes (spec.md §4.8, "argv marshalling").
/// The combined size of the strings and pointer array is capped at
/// [`ARG_MAX`] (spec.md §9, Open Questions: argv marshalling).
fn push_argv(asp: &mut AddressSpace, top: VirtualAddress, argv: &[&str]) -> KernelResult<VirtualAddress> {
    let string_bytes: usize = argv.iter().map(|s| s.len() + 1).sum();
    let pointer_bytes = (argv.len() + 1) * 4;
    if string_bytes + pointer_bytes > ARG_MAX {
        return Err(KernelError::TooBig { limit: ARG_MAX });
    }

    let mut sp = top.as_usize() - string_bytes;
    let mut string_addrs = Vec::with_capacity(argv.len());
    for s in argv {
        string_addrs.push(sp);
        let mut bytes = String::from(*s).into_bytes();
        bytes.push(0);
        write_user_bytes(asp, VirtualAddress::new(sp), &bytes)?;
        sp += bytes.len();
    }

    let mut sp = top.as_usize() - string_bytes;
    sp -= pointer_bytes;
    sp &= !0x7;

    let mut cursor = sp;
    for addr in &string_addrs {
        write_user_bytes(asp, VirtualAddress::new(cursor), &(*addr as u32).to_be_bytes())?;
        cursor += 4;
    }
    write_user_bytes(asp, VirtualAddress::new(cursor), &0u32.to_be_bytes())?;

    Ok(VirtualAddress::new(sp))
}

fn write_user_bytes(asp: &mut AddressSpace, va: VirtualAddress, data: &[u8]) -> KernelResult<()> {
    let mut written = 0;
    while written < data.len() {
        let cur = VirtualAddress::new(va.as_usize() + written);
        let page_start = cur.page_align_down();
        if !asp.resident(page_start) {
            asp.alloc_and_map(page_start, PageFlags::READ | PageFlags::WRITE)?;
        }
        let page_off = cur.as_usize() - page_start.as_usize();
        let n = (PAGE_SIZE - page_off).min(data.len() - written);
        asp.write_bytes(cur, &data[written..written + n])?;
        written += n;
    }
    Ok(())
}
