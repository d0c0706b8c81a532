//! `execv` (spec.md §4.5, §4.8)
//!
//! Destroys the calling process's old address space up front, then loads
//! the new program: "on failure, the old address space has already been
//! destroyed, so failure modes past point (3) are fatal to the process"
//! (spec.md §4.5). There is no rollback to an old address space to return
//! to -- a load failure here leaves the process with none, and the caller
//! is expected to kill it.

use super::pid::Pid;
use super::table::PROCESS_TABLE;
use crate::error::KernelResult;
use crate::loader::LoadedProgram;
use crate::mm::VirtualAddress;

/// Destroy `pid`'s current address space, then load `elf_bytes` with
/// `argv` into a fresh one and install it. Returns the new entry point and
/// initial stack pointer for the caller to hand to `mips_usermode` (an
/// external collaborator, spec.md §1).
pub fn execv(pid: Pid, elf_bytes: &[u8], argv: &[&str]) -> KernelResult<(VirtualAddress, VirtualAddress)> {
    PROCESS_TABLE.with_mut(pid, |p| {
        if let Some(old) = p.address_space.take() {
            old.destroy();
        }
    })?;

    let LoadedProgram { address_space, entry, stack_ptr } = crate::loader::load_elf(elf_bytes, argv)?;

    PROCESS_TABLE.with_mut(pid, |p| {
        p.address_space = Some(address_space);
    })?;

    Ok((entry, stack_ptr))
}
