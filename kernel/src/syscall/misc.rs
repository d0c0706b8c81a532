//! Miscellaneous syscall handlers (spec.md §4.7)

use crate::error::KernelError;
use crate::process::table::PROCESS_TABLE;
use crate::process::Pid;

/// Halting the machine is a platform concern; this core only logs the
/// request (spec.md §1, trap/platform boundary).
pub fn reboot() -> Result<(u32, u32), KernelError> {
    log::warn!("syscall: reboot requested (not implemented by this core)");
    Ok((0, 0))
}

pub fn get_time_of_day() -> Result<(u32, u32), KernelError> {
    let ms = crate::timer::ticks_ms();
    Ok(((ms / 1000) as u32, ((ms % 1000) * 1_000) as u32))
}

/// `sbrk`. `delta` is a signed byte count; this core rejects a request
/// that isn't page-aligned rather than silently rounding, leaving the
/// alignment convention for user space to get right (spec.md §9, Open
/// Questions: "sbrk alignment").
pub fn sbrk(caller: Pid, delta: i32) -> Result<(u32, u32), KernelError> {
    if delta as usize & crate::config::PAGE_MASK != 0 {
        return Err(KernelError::InvalidArgument { what: "sbrk: delta not page-aligned" });
    }
    let old_break = PROCESS_TABLE.with_mut(caller, |p| {
        let asp = p.address_space.as_mut().expect("a running process always has an address space");
        asp.adjust_heap(delta as isize)
    })??;
    Ok((old_break.as_usize() as u32, 0))
}
