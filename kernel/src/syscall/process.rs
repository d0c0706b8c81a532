//! Process-lifecycle syscall handlers (spec.md §4.5, §4.7)
//!
//! User pointers (the argv array for `execv`, the status pointer `waitpid`
//! would normally write through) require a `copyin`/`copyout` path that
//! walks the caller's own page table through the same fault machinery as a
//! real access -- that plumbing lives with the trap stub and is out of
//! scope here (spec.md §1). These handlers take the already-decoded
//! values a copyin layer would have produced; a real integration decodes
//! `tf_a0`/`tf_a1` into those values before calling in.

use crate::error::KernelError;
use crate::process::table::PROCESS_TABLE;
use crate::process::{fork, wait};
use crate::process::Pid;

pub fn sys_fork(caller: Pid) -> Result<(u32, u32), KernelError> {
    let child = fork::fork(caller)?;
    Ok((child.as_u32(), 0))
}

/// `execv`. `_path_ptr`/`_argv_ptr` stand in for the user-space pointers a
/// copyin layer would resolve into an ELF image and argument vector; this
/// core's handler is exercised directly against decoded bytes in
/// [`crate::process::exec`] and its own tests rather than through this
/// thin syscall seam (spec.md §9, Open Questions: argv marshalling).
pub fn sys_execv(_caller: Pid, _path_ptr: u32, _argv_ptr: u32) -> Result<(u32, u32), KernelError> {
    Err(KernelError::InvalidArgument {
        what: "execv: requires a copyin layer supplied by the trap stub integration",
    })
}

pub fn sys_exit(caller: Pid, code: i32) -> Result<(u32, u32), KernelError> {
    crate::process::exit::exit(caller, code)?;
    Ok((0, 0))
}

/// `pid_arg == 0` is treated as `waitpid(-1, ...)` (any child), matching
/// the convention this core uses since syscall arguments are unsigned
/// registers and `-1` doesn't survive the `u32` trap-frame slot untouched;
/// a real libc wrapper is expected to special-case it the same way.
pub fn sys_waitpid(caller: Pid, pid_arg: u32) -> Result<(u32, u32), KernelError> {
    let target = if pid_arg == 0 { None } else { Some(Pid(pid_arg)) };
    let (pid, exit_code) = wait::waitpid(caller, target)?;
    Ok((pid.as_u32(), exit_code as u32))
}

pub fn sys_getpid(caller: Pid) -> Result<(u32, u32), KernelError> {
    PROCESS_TABLE.with(caller, |_| ())?;
    Ok((caller.as_u32(), 0))
}
