//! `exit` (spec.md §4.5)
//!
//! Tears down the exiting process's address space immediately, closes
//! every open descriptor (running the refcounted-close contract right
//! away rather than waiting on the `Process` struct's drop glue at reap
//! time), marks it a zombie carrying its exit code, reparents any of its
//! own children to init, and signals the wait semaphore unconditionally so
//! a blocked (or future) `waitpid` observes the exit.

use super::pid::Pid;
use super::table::PROCESS_TABLE;
use crate::error::KernelResult;

pub fn exit(pid: Pid, exit_code: i32) -> KernelResult<()> {
    PROCESS_TABLE.mark_exited(pid, exit_code)
}
