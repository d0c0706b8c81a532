//! `waitpid` (spec.md §4.5)
//!
//! Reaping itself is immediate and lock-protected (see
//! [`super::table::ProcessTable::reap`]); blocking until a child actually
//! exits is a wait-channel concern this module only exposes the contract
//! for. A caller that gets [`KernelError::WouldBlock`] is expected to park
//! on the process's wait channel (spec.md §9, "Supplemented features") and
//! retry; what actually decides "ready" is the child's `wait_sem`, which
//! `exit` signals unconditionally (spec.md §4.5 step 3) before its ZOMBIE
//! transition, so a successful `try_down` here is always coherent with the
//! child already being a zombie by the time `reap` runs.

use super::pid::Pid;
use super::table::PROCESS_TABLE;
use crate::error::{KernelError, KernelResult};

/// `pid == None` matches any child, like classic `waitpid(-1, ...)`.
pub fn waitpid(parent: Pid, pid: Option<Pid>) -> KernelResult<(Pid, i32)> {
    let target = match pid {
        Some(pid) => {
            let is_child = PROCESS_TABLE.with(pid, |p| p.parent == parent).unwrap_or(false);
            if !is_child {
                return Err(KernelError::NotChild { pid: pid.as_u32() });
            }
            let ready = PROCESS_TABLE.with(pid, |p| p.wait_sem.try_down())?;
            if !ready {
                return Err(KernelError::WouldBlock);
            }
            pid
        }
        None => {
            if !PROCESS_TABLE.has_children(parent) {
                return Err(KernelError::NotChild { pid: 0 });
            }
            let child = PROCESS_TABLE.find_zombie_child(parent).ok_or(KernelError::WouldBlock)?;
            PROCESS_TABLE.with(child, |p| p.wait_sem.try_down())?;
            child
        }
    };
    let exit_code = PROCESS_TABLE.reap(parent, target)?;
    Ok((target, exit_code))
}
