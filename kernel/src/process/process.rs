//! The per-process control block (spec.md §3)

use alloc::string::String;

use super::pid::{Pid, ProcessState};
use crate::fd::file::FileTable;
use crate::mm::addrspace::AddressSpace;
use crate::sync::wchan::Semaphore;

/// A single process's kernel-visible state. Lives in a
/// [`super::table::ProcessTable`] slot for its whole lifetime, including as
/// a zombie awaiting reap.
pub struct Process {
    pub pid: Pid,
    pub parent: Pid,
    pub state: ProcessState,
    /// Set when `state == Zombie`; the value a parent's `waitpid` observes.
    pub exit_code: Option<i32>,
    pub address_space: Option<AddressSpace>,
    pub fd_table: FileTable,
    /// Signalled unconditionally by `exit` and consumed by a `waitpid` that
    /// finds this process already a zombie (spec.md §3, §4.5).
    pub wait_sem: Semaphore,
    /// Present in the data model (spec.md §3) alongside `wait_sem`. This
    /// core's `fork` copies the address space and installs the child
    /// synchronously before returning, so there is no intermediate state
    /// for a caller to block on; nothing currently downs or ups it.
    pub fork_sem: Semaphore,
    /// For diagnostics/log lines only; not consulted by any dispatch logic.
    pub name: String,
}

impl Process {
    pub fn new(pid: Pid, parent: Pid, name: String) -> Self {
        Self {
            pid,
            parent,
            state: ProcessState::Running,
            exit_code: None,
            address_space: Some(AddressSpace::create()),
            fd_table: FileTable::new(),
            wait_sem: Semaphore::new("process-wait", 0),
            fork_sem: Semaphore::new("process-fork", 0),
            name,
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.state == ProcessState::Zombie
    }
}
