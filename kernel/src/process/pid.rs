//! Process identifiers and per-slot lifecycle state (spec.md §3, §4.5)

/// A process identifier. PID 0 is reserved for the kernel itself and is
/// never handed out by [`super::table::ProcessTable::alloc`]; PID
/// [`crate::config::INIT_PID`] is reserved for the init process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    pub const KERNEL: Pid = Pid(0);

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Lifecycle state of a process-table slot (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot does not name a live process; its PID is available for reuse.
    Free,
    /// A live, schedulable process.
    Running,
    /// Exited but not yet reaped by a `waitpid` from its parent (or init,
    /// after reparenting).
    Zombie,
}
