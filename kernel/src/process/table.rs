//! The process table: PID allocation, reuse, and init-reparenting
//! (spec.md §3, §4.5)

use alloc::string::String;
use alloc::vec::Vec;
use spin::Mutex;

use super::pid::{Pid, ProcessState};
use super::process::Process;
use crate::config::{INIT_PID, MAX_PROCESSES};
use crate::error::{KernelError, KernelResult};

struct TableInner {
    slots: Vec<Option<Process>>,
}

/// Guards the whole process table (spec.md §5, lock level 1; taken before
/// any per-process lock and never while holding the coremap lock).
pub struct ProcessTable {
    inner: Mutex<TableInner>,
}

impl ProcessTable {
    const fn empty() -> Self {
        Self {
            inner: Mutex::new(TableInner { slots: Vec::new() }),
        }
    }

    pub fn init(&self) {
        let mut inner = self.inner.lock();
        inner.slots = Vec::with_capacity(MAX_PROCESSES);
        for _ in 0..MAX_PROCESSES {
            inner.slots.push(None);
        }
    }

    /// Allocate a new PID and install `process` in its slot (spec.md §4.5,
    /// "PID reuse"). PID 0 is never allocated; slots recycle the lowest
    /// free index so exited PIDs come back into circulation once reaped.
    /// Every allocation sweep first destroys any zombie whose parent is
    /// init, reaping orphans init never explicitly `waitpid`s for (spec.md
    /// §4.5: "Init ... is responsible for reaping orphans: every
    /// PID-allocation sweep first scans for ZOMBIE entries whose parent is
    /// init and destroys them.").
    pub fn alloc(&self, parent: Pid, name: String) -> KernelResult<Pid> {
        let mut inner = self.inner.lock();
        reap_init_zombies(&mut inner);
        let idx = inner
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .ok_or(KernelError::TooManyProc)?;
        let pid = Pid(idx as u32);
        inner.slots[idx] = Some(Process::new(pid, parent, name));
        Ok(pid)
    }

    /// Install a process at a specific PID, used only for the bootstrap
    /// init process which must land at [`INIT_PID`].
    pub fn install_at(&self, pid: Pid, parent: Pid, name: String) -> KernelResult<()> {
        let mut inner = self.inner.lock();
        let idx = pid.as_u32() as usize;
        if inner.slots[idx].is_some() {
            return Err(KernelError::InvalidArgument {
                what: "install_at: slot already occupied",
            });
        }
        inner.slots[idx] = Some(Process::new(pid, parent, name));
        Ok(())
    }

    pub fn with<R>(&self, pid: Pid, f: impl FnOnce(&Process) -> R) -> KernelResult<R> {
        let inner = self.inner.lock();
        let slot = inner.slots[pid.as_u32() as usize]
            .as_ref()
            .ok_or(KernelError::NoSuchProcess { pid: pid.as_u32() })?;
        Ok(f(slot))
    }

    pub fn with_mut<R>(&self, pid: Pid, f: impl FnOnce(&mut Process) -> R) -> KernelResult<R> {
        let mut inner = self.inner.lock();
        let slot = inner.slots[pid.as_u32() as usize]
            .as_mut()
            .ok_or(KernelError::NoSuchProcess { pid: pid.as_u32() })?;
        Ok(f(slot))
    }

    /// Mark `pid` a zombie with the given exit code, close every open
    /// descriptor, reparent any of its children to init, and signal the
    /// wait semaphore unconditionally so a waiting parent (or init) observes
    /// the exit (spec.md §4.5, "exit": steps 1, 3, 4).
    pub fn mark_exited(&self, pid: Pid, exit_code: i32) -> KernelResult<()> {
        let mut inner = self.inner.lock();
        {
            let slot = inner.slots[pid.as_u32() as usize]
                .as_mut()
                .ok_or(KernelError::NoSuchProcess { pid: pid.as_u32() })?;
            slot.state = ProcessState::Zombie;
            slot.exit_code = Some(exit_code);
            slot.address_space.take().map(|asp| asp.destroy());
            slot.fd_table.close_all()?;
            slot.wait_sem.up();
        }
        for slot in inner.slots.iter_mut().flatten() {
            if slot.parent == pid {
                slot.parent = Pid(INIT_PID);
            }
        }
        Ok(())
    }

    /// Reap a zombie child of `parent`, freeing its slot for PID reuse and
    /// returning `(pid, exit_code)` (spec.md §4.5, "waitpid"). Returns
    /// `Err(NotChild)` if `child` is not a zombie belonging to `parent`.
    pub fn reap(&self, parent: Pid, child: Pid) -> KernelResult<i32> {
        let mut inner = self.inner.lock();
        let idx = child.as_u32() as usize;
        let matches = matches!(
            &inner.slots[idx],
            Some(p) if p.parent == parent && p.is_zombie()
        );
        if !matches {
            return Err(KernelError::NotChild { pid: child.as_u32() });
        }
        let exit_code = inner.slots[idx].as_ref().expect("checked above").exit_code.expect("zombie always has an exit code");
        inner.slots[idx] = None;
        Ok(exit_code)
    }

    /// Find any zombie child of `parent`, without reaping it (used by
    /// `waitpid(-1, ...)` semantics, spec.md §4.5).
    pub fn find_zombie_child(&self, parent: Pid) -> Option<Pid> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .flatten()
            .find(|p| p.parent == parent && p.is_zombie())
            .map(|p| p.pid)
    }

    pub fn has_children(&self, parent: Pid) -> bool {
        let inner = self.inner.lock();
        inner.slots.iter().flatten().any(|p| p.parent == parent)
    }
}

/// Destroy every zombie slot whose parent is init, freeing its PID for
/// reuse without a parent ever having called `waitpid` for it (spec.md
/// §4.5, "orphan reaping"). Called at the start of every `alloc`, under
/// the table lock.
fn reap_init_zombies(inner: &mut TableInner) {
    for slot in inner.slots.iter_mut() {
        let is_init_zombie = matches!(slot, Some(p) if p.parent == Pid(INIT_PID) && p.is_zombie());
        if is_init_zombie {
            *slot = None;
        }
    }
}

/// Global process table, initialized once at bootstrap (spec.md §9).
pub static PROCESS_TABLE: ProcessTable = ProcessTable::empty();

pub fn init() {
    PROCESS_TABLE.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> ProcessTable {
        let t = ProcessTable::empty();
        t.init();
        t
    }

    #[test]
    fn alloc_skips_reserved_kernel_pid() {
        let t = fresh();
        let pid = t.alloc(Pid::KERNEL, String::from("first")).expect("alloc should succeed");
        assert_ne!(pid, Pid::KERNEL);
    }

    #[test]
    fn exit_reparents_children_to_init() {
        let t = fresh();
        t.install_at(Pid(INIT_PID), Pid::KERNEL, String::from("init")).expect("install init");
        let parent = t.alloc(Pid(INIT_PID), String::from("parent")).expect("alloc parent");
        let child = t.alloc(parent, String::from("child")).expect("alloc child");
        t.mark_exited(parent, 0).expect("mark_exited should succeed");
        let child_parent = t.with(child, |p| p.parent).expect("child slot must exist");
        assert_eq!(child_parent, Pid(INIT_PID));
    }

    #[test]
    fn alloc_sweeps_and_frees_orphaned_zombies_reparented_to_init() {
        let t = fresh();
        t.install_at(Pid(INIT_PID), Pid::KERNEL, String::from("init")).expect("install init");
        let parent = t.alloc(Pid(INIT_PID), String::from("parent")).expect("alloc parent");
        let orphan = t.alloc(parent, String::from("orphan")).expect("alloc orphan");
        t.mark_exited(parent, 0).expect("mark_exited should succeed");
        t.mark_exited(orphan, 0).expect("orphan reparented to init should still be able to exit");
        assert_eq!(t.with(orphan, |p| p.parent).expect("orphan slot must still exist"), Pid(INIT_PID));

        t.alloc(Pid(INIT_PID), String::from("unrelated")).expect("alloc should succeed and sweep first");

        assert!(t.with(orphan, |_| ()).is_err(), "the orphan's zombie slot should have been swept without an explicit waitpid");
    }

    #[test]
    fn reap_frees_the_pid_for_reuse() {
        let t = fresh();
        let parent = t.alloc(Pid::KERNEL, String::from("parent")).expect("alloc parent");
        let child = t.alloc(parent, String::from("child")).expect("alloc child");
        t.mark_exited(child, 7).expect("mark_exited should succeed");
        let code = t.reap(parent, child).expect("reap should succeed on a zombie child");
        assert_eq!(code, 7);
        assert!(t.with(child, |_| ()).is_err());
    }

    #[test]
    fn reap_rejects_non_child() {
        let t = fresh();
        let a = t.alloc(Pid::KERNEL, String::from("a")).expect("alloc a");
        let b = t.alloc(Pid::KERNEL, String::from("b")).expect("alloc b");
        t.mark_exited(b, 0).expect("mark_exited should succeed");
        assert!(t.reap(a, b).is_err());
    }
}
