//! `fork` (spec.md §4.5)
//!
//! Duplicates the calling process's address space and file descriptor
//! table into a freshly allocated child. The caller is responsible for
//! arranging the child to resume in user mode at the same PC as the parent
//! with a zero return value in its syscall result register -- that's a
//! trap-frame detail owned by [`crate::syscall`], not this module.

use alloc::string::String;

use super::pid::Pid;
use super::table::PROCESS_TABLE;
use crate::error::KernelResult;
use crate::fd::file::FileTable;

/// Fork `parent`, returning the new child's PID. The parent's own return
/// value (the child's PID) is the caller's job to deliver; this function
/// only performs the duplication.
pub fn fork(parent: Pid) -> KernelResult<Pid> {
    let (parent_asp_copy, parent_fds) = PROCESS_TABLE.with_mut(parent, |p| -> KernelResult<_> {
        let asp = p.address_space.as_mut().expect("a running process always has an address space");
        Ok((asp.copy()?, FileTable::fork_from(&p.fd_table)))
    })??;

    let child = PROCESS_TABLE.alloc(parent, String::from("<forked>"))?;
    PROCESS_TABLE.with_mut(child, |p| {
        p.address_space = Some(parent_asp_copy);
        p.fd_table = parent_fds;
    })?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::pid::Pid;

    #[test]
    fn fork_creates_a_distinct_child_with_a_copied_address_space() {
        crate::mm::init(128, 0);
        PROCESS_TABLE.init();
        let parent = PROCESS_TABLE.alloc(Pid::KERNEL, String::from("parent")).expect("alloc parent");
        let child = fork(parent).expect("fork should succeed");
        assert_ne!(parent, child);
        let child_parent = PROCESS_TABLE.with(child, |p| p.parent).expect("child must exist");
        assert_eq!(child_parent, parent);
    }
}
