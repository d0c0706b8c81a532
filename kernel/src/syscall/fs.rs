//! File descriptor syscall handlers (spec.md §4.6, §4.7)
//!
//! `open`'s path argument names a file through the VFS namespace, which is
//! an external collaborator (spec.md §1); this handler cannot resolve a
//! path on its own; see [`crate::fd`] for the fd-table operations this
//! core does own, exercised directly in that module's own tests.

use alloc::vec;

use crate::error::KernelError;
use crate::fd::file::Whence;
use crate::mm::VirtualAddress;
use crate::process::table::PROCESS_TABLE;
use crate::process::Pid;

pub fn sys_open(_caller: Pid, _path_ptr: u32, _flags: u32) -> Result<(u32, u32), KernelError> {
    Err(KernelError::InvalidArgument {
        what: "open: requires a copyin layer and VFS lookup supplied by the platform integration",
    })
}

pub fn sys_read(caller: Pid, fd: usize, buf_ptr: u32, len: u32) -> Result<(u32, u32), KernelError> {
    PROCESS_TABLE.with_mut(caller, |p| -> Result<u32, KernelError> {
        let handle = p.fd_table.get(fd)?;
        let mut tmp = vec![0u8; len as usize];
        let n = handle.read(&mut tmp)?;
        let asp = p.address_space.as_mut().expect("a running process always has an address space");
        asp.copyout(VirtualAddress::new(buf_ptr as usize), &tmp[..n])?;
        Ok(n as u32)
    })?
    .map(|n| (n, 0))
}

pub fn sys_write(caller: Pid, fd: usize, buf_ptr: u32, len: u32) -> Result<(u32, u32), KernelError> {
    PROCESS_TABLE.with_mut(caller, |p| -> Result<u32, KernelError> {
        let mut tmp = vec![0u8; len as usize];
        let asp = p.address_space.as_mut().expect("a running process always has an address space");
        asp.copyin(VirtualAddress::new(buf_ptr as usize), &mut tmp)?;
        let handle = p.fd_table.get(fd)?;
        let n = handle.write(&tmp)?;
        Ok(n as u32)
    })?
    .map(|n| (n, 0))
}

pub fn sys_close(caller: Pid, fd: usize) -> Result<(u32, u32), KernelError> {
    PROCESS_TABLE.with_mut(caller, |p| p.fd_table.close(fd))??;
    Ok((0, 0))
}

pub fn sys_lseek(caller: Pid, fd: usize, whence: i32, offset: u32) -> Result<(u32, u32), KernelError> {
    let whence = match whence {
        0 => Whence::Start,
        1 => Whence::Current,
        2 => Whence::End,
        _ => return Err(KernelError::InvalidArgument { what: "lseek: unknown whence" }),
    };
    let new_offset = PROCESS_TABLE.with(caller, |p| p.fd_table.get(fd))??
        .seek(offset as i32 as i64, whence)?;
    Ok((new_offset as u32, (new_offset >> 32) as u32))
}

/// `dup2` (spec.md §4.6): the same fd is a no-op; otherwise the target fd
/// is closed first if it was already open, then the source handle is
/// installed there with its open count bumped. Further POSIX edge cases
/// (e.g. `dup2` racing a concurrent close on another thread) are out of
/// scope as "robust dup2" (spec.md §9, Open Questions), but this base
/// close-then-install behavior is not.
pub fn sys_dup2(caller: Pid, old_fd: usize, new_fd: usize) -> Result<(u32, u32), KernelError> {
    PROCESS_TABLE.with_mut(caller, |p| p.fd_table.dup2(old_fd, new_fd))??;
    Ok((new_fd as u32, 0))
}
