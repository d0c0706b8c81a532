//! Console bootstrap (spec.md §4.6, "every process starts with fds 0/1/2
//! wired to the console")

use alloc::sync::Arc;

use super::file::{FileHandle, FileTable, OpenFlags};
use super::vfs::Console;
use crate::error::KernelResult;

/// Install the console at stdin/stdout/stderr in a freshly created
/// process's file table. Each of the three fds gets its own `FileHandle`
/// rather than sharing one, since the console has no meaningful seek
/// offset to share and treating them separately keeps `close(1)` from
/// affecting `write(2, ...)`.
pub fn install_stdio(table: &mut FileTable) -> KernelResult<()> {
    table.install_at(0, FileHandle::new(Arc::new(Console), OpenFlags::READ))?;
    table.install_at(1, FileHandle::new(Arc::new(Console), OpenFlags::WRITE))?;
    table.install_at(2, FileHandle::new(Arc::new(Console), OpenFlags::WRITE))?;
    Ok(())
}
