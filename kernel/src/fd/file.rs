//! Per-process file descriptor table and shared file handles (spec.md §3,
//! §4.6)
//!
//! A [`FileHandle`] is shared (via `Arc`) between every fd that refers to
//! it -- the table entry a `fork`'d child inherits and the original
//! parent's entry are the *same* handle, so they share one seek offset,
//! matching spec.md §4.6's "open file description" semantics rather than
//! per-descriptor offsets.

use alloc::sync::Arc;
use bitflags::bitflags;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

use super::vfs::VfsNode;
use crate::config::OPEN_MAX;
use crate::error::{KernelError, KernelResult};

bitflags! {
    /// Access mode a file was opened with (spec.md §4.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u8 {
        const READ   = 0b001;
        const WRITE  = 0b010;
        const APPEND = 0b100;
    }
}

/// Where `lseek`'s offset argument is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

struct HandleInner {
    offset: u64,
}

/// A shareable open-file description: one VFS node, one access mode, one
/// seek offset, shared by every fd (across every process) descended from
/// the same `open` or `fork` (spec.md §4.6). `open_count` tracks how many
/// fd-table slots currently reference this handle; it is the refcount the
/// spec names explicitly, kept apart from the `Arc`'s own strong count so
/// `vfs_close` fires exactly once when the *logical* last reference goes
/// away rather than whenever the last clone happens to drop.
pub struct FileHandle {
    node: Arc<dyn VfsNode>,
    flags: OpenFlags,
    inner: Mutex<HandleInner>,
    open_count: AtomicUsize,
}

impl FileHandle {
    pub fn new(node: Arc<dyn VfsNode>, flags: OpenFlags) -> Arc<Self> {
        Arc::new(Self {
            node,
            flags,
            inner: Mutex::new(HandleInner { offset: 0 }),
            open_count: AtomicUsize::new(1),
        })
    }

    /// Record that one more fd-table slot now refers to this handle and
    /// return a clone of the `Arc` to install there (spec.md §4.5 `fork`,
    /// §4.6 `dup2`: "bump each file handle's open count").
    pub fn share(self: &Arc<Self>) -> Arc<Self> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        self.clone()
    }

    /// Record that one fewer fd-table slot refers to this handle, closing
    /// the underlying vnode exactly once if that was the last one (spec.md
    /// §3, §4.6: "when `open_count` reaches 0 the underlying vnode is
    /// closed exactly once and the handle destroyed").
    pub fn release(&self) -> KernelResult<()> {
        if self.open_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.node.close()?;
        }
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(KernelError::PermissionViolation);
        }
        let mut inner = self.inner.lock();
        let n = self.node.read_at(inner.offset, buf)?;
        inner.offset += n as u64;
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> KernelResult<usize> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(KernelError::PermissionViolation);
        }
        let mut inner = self.inner.lock();
        if self.flags.contains(OpenFlags::APPEND) {
            inner.offset = self.node.size()?;
        }
        let n = self.node.write_at(inner.offset, buf)?;
        inner.offset += n as u64;
        Ok(n)
    }

    pub fn seek(&self, offset: i64, whence: Whence) -> KernelResult<u64> {
        if !self.node.seekable() {
            return Err(KernelError::NotSeekable);
        }
        let mut inner = self.inner.lock();
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => inner.offset as i64,
            Whence::End => self.node.size()? as i64,
        };
        let new_offset = base + offset;
        if new_offset < 0 {
            return Err(KernelError::InvalidArgument { what: "lseek: negative resulting offset" });
        }
        inner.offset = new_offset as u64;
        Ok(inner.offset)
    }
}

/// A process's open-file-descriptor table (spec.md §3, §4.6).
pub struct FileTable {
    slots: [Option<Arc<FileHandle>>; OPEN_MAX],
}

impl FileTable {
    pub fn new() -> Self {
        Self { slots: core::array::from_fn(|_| None) }
    }

    /// Install `handle` at the lowest free descriptor (spec.md §4.6,
    /// matching classic Unix `open`'s lowest-fd-first contract).
    pub fn install(&mut self, handle: Arc<FileHandle>) -> KernelResult<usize> {
        let fd = self.slots.iter().position(|s| s.is_none()).ok_or(KernelError::TooManyOpen)?;
        self.slots[fd] = Some(handle);
        Ok(fd)
    }

    /// Install `handle` at an exact fd, used only to seed the console at
    /// fds 0/1/2 during process creation (spec.md §4.6, "console
    /// bootstrap").
    pub fn install_at(&mut self, fd: usize, handle: Arc<FileHandle>) -> KernelResult<()> {
        if fd >= OPEN_MAX {
            return Err(KernelError::NoSuchFd { fd });
        }
        self.slots[fd] = Some(handle);
        Ok(())
    }

    pub fn get(&self, fd: usize) -> KernelResult<Arc<FileHandle>> {
        self.slots.get(fd).and_then(|s| s.clone()).ok_or(KernelError::NoSuchFd { fd })
    }

    /// Clear fd's slot, decrementing the handle's open count and closing
    /// its vnode if that was the last reference (spec.md §4.6: "`close`
    /// decrements the refcount; on zero it calls `vfs_close` exactly once
    /// and destroys the handle. The fd slot is always cleared.").
    pub fn close(&mut self, fd: usize) -> KernelResult<()> {
        let slot = self.slots.get_mut(fd).ok_or(KernelError::NoSuchFd { fd })?;
        match slot.take() {
            Some(handle) => handle.release(),
            None => Err(KernelError::NoSuchFd { fd }),
        }
    }

    /// `dup2(old, new)` (spec.md §4.6): the same fd is a no-op; otherwise
    /// close `new` if it is already open, then install `old`'s handle at
    /// `new` and bump its open count.
    pub fn dup2(&mut self, old_fd: usize, new_fd: usize) -> KernelResult<()> {
        if old_fd == new_fd {
            self.get(old_fd)?;
            return Ok(());
        }
        let handle = self.get(old_fd)?;
        if new_fd >= OPEN_MAX {
            return Err(KernelError::NoSuchFd { fd: new_fd });
        }
        if let Some(old) = self.slots[new_fd].take() {
            old.release()?;
        }
        self.slots[new_fd] = Some(handle.share());
        Ok(())
    }

    /// Close every open descriptor, used at process exit to run the
    /// refcounted-close contract immediately rather than waiting for the
    /// `Process` struct's drop glue at reap time (spec.md §4.5 `exit`).
    pub fn close_all(&mut self) -> KernelResult<()> {
        for fd in 0..OPEN_MAX {
            if self.slots[fd].is_some() {
                self.close(fd)?;
            }
        }
        Ok(())
    }

    /// Build the child's table for `fork`: every open fd is duplicated into
    /// the same slot, sharing the handle (and so the seek offset) with the
    /// parent, bumping each handle's open count (spec.md §4.5 `fork`,
    /// §4.6).
    pub fn fork_from(parent: &FileTable) -> Self {
        let mut child = Self::new();
        for (fd, slot) in parent.slots.iter().enumerate() {
            if let Some(handle) = slot {
                child.slots[fd] = Some(handle.share());
            }
        }
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::vfs::MemoryFile;

    #[test]
    fn install_uses_lowest_free_fd() {
        let mut table = FileTable::new();
        let a = table.install(FileHandle::new(MemoryFile::new(), OpenFlags::READ | OpenFlags::WRITE)).expect("install should succeed");
        let b = table.install(FileHandle::new(MemoryFile::new(), OpenFlags::READ)).expect("install should succeed");
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        table.close(0).expect("close should succeed");
        let c = table.install(FileHandle::new(MemoryFile::new(), OpenFlags::READ)).expect("install should succeed");
        assert_eq!(c, 0);
    }

    #[test]
    fn write_then_read_roundtrips_through_the_shared_offset() {
        let handle = FileHandle::new(MemoryFile::new(), OpenFlags::READ | OpenFlags::WRITE);
        handle.write(b"hello").expect("write should succeed");
        let mut buf = [0u8; 5];
        handle.seek(0, Whence::Start).expect("seek should succeed");
        let n = handle.read(&mut buf).expect("read should succeed");
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn fork_from_shares_the_same_handle_and_offset() {
        let mut parent = FileTable::new();
        let handle = FileHandle::new(MemoryFile::new(), OpenFlags::READ | OpenFlags::WRITE);
        parent.install(handle).expect("install should succeed");
        let child = FileTable::fork_from(&parent);
        parent.get(0).expect("fd 0 must exist").write(b"abc").expect("write should succeed");
        let mut buf = [0u8; 3];
        child.get(0).expect("fd 0 must exist").seek(0, Whence::Start).expect("seek should succeed");
        let n = child.get(0).expect("fd 0 must exist").read(&mut buf).expect("read should succeed");
        assert_eq!(&buf[..n], b"abc");
    }

    #[test]
    fn write_on_a_read_only_handle_is_rejected() {
        let handle = FileHandle::new(MemoryFile::new(), OpenFlags::READ);
        assert!(matches!(handle.write(b"x"), Err(KernelError::PermissionViolation)));
    }

    /// A node that only exists to count how many times `close` actually
    /// fires, so the refcounted-close contract is a testable property
    /// rather than an implicit consequence of `Arc`'s drop glue.
    struct CountingNode {
        closes: core::sync::atomic::AtomicUsize,
    }

    impl CountingNode {
        fn new() -> Arc<Self> {
            Arc::new(Self { closes: core::sync::atomic::AtomicUsize::new(0) })
        }
    }

    impl VfsNode for CountingNode {
        fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> KernelResult<usize> {
            Ok(0)
        }
        fn write_at(&self, _offset: u64, _buf: &[u8]) -> KernelResult<usize> {
            Ok(0)
        }
        fn seekable(&self) -> bool {
            true
        }
        fn size(&self) -> KernelResult<u64> {
            Ok(0)
        }
        fn close(&self) -> KernelResult<()> {
            self.closes.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn closing_every_sharer_closes_the_vnode_exactly_once() {
        let node = CountingNode::new();
        let mut parent = FileTable::new();
        parent.install(FileHandle::new(node.clone(), OpenFlags::READ)).expect("install should succeed");
        let mut child = FileTable::fork_from(&parent);

        assert_eq!(parent.get(0).unwrap().open_count(), 2);

        parent.close(0).expect("close should succeed");
        assert_eq!(node.closes.load(core::sync::atomic::Ordering::SeqCst), 0, "vnode must stay open while the child still holds it");

        child.close(0).expect("close should succeed");
        assert_eq!(node.closes.load(core::sync::atomic::Ordering::SeqCst), 1, "vnode must close exactly once once every sharer has closed");
    }

    #[test]
    fn dup2_onto_an_open_fd_closes_the_old_target_first() {
        let node_a = CountingNode::new();
        let node_b = CountingNode::new();
        let mut table = FileTable::new();
        table.install(FileHandle::new(node_a, OpenFlags::READ)).expect("install should succeed");
        table.install(FileHandle::new(node_b.clone(), OpenFlags::READ)).expect("install should succeed");

        table.dup2(0, 1).expect("dup2 should succeed");

        assert_eq!(node_b.closes.load(core::sync::atomic::Ordering::SeqCst), 1, "dup2 must close the pre-existing handle at the target fd");
        assert_eq!(table.get(0).unwrap().open_count(), 2);
        assert!(Arc::ptr_eq(&table.get(0).unwrap(), &table.get(1).unwrap()));
    }

    #[test]
    fn dup2_onto_the_same_fd_is_a_no_op() {
        let mut table = FileTable::new();
        table.install(FileHandle::new(MemoryFile::new(), OpenFlags::READ)).expect("install should succeed");
        table.dup2(0, 0).expect("dup2 onto the same fd should succeed");
        assert_eq!(table.get(0).unwrap().open_count(), 1);
    }
}
