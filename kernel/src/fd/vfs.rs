//! The VFS seam (spec.md §1, §4.6)
//!
//! The real virtual filesystem -- directory lookup, mount points, on-disk
//! formats -- is an external collaborator (spec.md §1). What the fd layer
//! needs from it is narrow: an open node that can be read, written, and
//! report whether seeking makes sense on it. [`VfsNode`] is that seam.

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::error::{KernelError, KernelResult};

/// An open filesystem node. Implementations live on the other side of the
/// VFS boundary; the fd layer only calls through this trait.
pub trait VfsNode: Send + Sync {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> KernelResult<usize>;
    fn write_at(&self, offset: u64, buf: &[u8]) -> KernelResult<usize>;
    /// `false` for devices like the console, where every read/write is
    /// implicitly at the current stream position and `lseek` is rejected
    /// (spec.md §4.6, `lseek` edge cases).
    fn seekable(&self) -> bool;
    fn size(&self) -> KernelResult<u64>;
    /// Called exactly once, when the last [`super::file::FileHandle`]
    /// referencing this node drops its last open reference (spec.md §3,
    /// §4.6: "when `open_count` reaches 0 the underlying vnode is closed
    /// exactly once"). Most nodes have nothing to flush.
    fn close(&self) -> KernelResult<()> {
        Ok(())
    }
}

/// An in-memory regular file, used by hosted tests in place of a real
/// on-disk VFS node.
pub struct MemoryFile {
    data: Mutex<Vec<u8>>,
}

impl MemoryFile {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { data: Mutex::new(Vec::new()) })
    }

    pub fn with_contents(bytes: &[u8]) -> Arc<Self> {
        Arc::new(Self { data: Mutex::new(Vec::from(bytes)) })
    }
}

impl VfsNode for MemoryFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        let data = self.data.lock();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = (data.len() - offset).min(buf.len());
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> KernelResult<usize> {
        let mut data = self.data.lock();
        let offset = offset as usize;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn seekable(&self) -> bool {
        true
    }

    fn size(&self) -> KernelResult<u64> {
        Ok(self.data.lock().len() as u64)
    }
}

/// The console device: writes go to the serial sink, reads are rejected
/// with [`KernelError::IoError`] (no input source is wired up; spec.md
/// §4.6 only requires the console exist for fds 0/1/2). Never seekable.
pub struct Console;

impl VfsNode for Console {
    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> KernelResult<usize> {
        Err(KernelError::IoError)
    }

    fn write_at(&self, _offset: u64, buf: &[u8]) -> KernelResult<usize> {
        crate::serial::_serial_print(core::str::from_utf8(buf).unwrap_or("<binary>"));
        Ok(buf.len())
    }

    fn seekable(&self) -> bool {
        false
    }

    fn size(&self) -> KernelResult<u64> {
        Err(KernelError::NotSeekable)
    }
}
