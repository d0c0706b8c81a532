//! Kernel error types
//!
//! A single `KernelError` enum carries every category of failure the core
//! can produce: frame/coremap, swap, address-space, TLB-fault, process, and
//! file-descriptor errors all narrow to this type. Syscall handlers convert
//! it into the small integer error codes user space sees via
//! [`KernelError::to_errno`].

use core::fmt;

/// Unified kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// A user-supplied pointer does not map to valid, accessible memory.
    BadAddress { addr: usize },
    /// An argument failed validation (range, alignment, non-null, etc).
    InvalidArgument { what: &'static str },
    /// A write was attempted against a page that forbids it, or similar.
    PermissionViolation,
    /// A PID does not name a live process.
    NoSuchProcess { pid: u32 },
    /// The named process is not a child of the calling process.
    NotChild { pid: u32 },
    /// A file descriptor is out of range or not open.
    NoSuchFd { fd: usize },
    /// The per-process descriptor table is full.
    TooManyOpen,
    /// The PID table has no free slot.
    TooManyProc,
    /// A size argument exceeds a hard kernel ceiling (e.g. `ARG_MAX`).
    TooBig { limit: usize },
    /// Physical memory or swap space is exhausted.
    NoMemory,
    /// The backing store or VFS returned an I/O failure.
    IoError,
    /// `lseek` on a device that does not support seeking.
    NotSeekable,
    /// The dispatcher was given an unrecognized syscall number.
    NoSyscall { nr: usize },
    /// The operation would block waiting on a condition (e.g. `waitpid` on
    /// a child that has not exited yet). The caller is expected to park the
    /// calling thread on the relevant wait channel and retry.
    WouldBlock,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadAddress { addr } => write!(f, "bad user address {addr:#x}"),
            Self::InvalidArgument { what } => write!(f, "invalid argument: {what}"),
            Self::PermissionViolation => write!(f, "permission violation"),
            Self::NoSuchProcess { pid } => write!(f, "no such process {pid}"),
            Self::NotChild { pid } => write!(f, "process {pid} is not a child of the caller"),
            Self::NoSuchFd { fd } => write!(f, "no such file descriptor {fd}"),
            Self::TooManyOpen => write!(f, "too many open files"),
            Self::TooManyProc => write!(f, "too many processes"),
            Self::TooBig { limit } => write!(f, "argument exceeds limit of {limit} bytes"),
            Self::NoMemory => write!(f, "out of memory"),
            Self::IoError => write!(f, "I/O error"),
            Self::NotSeekable => write!(f, "not seekable"),
            Self::NoSyscall { nr } => write!(f, "no such syscall {nr}"),
            Self::WouldBlock => write!(f, "operation would block"),
        }
    }
}

/// Result alias used throughout the core.
pub type KernelResult<T> = Result<T, KernelError>;

/// The small integer error codes returned to user space, per spec.md's
/// catalogue of exposed error categories. Negative, like classic Unix errno.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    BadAddress = 1,
    InvalidArgument = 2,
    PermissionViolation = 3,
    NoSuchProcess = 4,
    NotChild = 5,
    NoSuchFd = 6,
    TooManyOpen = 7,
    TooManyProc = 8,
    TooBig = 9,
    NoMemory = 10,
    IoError = 11,
    NotSeekable = 12,
    NoSyscall = 13,
    WouldBlock = 14,
}

impl KernelError {
    /// Narrow this error to the errno the dispatcher places in the return
    /// register (spec.md §4.7/§7).
    pub const fn to_errno(self) -> Errno {
        match self {
            Self::BadAddress { .. } => Errno::BadAddress,
            Self::InvalidArgument { .. } => Errno::InvalidArgument,
            Self::PermissionViolation => Errno::PermissionViolation,
            Self::NoSuchProcess { .. } => Errno::NoSuchProcess,
            Self::NotChild { .. } => Errno::NotChild,
            Self::NoSuchFd { .. } => Errno::NoSuchFd,
            Self::TooManyOpen => Errno::TooManyOpen,
            Self::TooManyProc => Errno::TooManyProc,
            Self::TooBig { .. } => Errno::TooBig,
            Self::NoMemory => Errno::NoMemory,
            Self::IoError => Errno::IoError,
            Self::NotSeekable => Errno::NotSeekable,
            Self::NoSyscall { .. } => Errno::NoSyscall,
            Self::WouldBlock => Errno::WouldBlock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_narrowing_is_stable() {
        assert_eq!(
            KernelError::NotSeekable.to_errno() as i32,
            Errno::NotSeekable as i32
        );
        assert_eq!(
            KernelError::NoSyscall { nr: 999 }.to_errno() as i32,
            Errno::NoSyscall as i32
        );
    }
}
