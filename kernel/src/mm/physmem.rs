//! Physical memory contents (spec.md §3)
//!
//! The coremap tracks who owns each frame; this module is the only place
//! that actually stores frame bytes. A real platform integration would
//! back this with the kernel's direct-mapped view of physical RAM instead
//! of a heap-allocated `Vec`; the interface is the same either way, which
//! is what lets the swap engine and the ELF loader stay platform-agnostic.

use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use super::{FrameNumber, PAGE_SIZE};

static PHYS_MEM: Mutex<Vec<[u8; PAGE_SIZE]>> = Mutex::new(Vec::new());

pub fn init(total_frames: usize) {
    *PHYS_MEM.lock() = vec![[0u8; PAGE_SIZE]; total_frames];
}

pub fn zero_frame(frame: FrameNumber) {
    PHYS_MEM.lock()[frame.index()] = [0u8; PAGE_SIZE];
}

pub fn read_frame(frame: FrameNumber) -> [u8; PAGE_SIZE] {
    PHYS_MEM.lock()[frame.index()]
}

pub fn write_frame(frame: FrameNumber, data: &[u8; PAGE_SIZE]) {
    PHYS_MEM.lock()[frame.index()] = *data;
}

/// Copy `data` into `frame` starting at `offset` bytes into the page. Used
/// by the ELF loader to fill segment contents that don't span a whole page
/// (spec.md §4.8, "segment page-straddle handling").
pub fn write_at(frame: FrameNumber, offset: usize, data: &[u8]) {
    let mut mem = PHYS_MEM.lock();
    mem[frame.index()][offset..offset + data.len()].copy_from_slice(data);
}
