//! Kernel bootstrap sequence (spec.md §9, "bootstrap order")
//!
//! The order here is load-bearing, not stylistic: the coremap and physical
//! memory simulation must exist before anything allocates a frame, the swap
//! table must exist before the first TLB fault can evict into it, and the
//! process table must exist before [`process::spawn_init`] installs the
//! first process.

use alloc::boxed::Box;

use crate::mm;
use crate::mm::swap::MemoryBackingStore;
use crate::process;

/// Total physical frames the demonstration machine is configured with.
/// Chosen generously enough that ordinary test workloads (spec.md §8)
/// don't spuriously hit the swap path while still being small enough that
/// the reserve threshold is reachable in a bounded number of allocations.
const TOTAL_FRAMES: usize = 4096;

/// Frames reserved for the kernel itself (never handed out by the coremap).
const FIXED_PREFIX_FRAMES: usize = 64;

/// Number of backing-store slots the in-memory swap device exposes.
const SWAP_SLOTS: usize = 1024;

/// Bring up every subsystem this core owns, in dependency order, and spawn
/// the init process. Returns once init exists; the caller is responsible
/// for entering whatever scheduling loop drives the rest of the system
/// (out of scope here: spec.md's Non-goals exclude a production-grade
/// scheduler).
pub fn kernel_init() -> crate::error::KernelResult<process::Pid> {
    log::info!("bootstrap: bringing up virtual memory");
    mm::init(TOTAL_FRAMES, FIXED_PREFIX_FRAMES);
    mm::swap::init(Box::new(MemoryBackingStore::new(SWAP_SLOTS)));

    log::info!("bootstrap: bringing up process table");
    process::table::init();

    log::info!("bootstrap: spawning init process");
    let init_pid = process::spawn_init()?;
    log::info!("bootstrap: init running as pid {}", init_pid.as_u32());

    Ok(init_pid)
}

/// Entry point called from the platform's `_start`. Panics on bootstrap
/// failure: there is no recovery path this early, and no subsystem yet
/// exists to report the failure through.
pub fn run() -> ! {
    match kernel_init() {
        Ok(_) => log::info!("bootstrap: complete"),
        Err(e) => panic!("bootstrap failed: {e}"),
    }

    loop {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_init_spawns_init_at_the_configured_pid() {
        let pid = kernel_init().expect("bootstrap should succeed");
        assert_eq!(pid.as_u32(), crate::config::INIT_PID);
    }
}
